//! Maintenance commands: rebuild, stats, history.

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

use super::open_playbook;
use crate::config::CliContext;

pub async fn rebuild(ctx: &CliContext) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let entries = playbook.rebuild_index().await.context("Failed to rebuild index")?;
    let report = playbook.check_consistency().await;
    playbook.persist().await.context("Failed to save snapshot")?;

    println!("{}", format!("Index rebuilt with {} entries", entries).green().bold());
    if report.is_consistent() {
        println!("  {}", "Index matches bullets.".dimmed());
    } else {
        for id in &report.missing_from_index {
            println!("  {} missing from index: {}", "!".yellow(), id);
        }
        for id in &report.stale_in_index {
            println!("  {} stale index entry: {}", "!".yellow(), id);
        }
    }
    playbook.verify_index().await.context("Index still inconsistent after rebuild")?;
    Ok(())
}

pub async fn stats(ctx: &CliContext, json: bool) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let stats = playbook.stats().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Playbook Statistics".bold().cyan());
    println!();
    println!("  Bullets:        {}", stats.bullets);
    println!("  Sections:       {}", stats.sections.join(", "));
    println!("  Helpful total:  {}", stats.helpful_total.to_string().green());
    println!("  Harmful total:  {}", stats.harmful_total.to_string().red());
    println!("  Index entries:  {}", stats.index_entries);
    println!("  Deltas applied: {}", stats.deltas_applied);
    println!("  Dimension:      {}", stats.dimension);
    Ok(())
}

pub async fn history(ctx: &CliContext, limit: usize, json: bool) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let records: Vec<_> = playbook.history().await.into_iter().rev().take(limit).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "deltas": records }))?);
        return Ok(());
    }

    if records.is_empty() {
        println!("  {}", "No deltas applied yet.".dimmed());
        return Ok(());
    }

    for record in &records {
        println!(
            "{} {} {}",
            record.applied_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            record.delta_id.to_string().cyan(),
            record.reasoning
        );
        for op in &record.operations {
            println!("    {} {}", "→".dimmed(), op);
        }
    }
    Ok(())
}
