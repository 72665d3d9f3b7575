//! Bullet management commands: add, list, show, feedback, remove, reset, prune.

use anyhow::{Context, Result};
use colored::Colorize;
use playbook_core::{Bullet, BulletId};
use serde_json::json;

use super::{bullet_json, open_playbook};
use crate::config::CliContext;

fn print_bullet(bullet: &Bullet) {
    let score = bullet.net_score();
    let score = match score {
        s if s > 0 => format!("+{}", s).green(),
        s if s < 0 => s.to_string().red(),
        s => s.to_string().dimmed(),
    };
    println!("  {} {} [{}]", "•".cyan(), bullet.id.as_str().cyan(), score);
    println!("    {}", bullet.content);
    println!(
        "    {}",
        format!("helpful {}, harmful {}", bullet.helpful_count, bullet.harmful_count).dimmed()
    );
}

pub async fn add(ctx: &CliContext, section: &str, content: &str) -> Result<()> {
    if content.trim().is_empty() {
        anyhow::bail!("Bullet content must not be empty");
    }

    let playbook = open_playbook(ctx).await?;
    let bullet = playbook.seed_bullet(content, section).await.context("Failed to add bullet")?;

    println!("{}", "Bullet added".green().bold());
    println!("  ID: {}", bullet.id.as_str().cyan());
    println!("  Section: {}", bullet.section.cyan());
    println!("  Content: {}", bullet.content);
    Ok(())
}

pub async fn list(ctx: &CliContext, section: Option<&str>, json: bool) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let bullets = playbook.list(section).await?;

    if json {
        let output = json!({ "bullets": bullets.iter().map(bullet_json).collect::<Vec<_>>() });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", "Playbook".bold().cyan());
    println!();
    if bullets.is_empty() {
        println!("  {}", "No bullets found.".dimmed());
        return Ok(());
    }

    let mut sections: Vec<&str> = Vec::new();
    for bullet in &bullets {
        if !sections.contains(&bullet.section.as_str()) {
            sections.push(&bullet.section);
        }
    }

    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", section.bold());
        for bullet in bullets.iter().filter(|b| b.section == *section) {
            print_bullet(bullet);
        }
    }
    Ok(())
}

pub async fn show(ctx: &CliContext, id: &str, json: bool) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let bullet = playbook.get(&BulletId::new(id)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bullet_json(&bullet))?);
        return Ok(());
    }

    println!("{}", bullet.id.as_str().bold().cyan());
    println!("  Section: {}", bullet.section);
    println!("  Content: {}", bullet.content);
    println!("  Helpful: {}", bullet.helpful_count);
    println!("  Harmful: {}", bullet.harmful_count);
    println!("  Created: {}", bullet.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated: {}", bullet.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(insight_id) = &bullet.source_insight_id {
        println!("  Source insight: {}", insight_id.dimmed());
    }
    Ok(())
}

pub async fn feedback(ctx: &CliContext, ids: &[String], helpful: bool) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let ids: Vec<BulletId> = ids.iter().map(BulletId::new).collect();
    let report = playbook.submit_feedback(&ids, helpful).await?;

    for id in &report.unknown {
        println!("  {} unknown bullet {}", "!".yellow(), id.as_str().yellow());
    }
    if report.updated.is_empty() {
        anyhow::bail!("No bullets updated");
    }

    let label = if helpful { "helpful".green() } else { "harmful".red() };
    println!("{}", format!("Recorded {} feedback", label).bold());
    for bullet in &report.updated {
        print_bullet(bullet);
    }
    Ok(())
}

pub async fn remove(ctx: &CliContext, id: &str) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let record = playbook.remove_bullet(&BulletId::new(id)).await?;

    println!("{}", format!("Removed {}", id).green().bold());
    println!("  Delta: {}", record.delta_id.to_string().dimmed());
    Ok(())
}

pub async fn reset(ctx: &CliContext, id: &str) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let bullet = playbook.reset_counters(&BulletId::new(id)).await?;

    println!("{}", format!("Counters reset for {}", bullet.id).green().bold());
    Ok(())
}

pub async fn prune(ctx: &CliContext, margin: u32) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let removed = playbook.prune_harmful(margin).await?;

    if removed.is_empty() {
        println!("  {}", "Nothing to prune.".dimmed());
        return Ok(());
    }

    println!("{}", format!("Pruned {} bullets", removed.len()).green().bold());
    for id in &removed {
        println!("  {} {}", "-".red(), id);
    }
    Ok(())
}
