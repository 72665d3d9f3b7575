//! `pbk insight`: curate one reflection insight.

use anyhow::{Context, Result};
use colored::Colorize;
use playbook_core::{CurationOutcome, InsightOutcome, ReflectionInsight};
use serde_json::json;

use super::open_playbook;
use crate::config::CliContext;

pub async fn execute(
    ctx: &CliContext,
    text: &str,
    section: &str,
    confidence: f32,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let playbook = open_playbook(ctx).await?;
    let insight = ReflectionInsight::new(text, section, confidence);

    if dry_run {
        let outcome = playbook.process_insight(&insight).await.context("Failed to plan insight")?;
        match outcome {
            CurationOutcome::Rejected(reason) => print_rejected(&reason.to_string(), json)?,
            CurationOutcome::Delta(delta) => {
                let operations: Vec<String> =
                    delta.operations().iter().map(|op| op.summary()).collect();
                if json {
                    let output = json!({
                        "status": "planned",
                        "delta_id": delta.id().to_string(),
                        "reasoning": delta.reasoning(),
                        "operations": operations,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                } else {
                    println!("{}", "Planned delta (not applied)".yellow().bold());
                    println!("  Reasoning: {}", delta.reasoning());
                    for op in &operations {
                        println!("  {} {}", "→".dimmed(), op);
                    }
                }
            }
        }
        return Ok(());
    }

    match playbook.submit_insight(&insight).await.context("Failed to curate insight")? {
        InsightOutcome::Rejected(reason) => print_rejected(&reason.to_string(), json)?,
        InsightOutcome::Applied(record) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&json!({
                    "status": "applied",
                    "delta_id": record.delta_id.to_string(),
                    "reasoning": record.reasoning,
                    "operations": record.operations,
                    "affected": record.affected,
                }))?);
            } else {
                println!("{}", "Insight applied".green().bold());
                println!("  Reasoning: {}", record.reasoning);
                for op in &record.operations {
                    println!("  {} {}", "→".dimmed(), op);
                }
            }
        }
    }
    Ok(())
}

fn print_rejected(reason: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "status": "rejected",
            "reason": reason,
        }))?);
    } else {
        println!("{}", format!("Insight rejected: {}", reason).yellow().bold());
    }
    Ok(())
}
