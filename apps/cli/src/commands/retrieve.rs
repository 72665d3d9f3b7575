//! Query commands.

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use super::{bullet_json, open_playbook};
use crate::config::CliContext;

pub async fn retrieve(ctx: &CliContext, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("Query must not be empty");
    }

    let playbook = open_playbook(ctx).await?;
    let top_k = top_k.unwrap_or(ctx.config.retrieval.default_top_k);
    let results = playbook.retrieve_scored(query, top_k).await?;

    if json {
        let output = json!({
            "query": query,
            "results": results.iter().map(|scored| {
                let mut value = bullet_json(&scored.bullet);
                value["similarity"] = json!(scored.similarity);
                value
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("  {}", "No relevant bullets.".dimmed());
        return Ok(());
    }

    for (rank, scored) in results.iter().enumerate() {
        println!(
            "{}. {} {} {}",
            rank + 1,
            scored.bullet.id.as_str().cyan(),
            format!("[{:.3}]", scored.similarity).dimmed(),
            scored.bullet.content
        );
    }
    Ok(())
}

/// Prints the prompt context block for a query.
pub async fn context(ctx: &CliContext, query: &str, top_k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        anyhow::bail!("Query must not be empty");
    }

    let playbook = open_playbook(ctx).await?;
    let top_k = top_k.unwrap_or(ctx.config.retrieval.default_top_k);
    print!("{}", playbook.context_for(query, top_k).await?);
    Ok(())
}
