//! `pbk init`.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use playbook_core::PlaybookConfig;
use playbook_core::config::CONFIG_FILE_NAME;
use playbook_core::persistence::MARKDOWN_FILE;

use super::open_playbook;
use crate::config::CliContext;

/// Creates the playbook directory, its config file and an empty snapshot.
///
/// An existing `playbook.toml` is kept unless `force` is set. Existing
/// bullets are never touched.
pub async fn execute(dir: &Path, config_path: Option<&Path>, force: bool) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create playbook directory {}", dir.display()))?;

    let target = dir.join(CONFIG_FILE_NAME);
    let keep_existing = target.is_file() && !force;

    let config = match config_path {
        Some(path) => PlaybookConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None if keep_existing => PlaybookConfig::load_from_file(&target)
            .with_context(|| format!("Failed to load configuration from {}", target.display()))?,
        None => PlaybookConfig::for_hashing_embedder(),
    };

    if keep_existing {
        println!("  {} {}", "Keeping".dimmed(), target.display());
    } else {
        let toml = config.to_toml_string().context("Failed to serialize configuration")?;
        std::fs::write(&target, toml)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        println!("  {} {}", "Wrote".green(), target.display());
    }

    let ctx = CliContext { dir: dir.to_path_buf(), config, config_path: Some(target) };
    let playbook = open_playbook(&ctx).await?;
    playbook.persist().await.context("Failed to write initial snapshot")?;

    println!("{}", "Playbook initialized".green().bold());
    println!("  Directory: {}", dir.display().to_string().cyan());
    println!("  Bullets: {}", playbook.len().await);
    println!("  Markdown: {}", dir.join(MARKDOWN_FILE).display());

    Ok(())
}
