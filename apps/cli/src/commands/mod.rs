//! Command implementations for `pbk`.

pub mod bullets;
pub mod init;
pub mod insight;
pub mod maintenance;
pub mod retrieve;

use std::sync::Arc;

use anyhow::{Context, Result};
use playbook_core::{Bullet, DirectorySnapshotBackend, HashingEmbedder, Playbook};
use serde_json::{Value, json};

use crate::config::CliContext;

/// Opens the playbook in `ctx.dir` with the hashing embedder.
pub async fn open_playbook(ctx: &CliContext) -> Result<Playbook> {
    let backend = DirectorySnapshotBackend::new(&ctx.dir)
        .with_context(|| format!("Failed to open playbook directory {}", ctx.dir.display()))?;
    let embedder = HashingEmbedder::new(ctx.config.embedding.dimension);

    Playbook::open(ctx.config.clone(), Arc::new(embedder), Arc::new(backend))
        .await
        .context("Failed to load playbook")
}

/// JSON view of a bullet without its embedding.
pub fn bullet_json(bullet: &Bullet) -> Value {
    json!({
        "id": bullet.id,
        "section": bullet.section,
        "content": bullet.content,
        "helpful": bullet.helpful_count,
        "harmful": bullet.harmful_count,
        "net_score": bullet.net_score(),
        "created_at": bullet.created_at.to_rfc3339(),
        "updated_at": bullet.updated_at.to_rfc3339(),
        "source_insight_id": bullet.source_insight_id,
    })
}
