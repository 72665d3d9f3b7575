//! Snapshot and load of playbook state.
//!
//! A snapshot is the full bullet list (embeddings included) plus the id
//! sequence. The index blob is written alongside for inspection but never
//! read back: loading always rebuilds the index from the bullets.
//!
//! Directory layout:
//!
//! ```text
//! <dir>/
//! ├── playbook.md     human-readable, regenerated on every snapshot
//! ├── bullets.json    canonical records
//! ├── index.json      opaque index export
//! └── deltas.jsonl    applied delta records, one per line
//! ```

mod backend;
mod render;

use serde::{Deserialize, Serialize};

use crate::bullets::{Bullet, BulletStore};
use crate::curator::AppliedDeltaRecord;
use crate::error::{PlaybookError, Result};

pub use backend::{DirectorySnapshotBackend, InMemorySnapshotBackend, SnapshotBackend};
pub use render::render_markdown;

/// Format version written to `bullets.json`.
pub const SNAPSHOT_VERSION: u32 = 1;

pub const MARKDOWN_FILE: &str = "playbook.md";
pub const BULLETS_FILE: &str = "bullets.json";
pub const INDEX_FILE: &str = "index.json";
pub const DELTAS_FILE: &str = "deltas.jsonl";

/// Serializable copy of the bullet store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookSnapshot {
    pub version: u32,
    pub next_sequence: u64,
    pub bullets: Vec<Bullet>,
}

impl PlaybookSnapshot {
    /// Captures `store` in creation order.
    pub fn capture(store: &BulletStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            next_sequence: store.next_sequence(),
            bullets: store.iter().cloned().collect(),
        }
    }

    /// Whether this build understands the snapshot's format.
    pub fn is_supported(&self) -> bool {
        self.version == SNAPSHOT_VERSION
    }

    /// Rebuilds a bullet store from the snapshot.
    ///
    /// # Errors
    /// Returns `CorruptSnapshot` for an unknown version or duplicate ids.
    pub fn into_store(self) -> Result<BulletStore> {
        if !self.is_supported() {
            return Err(PlaybookError::CorruptSnapshot(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        BulletStore::from_parts(self.bullets, self.next_sequence)
    }
}

/// State returned by [`SnapshotBackend::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedState {
    pub snapshot: PlaybookSnapshot,
    /// Previously applied deltas, oldest first.
    pub deltas: Vec<AppliedDeltaRecord>,
}
