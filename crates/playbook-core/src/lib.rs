//! Playbook Core - evolving strategy store for self-improving agents.
//!
//! This crate provides:
//! - A bullet store with helpful/harmful feedback counters
//! - A pluggable vector index and similarity retrieval
//! - A deterministic curator that turns reflection insights into delta updates
//! - Atomic, idempotent delta application and file snapshots
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use playbook_core::{DirectorySnapshotBackend, HashingEmbedder, Playbook, PlaybookConfig};
//!
//! #[tokio::main]
//! async fn main() -> playbook_core::Result<()> {
//!     let backend = DirectorySnapshotBackend::new(".playbook")?;
//!     let playbook = Playbook::open(
//!         PlaybookConfig::for_hashing_embedder(),
//!         Arc::new(HashingEmbedder::default()),
//!         Arc::new(backend),
//!     )
//!     .await?;
//!     println!("{}", playbook.context_for("validate user input", 5).await?);
//!     Ok(())
//! }
//! ```

pub mod bullets;
pub mod config;
pub mod curator;
pub mod embedding;
pub mod error;
pub mod index;
pub mod persistence;
pub mod playbook;
pub mod retrieval;

pub use bullets::{Bullet, BulletId, BulletStore};
pub use config::{CuratorConfig, EmbeddingConfig, IndexConfig, PlaybookConfig, RetrievalConfig};
pub use curator::{
    AppliedDeltaRecord, ApplyOutcome, CurationDecision, Curator, DeltaHistory, DeltaId,
    DeltaOperation, DeltaUpdate, RejectionReason, RevisedContent, merge_content,
};
pub use embedding::{HashingEmbedder, embed_checked};
pub use error::{PlaybookError, Result};
pub use index::{DistanceMetric, FlatIndex, IndexError, IndexHit, VectorIndex};
pub use persistence::{
    DirectorySnapshotBackend, InMemorySnapshotBackend, LoadedState, PlaybookSnapshot,
    SnapshotBackend,
};
pub use playbook::{
    ConsistencyReport, CurationOutcome, FeedbackReport, InsightOutcome, Playbook, PlaybookStats,
};
pub use retrieval::{RetrievalEngine, ScoredBullet, format_context};

pub use playbook_abstraction::{Embedder, EmbeddingError, ReflectionInsight};
