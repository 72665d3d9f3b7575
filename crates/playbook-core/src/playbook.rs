//! The playbook facade.
//!
//! [`Playbook`] owns the bullet store, the vector index and the delta
//! history behind one read/write lock. Embedding calls are always made
//! before a lock is taken.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use playbook_abstraction::ReflectionInsight;
//! use playbook_core::{HashingEmbedder, InMemorySnapshotBackend, Playbook, PlaybookConfig};
//!
//! # async fn example() -> playbook_core::Result<()> {
//! let playbook = Playbook::open(
//!     PlaybookConfig::for_hashing_embedder(),
//!     Arc::new(HashingEmbedder::default()),
//!     Arc::new(InMemorySnapshotBackend::new()),
//! )
//! .await?;
//!
//! playbook
//!     .submit_insight(&ReflectionInsight::new("Always validate email format", "Validation", 0.9))
//!     .await?;
//! let bullets = playbook.retrieve_relevant("how to validate a signup form", 5).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use playbook_abstraction::{Embedder, ReflectionInsight};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::bullets::{Bullet, BulletId, BulletStore};
use crate::config::PlaybookConfig;
use crate::curator::{
    AppliedDeltaRecord, ApplyOutcome, CurationDecision, Curator, DeltaHistory, DeltaId,
    DeltaOperation, DeltaUpdate, RejectionReason, apply_delta,
};
use crate::embedding::embed_checked;
use crate::error::{PlaybookError, Result};
use crate::index::{FlatIndex, VectorIndex};
use crate::persistence::{PlaybookSnapshot, SnapshotBackend};
use crate::retrieval::{RetrievalEngine, ScoredBullet, format_context};

/// Result of planning an insight without applying it.
#[derive(Debug, Clone, PartialEq)]
pub enum CurationOutcome {
    Rejected(RejectionReason),
    Delta(DeltaUpdate),
}

/// Result of [`Playbook::submit_insight`].
#[derive(Debug, Clone, PartialEq)]
pub enum InsightOutcome {
    Rejected(RejectionReason),
    Applied(AppliedDeltaRecord),
}

/// Result of [`Playbook::submit_feedback`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedbackReport {
    /// Bullets whose counter was incremented, after the change.
    pub updated: Vec<Bullet>,
    /// Ids that did not resolve.
    pub unknown: Vec<BulletId>,
}

/// Differences between the store and the index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsistencyReport {
    /// Live bullets the index does not know.
    pub missing_from_index: Vec<BulletId>,
    /// Index ids with no live bullet.
    pub stale_in_index: Vec<BulletId>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_from_index.is_empty() && self.stale_in_index.is_empty()
    }
}

/// Summary numbers for a playbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybookStats {
    pub bullets: usize,
    pub sections: Vec<String>,
    pub helpful_total: u64,
    pub harmful_total: u64,
    pub index_entries: usize,
    pub deltas_applied: usize,
    pub dimension: usize,
}

struct PlaybookState {
    store: BulletStore,
    index: Box<dyn VectorIndex>,
    history: DeltaHistory,
}

/// A playbook instance.
pub struct Playbook {
    config: PlaybookConfig,
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn SnapshotBackend>,
    curator: Curator,
    retrieval: RetrievalEngine,
    state: RwLock<PlaybookState>,
    /// Serializes plan-then-apply for insights.
    curation: Mutex<()>,
    /// Serializes snapshots; holds how many history records are persisted.
    persisted: Mutex<usize>,
}

impl Playbook {
    /// Opens a playbook backed by a [`FlatIndex`], loading any saved state.
    ///
    /// # Errors
    /// Returns `Config` for an invalid configuration or an embedder whose
    /// dimension disagrees with it, and a persistence error if saved state
    /// cannot be loaded.
    pub async fn open(
        config: PlaybookConfig,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn SnapshotBackend>,
    ) -> Result<Self> {
        let index = Box::new(FlatIndex::new(config.index.metric));
        Self::open_with_index(config, embedder, backend, index).await
    }

    /// Like [`Playbook::open`], with a caller-supplied index backend.
    ///
    /// The index is rebuilt from the loaded bullets; its prior contents are
    /// discarded.
    ///
    /// # Errors
    /// See [`Playbook::open`].
    pub async fn open_with_index(
        config: PlaybookConfig,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn SnapshotBackend>,
        mut index: Box<dyn VectorIndex>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.embedding.dimension {
            return Err(PlaybookError::Config(format!(
                "embedder {} produces {} dimensions, configuration expects {}",
                embedder.embedder_id(),
                embedder.dimension(),
                config.embedding.dimension
            )));
        }

        let (store, history) = match backend.load().await? {
            Some(loaded) => {
                let store = loaded.snapshot.into_store()?;
                if let Some(bad) =
                    store.iter().find(|b| b.embedding.len() != config.embedding.dimension)
                {
                    return Err(PlaybookError::CorruptSnapshot(format!(
                        "bullet {} has a {}-dimensional embedding, expected {}",
                        bad.id,
                        bad.embedding.len(),
                        config.embedding.dimension
                    )));
                }
                (store, DeltaHistory::from_records(loaded.deltas))
            }
            None => (BulletStore::new(), DeltaHistory::new()),
        };

        index.rebuild(&store.embeddings())?;
        info!(
            location = %backend.describe(),
            bullets = store.len(),
            deltas = history.len(),
            "Opened playbook"
        );

        let persisted = history.len();
        Ok(Self {
            curator: Curator::new(config.curator.clone()),
            retrieval: RetrievalEngine::new(config.retrieval.candidate_multiplier),
            config,
            embedder,
            backend,
            state: RwLock::new(PlaybookState { store, index, history }),
            curation: Mutex::new(()),
            persisted: Mutex::new(persisted),
        })
    }

    pub fn config(&self) -> &PlaybookConfig {
        &self.config
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = embed_checked(
            self.embedder.as_ref(),
            text,
            self.config.embedding.dimension,
            self.config.embedding.timeout(),
        )
        .await?;
        Ok(embedding)
    }

    // =====================================================================
    // Reads
    // =====================================================================

    /// Most relevant bullets for `query`, harmful ones excluded.
    ///
    /// # Errors
    /// Returns `EmbeddingUnavailable` if the query cannot be embedded.
    pub async fn retrieve_relevant(&self, query: &str, top_k: usize) -> Result<Vec<Bullet>> {
        Ok(self.retrieve_scored(query, top_k).await?.into_iter().map(|s| s.bullet).collect())
    }

    /// Like [`Playbook::retrieve_relevant`], keeping similarities.
    ///
    /// # Errors
    /// Returns `EmbeddingUnavailable` if the query cannot be embedded.
    pub async fn retrieve_scored(&self, query: &str, top_k: usize) -> Result<Vec<ScoredBullet>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embed(query).await?;

        let state = self.state.read().await;
        self.retrieval.rank(&state.store, state.index.as_ref(), &embedding, top_k)
    }

    /// Retrieved bullets rendered as a prompt block.
    ///
    /// # Errors
    /// Returns `EmbeddingUnavailable` if the query cannot be embedded.
    pub async fn context_for(&self, query: &str, top_k: usize) -> Result<String> {
        Ok(format_context(&self.retrieve_relevant(query, top_k).await?))
    }

    /// Gets a bullet by ID.
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not resolve.
    pub async fn get(&self, id: &BulletId) -> Result<Bullet> {
        self.state.read().await.store.get(id).cloned()
    }

    /// Lists bullets in creation order.
    ///
    /// # Errors
    /// Returns `NotFound` if a section filter matches no live bullet.
    pub async fn list(&self, section: Option<&str>) -> Result<Vec<Bullet>> {
        self.state.read().await.store.list(section)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.store.is_empty()
    }

    /// Applied delta records, oldest first.
    pub async fn history(&self) -> Vec<AppliedDeltaRecord> {
        self.state.read().await.history.records().to_vec()
    }

    /// Captures the current bullet state.
    pub async fn snapshot(&self) -> PlaybookSnapshot {
        PlaybookSnapshot::capture(&self.state.read().await.store)
    }

    pub async fn stats(&self) -> PlaybookStats {
        let state = self.state.read().await;
        PlaybookStats {
            bullets: state.store.len(),
            sections: state.store.sections(),
            helpful_total: state.store.iter().map(|b| u64::from(b.helpful_count)).sum(),
            harmful_total: state.store.iter().map(|b| u64::from(b.harmful_count)).sum(),
            index_entries: state.index.len(),
            deltas_applied: state.history.len(),
            dimension: self.config.embedding.dimension,
        }
    }

    /// Fails with `IndexInconsistency` unless the index matches the store.
    ///
    /// # Errors
    /// Returns `IndexInconsistency` naming how many ids disagree.
    pub async fn verify_index(&self) -> Result<()> {
        let report = self.check_consistency().await;
        if report.is_consistent() {
            return Ok(());
        }
        Err(PlaybookError::IndexInconsistency(format!(
            "{} bullets missing from index, {} stale index entries",
            report.missing_from_index.len(),
            report.stale_in_index.len()
        )))
    }

    /// Compares the index against the store.
    pub async fn check_consistency(&self) -> ConsistencyReport {
        let state = self.state.read().await;
        let indexed = state.index.ids();

        let missing_from_index =
            state.store.iter().filter(|b| !indexed.contains(&b.id)).map(|b| b.id.clone()).collect();
        let stale_in_index =
            indexed.into_iter().filter(|id| !state.store.contains(id)).collect::<Vec<_>>();

        ConsistencyReport { missing_from_index, stale_in_index }
    }

    // =====================================================================
    // Writes
    // =====================================================================

    /// Writes the current state through the snapshot backend.
    ///
    /// Delta records not yet persisted are appended. On failure they stay
    /// pending and are written by the next successful snapshot.
    ///
    /// # Errors
    /// Returns `PersistenceFailure` if the backend fails.
    pub async fn persist(&self) -> Result<()> {
        let mut persisted = self.persisted.lock().await;

        let (snapshot, blob, pending) = {
            let state = self.state.read().await;
            let records = state.history.records();
            let pending = records.get(*persisted..).unwrap_or_default().to_vec();
            (PlaybookSnapshot::capture(&state.store), state.index.to_blob()?, pending)
        };

        match self.backend.save(&snapshot, &blob, &pending).await {
            Ok(()) => {
                *persisted += pending.len();
                debug!(bullets = snapshot.bullets.len(), deltas = pending.len(), "Snapshot saved");
                Ok(())
            }
            Err(e) => {
                warn!(location = %self.backend.describe(), error = %e, "Snapshot failed, in-memory state kept");
                Err(e)
            }
        }
    }

    /// Adds a bullet directly, bypassing curation.
    ///
    /// The content is not compared against existing bullets. Seeding waits
    /// for any insight being curated, so it never lands between that
    /// insight's plan and its apply.
    ///
    /// # Errors
    /// Returns `EmbeddingUnavailable` if the content cannot be embedded, and
    /// a persistence error if the snapshot fails (the bullet is kept).
    pub async fn seed_bullet(&self, content: &str, section: &str) -> Result<Bullet> {
        let _curation = self.curation.lock().await;

        let content = content.trim();
        let embedding = self.embed(content).await?;
        let delta = DeltaUpdate::new(
            None,
            "Manual seed",
            vec![DeltaOperation::add(section.trim(), content, embedding)],
        );

        let record = self.apply_and_persist(&delta).await?;
        let id = record
            .affected
            .first()
            .ok_or_else(|| PlaybookError::InvalidDelta("seed created no bullet".to_string()))?;
        self.get(id).await
    }

    /// Counts one helpful or harmful vote for each id.
    ///
    /// Unknown ids are reported, not fatal. One snapshot is taken at the end
    /// if anything changed.
    ///
    /// # Errors
    /// Returns a persistence error if the snapshot fails (counts are kept).
    pub async fn submit_feedback(&self, ids: &[BulletId], helpful: bool) -> Result<FeedbackReport> {
        let mut report = FeedbackReport::default();
        {
            let mut state = self.state.write().await;
            for id in ids {
                match state.store.update_counters(id, helpful) {
                    Ok(bullet) => report.updated.push(bullet),
                    Err(PlaybookError::NotFound(_)) => report.unknown.push(id.clone()),
                    Err(e) => return Err(e),
                }
            }
        }

        info!(
            helpful,
            updated = report.updated.len(),
            unknown = report.unknown.len(),
            "Feedback recorded"
        );
        if !report.updated.is_empty() {
            self.persist().await?;
        }
        Ok(report)
    }

    /// Plans the delta for an insight without applying it.
    ///
    /// # Errors
    /// Returns `EmbeddingUnavailable` if embedding fails; the store is not touched.
    pub async fn process_insight(&self, insight: &ReflectionInsight) -> Result<CurationOutcome> {
        if let Some(reason) = self.curator.screen(insight) {
            info!(insight_id = %insight.id, reason = %reason, "Insight rejected");
            return Ok(CurationOutcome::Rejected(reason));
        }

        let embedding = self.embed(insight.key_insight.trim()).await?;

        let decision = {
            let state = self.state.read().await;
            let candidates = self.retrieval.nearest(
                &state.store,
                state.index.as_ref(),
                &embedding,
                self.curator.config().candidate_limit,
            )?;
            self.curator.decide(insight, &candidates)
        };

        if let CurationDecision::Rejected(reason) = &decision {
            info!(insight_id = %insight.id, reason = %reason, "Insight rejected");
            return Ok(CurationOutcome::Rejected(reason.clone()));
        }

        let merged_embedding = match &decision {
            CurationDecision::Reinforce { merged_content, content_changed: true, .. } => {
                Some(self.embed(merged_content).await?)
            }
            _ => None,
        };

        match self.curator.build_delta(insight, &decision, &embedding, merged_embedding)? {
            Some(delta) => {
                debug!(insight_id = %insight.id, delta_id = %delta.id(), reasoning = delta.reasoning(), "Planned delta");
                Ok(CurationOutcome::Delta(delta))
            }
            None => Err(PlaybookError::InvalidDelta(
                "accepted insight produced no delta".to_string(),
            )),
        }
    }

    /// Applies a delta and snapshots.
    ///
    /// Re-applying an already applied delta changes nothing and takes no
    /// snapshot.
    ///
    /// # Errors
    /// Returns `InvalidDelta` or an index error if the delta cannot be
    /// applied (nothing changes), or a persistence error if the snapshot
    /// fails (the delta stays applied).
    pub async fn apply_delta(&self, delta: &DeltaUpdate) -> Result<ApplyOutcome> {
        let outcome = {
            let mut guard = self.state.write().await;
            let state = &mut *guard;
            apply_delta(&mut state.store, state.index.as_mut(), &mut state.history, delta)?
        };

        if outcome.is_applied() {
            self.persist().await?;
        }
        Ok(outcome)
    }

    async fn apply_and_persist(&self, delta: &DeltaUpdate) -> Result<AppliedDeltaRecord> {
        match self.apply_delta(delta).await? {
            ApplyOutcome::Applied(record) => Ok(record),
            ApplyOutcome::AlreadyApplied(id) => Err(already_applied(id)),
        }
    }

    /// Curates and applies one insight.
    ///
    /// Calls are serialized so that two insights never plan against the
    /// same state.
    ///
    /// # Errors
    /// See [`Playbook::process_insight`] and [`Playbook::apply_delta`].
    pub async fn submit_insight(&self, insight: &ReflectionInsight) -> Result<InsightOutcome> {
        let _curation = self.curation.lock().await;

        match self.process_insight(insight).await? {
            CurationOutcome::Rejected(reason) => Ok(InsightOutcome::Rejected(reason)),
            CurationOutcome::Delta(delta) => {
                Ok(InsightOutcome::Applied(self.apply_and_persist(&delta).await?))
            }
        }
    }

    /// Removes a bullet through a REMOVE delta.
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not resolve.
    pub async fn remove_bullet(&self, id: &BulletId) -> Result<AppliedDeltaRecord> {
        self.get(id).await?;
        let delta = self.curator.removal(std::slice::from_ref(id), format!("Remove {}", id));
        self.apply_and_persist(&delta).await
    }

    /// Administrative reset of a bullet's counters.
    ///
    /// # Errors
    /// Returns `NotFound` if the id does not resolve.
    pub async fn reset_counters(&self, id: &BulletId) -> Result<Bullet> {
        let bullet = self.state.write().await.store.reset_counters(id)?;
        info!(bullet_id = %id, "Counters reset");
        self.persist().await?;
        Ok(bullet)
    }

    /// Removes every bullet with `harmful_count - helpful_count >= min_margin`
    /// (a margin of 0 is treated as 1).
    ///
    /// Returns the removed ids, empty if nothing qualified.
    ///
    /// # Errors
    /// Returns an error if the removal delta fails (nothing is removed).
    pub async fn prune_harmful(&self, min_margin: u32) -> Result<Vec<BulletId>> {
        let _curation = self.curation.lock().await;

        let doomed: Vec<BulletId> = {
            let state = self.state.read().await;
            state
                .store
                .iter()
                .filter(|b| -b.net_score() >= i64::from(min_margin.max(1)))
                .map(|b| b.id.clone())
                .collect()
        };
        if doomed.is_empty() {
            return Ok(doomed);
        }

        let delta = self.curator.removal(
            &doomed,
            format!("Prune {} bullets with harmful margin >= {}", doomed.len(), min_margin.max(1)),
        );
        self.apply_and_persist(&delta).await?;
        Ok(doomed)
    }

    /// Rebuilds the index from the store. Returns the number of entries.
    ///
    /// # Errors
    /// Returns an index error if a stored embedding is rejected; the index
    /// is unchanged in that case.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.index.rebuild(&state.store.embeddings())?;
        info!(entries = state.index.len(), "Index rebuilt");
        Ok(state.index.len())
    }
}

fn already_applied(id: DeltaId) -> PlaybookError {
    PlaybookError::InvalidDelta(format!("delta {} was already applied", id))
}
