//! All-or-nothing delta application.
//!
//! Operations run against a clone of the store. The index is only touched
//! once every operation succeeded; if the index then rejects a change it is
//! rebuilt from the untouched store and nothing is committed.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{info, warn};

use super::delta::{AppliedDeltaRecord, DeltaId, DeltaOperation, DeltaUpdate};
use crate::bullets::{Bullet, BulletId, BulletStore};
use crate::error::{PlaybookError, Result};
use crate::index::{VectorIndex, check_vector};

/// Record of applied deltas, in application order.
#[derive(Debug, Clone, Default)]
pub struct DeltaHistory {
    records: Vec<AppliedDeltaRecord>,
    applied: HashSet<DeltaId>,
}

impl DeltaHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the history from persisted records.
    pub fn from_records(records: Vec<AppliedDeltaRecord>) -> Self {
        let applied = records.iter().map(|r| r.delta_id).collect();
        Self { records, applied }
    }

    pub fn contains(&self, id: DeltaId) -> bool {
        self.applied.contains(&id)
    }

    pub fn records(&self) -> &[AppliedDeltaRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn push(&mut self, record: AppliedDeltaRecord) {
        self.applied.insert(record.delta_id);
        self.records.push(record);
    }
}

/// Result of [`apply_delta`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(AppliedDeltaRecord),
    /// The delta id was already applied; nothing changed.
    AlreadyApplied(DeltaId),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

enum IndexChange {
    Upsert(BulletId, Vec<f32>),
    Remove(BulletId),
}

/// Applies `delta` to the store and index as one step.
///
/// # Arguments
/// * `store` - Canonical bullet records
/// * `index` - Projection of `store`
/// * `history` - Applied delta ids, consulted for idempotence
/// * `delta` - The delta to apply
///
/// # Errors
/// Returns `InvalidDelta` if an operation's preconditions do not hold, or an
/// index error if the index rejects a vector. In both cases store, index and
/// history are left as they were.
pub fn apply_delta(
    store: &mut BulletStore,
    index: &mut dyn VectorIndex,
    history: &mut DeltaHistory,
    delta: &DeltaUpdate,
) -> Result<ApplyOutcome> {
    let delta_id = delta.id();
    if history.contains(delta_id) || store.iter().any(|b| b.last_delta_id == Some(delta_id)) {
        info!(delta_id = %delta_id, "Delta already applied, skipping");
        return Ok(ApplyOutcome::AlreadyApplied(delta_id));
    }
    if delta.is_empty() {
        return Err(PlaybookError::InvalidDelta(format!("delta {} has no operations", delta_id)));
    }

    let mut next = store.clone();
    let mut changes = Vec::new();
    let mut affected = Vec::new();
    let mut dimension = index.dimension();

    for (position, operation) in delta.operations().iter().enumerate() {
        apply_operation(&mut next, operation, delta, &mut dimension, &mut changes, &mut affected)
            .map_err(|e| match e {
                PlaybookError::InvalidDelta(msg) => PlaybookError::InvalidDelta(format!(
                    "delta {} operation {} ({}): {}",
                    delta_id,
                    position,
                    operation.kind(),
                    msg
                )),
                other => other,
            })?;
    }

    if let Err(e) = apply_index_changes(index, &changes) {
        warn!(delta_id = %delta_id, error = %e, "Index rejected delta, restoring");
        if let Err(rebuild_err) = index.rebuild(&store.embeddings()) {
            warn!(error = %rebuild_err, "Index restore failed; rebuild required");
        }
        return Err(e.into());
    }

    *store = next;
    let record = AppliedDeltaRecord {
        delta_id,
        insight_id: delta.insight_id().map(str::to_string),
        reasoning: delta.reasoning().to_string(),
        applied_at: Utc::now(),
        operations: delta.operations().iter().map(DeltaOperation::summary).collect(),
        affected,
    };
    for summary in &record.operations {
        info!(delta_id = %delta_id, "{}", summary);
    }
    info!(delta_id = %delta_id, ops = record.operations.len(), "Delta applied");
    history.push(record.clone());
    Ok(ApplyOutcome::Applied(record))
}

fn apply_operation(
    store: &mut BulletStore,
    operation: &DeltaOperation,
    delta: &DeltaUpdate,
    dimension: &mut Option<usize>,
    changes: &mut Vec<IndexChange>,
    affected: &mut Vec<BulletId>,
) -> Result<()> {
    match operation {
        DeltaOperation::Add { section, content, embedding } => {
            if content.trim().is_empty() {
                return Err(PlaybookError::InvalidDelta("content is empty".to_string()));
            }
            check_embedding(embedding, dimension)?;
            let bullet = store.create(content.clone(), section.clone(), embedding.clone());
            stamp(store.get_mut(&bullet.id)?, delta);
            changes.push(IndexChange::Upsert(bullet.id.clone(), embedding.clone()));
            affected.push(bullet.id);
        }
        DeltaOperation::Update { bullet_id, content, helpful_increment, harmful_increment } => {
            require(store, bullet_id)?;
            if let Some(revised) = content {
                if revised.text.trim().is_empty() {
                    return Err(PlaybookError::InvalidDelta("content is empty".to_string()));
                }
                check_embedding(&revised.embedding, dimension)?;
                store.update_content(bullet_id, revised.text.clone(), revised.embedding.clone())?;
                changes.push(IndexChange::Upsert(bullet_id.clone(), revised.embedding.clone()));
            }
            store.add_counters(bullet_id, *helpful_increment, *harmful_increment)?;
            stamp(store.get_mut(bullet_id)?, delta);
            affected.push(bullet_id.clone());
        }
        DeltaOperation::Deduplicate { winner_id, loser_ids } => {
            require(store, winner_id)?;
            if loser_ids.is_empty() {
                return Err(PlaybookError::InvalidDelta("no losers to fold".to_string()));
            }
            for loser_id in loser_ids {
                if loser_id == winner_id {
                    return Err(PlaybookError::InvalidDelta(format!(
                        "{} is both winner and loser",
                        winner_id
                    )));
                }
                require(store, loser_id)?;
                let loser = store.remove(loser_id)?;
                store.add_counters(winner_id, loser.helpful_count, loser.harmful_count)?;
                changes.push(IndexChange::Remove(loser_id.clone()));
                affected.push(loser_id.clone());
            }
            stamp(store.get_mut(winner_id)?, delta);
            affected.push(winner_id.clone());
        }
        DeltaOperation::Remove { bullet_id } => {
            require(store, bullet_id)?;
            store.remove(bullet_id)?;
            changes.push(IndexChange::Remove(bullet_id.clone()));
            affected.push(bullet_id.clone());
        }
    }
    Ok(())
}

fn require(store: &BulletStore, id: &BulletId) -> Result<()> {
    if store.contains(id) {
        Ok(())
    } else {
        Err(PlaybookError::InvalidDelta(format!("bullet {} does not exist", id)))
    }
}

/// Validates a vector against the index dimension, fixing it on first use.
fn check_embedding(embedding: &[f32], dimension: &mut Option<usize>) -> Result<()> {
    check_vector(embedding)?;
    match *dimension {
        Some(expected) if expected != embedding.len() => Err(PlaybookError::InvalidDelta(format!(
            "embedding has dimension {}, index expects {}",
            embedding.len(),
            expected
        ))),
        Some(_) => Ok(()),
        None => {
            *dimension = Some(embedding.len());
            Ok(())
        }
    }
}

fn stamp(bullet: &mut Bullet, delta: &DeltaUpdate) {
    bullet.last_delta_id = Some(delta.id());
    if let Some(insight_id) = delta.insight_id() {
        bullet.source_insight_id = Some(insight_id.to_string());
    }
}

fn apply_index_changes(
    index: &mut dyn VectorIndex,
    changes: &[IndexChange],
) -> std::result::Result<(), crate::index::IndexError> {
    for change in changes {
        match change {
            IndexChange::Upsert(id, embedding) => index.insert(id, embedding)?,
            IndexChange::Remove(id) => {
                index.remove(id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curator::RevisedContent;
    use crate::index::{DistanceMetric, FlatIndex};

    struct Fixture {
        store: BulletStore,
        index: FlatIndex,
        history: DeltaHistory,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: BulletStore::new(),
                index: FlatIndex::new(DistanceMetric::Cosine),
                history: DeltaHistory::new(),
            }
        }

        fn apply(&mut self, delta: &DeltaUpdate) -> Result<ApplyOutcome> {
            apply_delta(&mut self.store, &mut self.index, &mut self.history, delta)
        }

        fn seed(&mut self, content: &str, embedding: Vec<f32>) -> BulletId {
            let delta = DeltaUpdate::new(
                None,
                "seed",
                vec![DeltaOperation::add("general", content, embedding)],
            );
            match self.apply(&delta).unwrap() {
                ApplyOutcome::Applied(record) => record.affected[0].clone(),
                ApplyOutcome::AlreadyApplied(_) => panic!("fresh delta skipped"),
            }
        }
    }

    #[test]
    fn test_add_updates_store_index_and_history() {
        let mut fx = Fixture::new();
        let delta = DeltaUpdate::new(
            Some("insight-1".to_string()),
            "new",
            vec![DeltaOperation::add("validation", "Check inputs", vec![1.0, 0.0])],
        );

        let outcome = fx.apply(&delta).unwrap();
        assert!(outcome.is_applied());
        assert_eq!(fx.store.len(), 1);
        assert_eq!(fx.index.len(), 1);
        assert_eq!(fx.history.len(), 1);

        let bullet = fx.store.list(None).unwrap().remove(0);
        assert_eq!(bullet.last_delta_id, Some(delta.id()));
        assert_eq!(bullet.source_insight_id.as_deref(), Some("insight-1"));
    }

    #[test]
    fn test_reapplying_is_noop() {
        let mut fx = Fixture::new();
        let id = fx.seed("Check inputs", vec![1.0, 0.0]);
        let bump = DeltaUpdate::new(None, "bump", vec![DeltaOperation::bump(id.clone(), 1, 0)]);

        assert!(fx.apply(&bump).unwrap().is_applied());
        assert_eq!(fx.apply(&bump).unwrap(), ApplyOutcome::AlreadyApplied(bump.id()));
        assert_eq!(fx.store.get(&id).unwrap().helpful_count, 1);
        assert_eq!(fx.history.len(), 2);
    }

    #[test]
    fn test_reapply_detected_from_bullet_stamp() {
        let mut fx = Fixture::new();
        let id = fx.seed("Check inputs", vec![1.0, 0.0]);
        let bump = DeltaUpdate::new(None, "bump", vec![DeltaOperation::bump(id.clone(), 1, 0)]);
        fx.apply(&bump).unwrap();

        let mut forgetful = DeltaHistory::new();
        let outcome =
            apply_delta(&mut fx.store, &mut fx.index, &mut forgetful, &bump).unwrap();
        assert!(!outcome.is_applied());
        assert_eq!(fx.store.get(&id).unwrap().helpful_count, 1);
    }

    #[test]
    fn test_failed_operation_rolls_back_everything() {
        let mut fx = Fixture::new();
        let id = fx.seed("Check inputs", vec![1.0, 0.0]);

        let delta = DeltaUpdate::new(
            None,
            "partly stale",
            vec![
                DeltaOperation::add("general", "Another", vec![0.0, 1.0]),
                DeltaOperation::bump(id.clone(), 1, 0),
                DeltaOperation::remove(BulletId::new("general-09999")),
            ],
        );

        let err = fx.apply(&delta).unwrap_err();
        assert!(matches!(err, PlaybookError::InvalidDelta(_)));
        assert!(err.to_string().contains("REMOVE"));
        assert_eq!(fx.store.len(), 1);
        assert_eq!(fx.index.len(), 1);
        assert_eq!(fx.store.get(&id).unwrap().helpful_count, 0);
        assert!(!fx.history.contains(delta.id()));
    }

    #[test]
    fn test_dimension_mismatch_rolls_back() {
        let mut fx = Fixture::new();
        fx.seed("Check inputs", vec![1.0, 0.0]);

        let delta = DeltaUpdate::new(
            None,
            "bad vector",
            vec![
                DeltaOperation::add("general", "Fine", vec![0.0, 1.0]),
                DeltaOperation::add("general", "Wrong size", vec![1.0, 0.0, 0.0]),
            ],
        );
        assert!(fx.apply(&delta).is_err());
        assert_eq!(fx.store.len(), 1);
        assert_eq!(fx.index.ids(), fx.store.embeddings().into_iter().map(|(id, _)| id).collect::<Vec<_>>());
    }

    #[test]
    fn test_update_replaces_content_and_vector() {
        let mut fx = Fixture::new();
        let id = fx.seed("Check inputs", vec![1.0, 0.0]);

        let delta = DeltaUpdate::new(
            None,
            "merge",
            vec![DeltaOperation::Update {
                bullet_id: id.clone(),
                content: Some(RevisedContent {
                    text: "Check and trim inputs".to_string(),
                    embedding: vec![0.0, 1.0],
                }),
                helpful_increment: 1,
                harmful_increment: 0,
            }],
        );
        fx.apply(&delta).unwrap();

        let bullet = fx.store.get(&id).unwrap();
        assert_eq!(bullet.content, "Check and trim inputs");
        assert_eq!(bullet.helpful_count, 1);
        assert_eq!(fx.index.query(&[0.0, 1.0], 1).unwrap()[0].id, id);
    }

    #[test]
    fn test_deduplicate_sums_counters_and_removes_losers() {
        let mut fx = Fixture::new();
        let winner = fx.seed("winner", vec![1.0, 0.0]);
        let loser_a = fx.seed("loser a", vec![0.9, 0.1]);
        let loser_b = fx.seed("loser b", vec![0.8, 0.2]);
        fx.store.add_counters(&loser_a, 2, 1).unwrap();
        fx.store.add_counters(&loser_b, 3, 0).unwrap();
        fx.store.add_counters(&winner, 1, 0).unwrap();

        let delta = DeltaUpdate::new(
            None,
            "dedup",
            vec![DeltaOperation::Deduplicate {
                winner_id: winner.clone(),
                loser_ids: vec![loser_a.clone(), loser_b.clone()],
            }],
        );
        fx.apply(&delta).unwrap();

        let kept = fx.store.get(&winner).unwrap();
        assert_eq!((kept.helpful_count, kept.harmful_count), (6, 1));
        assert!(!fx.store.contains(&loser_a));
        assert!(!fx.store.contains(&loser_b));
        assert_eq!(fx.index.ids(), vec![winner]);
    }

    #[test]
    fn test_deduplicate_rejects_self_fold_and_empty() {
        let mut fx = Fixture::new();
        let id = fx.seed("only", vec![1.0, 0.0]);

        let self_fold = DeltaUpdate::new(
            None,
            "bad",
            vec![DeltaOperation::Deduplicate { winner_id: id.clone(), loser_ids: vec![id.clone()] }],
        );
        assert!(fx.apply(&self_fold).is_err());

        let empty = DeltaUpdate::new(
            None,
            "bad",
            vec![DeltaOperation::Deduplicate { winner_id: id.clone(), loser_ids: Vec::new() }],
        );
        assert!(fx.apply(&empty).is_err());
        assert!(fx.store.contains(&id));
    }

    #[test]
    fn test_empty_delta_rejected() {
        let mut fx = Fixture::new();
        let delta = DeltaUpdate::new(None, "nothing", Vec::new());
        assert!(matches!(fx.apply(&delta), Err(PlaybookError::InvalidDelta(_))));
    }

    #[test]
    fn test_history_from_records() {
        let mut fx = Fixture::new();
        fx.seed("a", vec![1.0]);
        let restored = DeltaHistory::from_records(fx.history.records().to_vec());
        assert!(restored.contains(fx.history.records()[0].delta_id));
        assert_eq!(restored.len(), 1);
    }
}
