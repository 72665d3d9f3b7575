//! Curation policy.
//!
//! Turns one reflection insight plus its nearest existing bullets into a
//! decision, and a decision plus embeddings into a [`DeltaUpdate`]. Nothing
//! here touches the store or calls out; the facade supplies all inputs.

use playbook_abstraction::ReflectionInsight;
use tracing::debug;

use super::delta::{DeltaOperation, DeltaUpdate, RevisedContent};
use super::merge::merge_content;
use crate::bullets::{Bullet, BulletId};
use crate::config::CuratorConfig;
use crate::error::{PlaybookError, Result};
use crate::retrieval::ScoredBullet;

const DEFAULT_SECTION: &str = "general";

/// Why an insight produced no delta.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// Confidence below `min_confidence` (or not a number).
    LowConfidence { confidence: f32, min_confidence: f32 },
    /// The insight text is blank.
    EmptyInsight,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowConfidence { confidence, min_confidence } => {
                write!(f, "confidence {} below minimum {}", confidence, min_confidence)
            }
            Self::EmptyInsight => f.write_str("insight text is empty"),
        }
    }
}

/// What the curator wants done with an insight.
#[derive(Debug, Clone, PartialEq)]
pub enum CurationDecision {
    Rejected(RejectionReason),
    /// Near-duplicate of `target`: merge content and count it as helpful.
    Reinforce {
        target: BulletId,
        similarity: f32,
        merged_content: String,
        /// Whether `merged_content` differs from the target's content.
        content_changed: bool,
    },
    /// New bullet, optionally folding related existing bullets together.
    Add {
        section: String,
        content: String,
        /// `(winner, losers)` among the related existing bullets.
        dedup: Option<(BulletId, Vec<BulletId>)>,
    },
}

impl CurationDecision {
    /// Whether the content of an existing bullet needs a fresh embedding.
    pub fn needs_merged_embedding(&self) -> bool {
        matches!(self, Self::Reinforce { content_changed: true, .. })
    }
}

/// Deterministic curation policy.
#[derive(Debug, Clone, Default)]
pub struct Curator {
    config: CuratorConfig,
}

impl Curator {
    pub fn new(config: CuratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CuratorConfig {
        &self.config
    }

    /// Checks the parts of an insight that do not depend on the playbook.
    ///
    /// Run before embedding so rejected insights cost nothing.
    pub fn screen(&self, insight: &ReflectionInsight) -> Option<RejectionReason> {
        let min_confidence = self.config.min_confidence;
        // Written negated so NaN confidence is rejected too.
        if !(insight.confidence >= min_confidence) {
            return Some(RejectionReason::LowConfidence {
                confidence: insight.confidence,
                min_confidence,
            });
        }
        if insight.key_insight.trim().is_empty() {
            return Some(RejectionReason::EmptyInsight);
        }
        None
    }

    /// Decides how `insight` changes the playbook.
    ///
    /// # Arguments
    /// * `insight` - The reflection output
    /// * `candidates` - Nearest existing bullets to the insight's embedding
    pub fn decide(
        &self,
        insight: &ReflectionInsight,
        candidates: &[ScoredBullet],
    ) -> CurationDecision {
        if let Some(reason) = self.screen(insight) {
            return CurationDecision::Rejected(reason);
        }

        let content = insight.key_insight.trim().to_string();
        let nearest = candidates.iter().max_by(|a, b| {
            a.similarity
                .total_cmp(&b.similarity)
                // max_by keeps the last maximum; prefer the earlier candidate.
                .then_with(|| b.bullet.created_at.cmp(&a.bullet.created_at))
        });

        if let Some(nearest) = nearest {
            if nearest.similarity > self.config.duplicate_threshold {
                let merged_content = merge_content(&nearest.bullet.content, &content);
                let content_changed = merged_content != nearest.bullet.content;
                return CurationDecision::Reinforce {
                    target: nearest.bullet.id.clone(),
                    similarity: nearest.similarity,
                    merged_content,
                    content_changed,
                };
            }
        }

        let related: Vec<&Bullet> = candidates
            .iter()
            .filter(|c| c.similarity > self.config.related_threshold)
            .map(|c| &c.bullet)
            .collect();

        let dedup = if related.len() > 1 { Some(pick_winner(&related)) } else { None };
        CurationDecision::Add { section: section_of(insight), content, dedup }
    }

    /// Builds the delta for a decision. Rejections produce `None`.
    ///
    /// # Arguments
    /// * `insight` - The insight the decision was made for
    /// * `decision` - Output of [`Curator::decide`]
    /// * `insight_embedding` - Embedding of the insight text
    /// * `merged_embedding` - Embedding of the merged content, when
    ///   [`CurationDecision::needs_merged_embedding`] is true
    ///
    /// # Errors
    /// Returns `InvalidDelta` if a merged embedding is required but missing.
    pub fn build_delta(
        &self,
        insight: &ReflectionInsight,
        decision: &CurationDecision,
        insight_embedding: &[f32],
        merged_embedding: Option<Vec<f32>>,
    ) -> Result<Option<DeltaUpdate>> {
        let insight_id = Some(insight.id.clone());
        let delta = match decision {
            CurationDecision::Rejected(_) => return Ok(None),
            CurationDecision::Reinforce { target, similarity, merged_content, content_changed } => {
                let content = if *content_changed {
                    let embedding = merged_embedding.ok_or_else(|| {
                        PlaybookError::InvalidDelta(format!(
                            "merged content for {} has no embedding",
                            target
                        ))
                    })?;
                    Some(RevisedContent { text: merged_content.clone(), embedding })
                } else {
                    None
                };
                let reasoning =
                    format!("Reinforces {} (similarity {:.3})", target, similarity);
                let op = DeltaOperation::Update {
                    bullet_id: target.clone(),
                    content,
                    helpful_increment: 1,
                    harmful_increment: 0,
                };
                DeltaUpdate::new(insight_id, reasoning, vec![op])
            }
            CurationDecision::Add { section, content, dedup } => {
                let mut operations =
                    vec![DeltaOperation::add(section, content, insight_embedding.to_vec())];
                let reasoning = match dedup {
                    Some((winner, losers)) => {
                        operations.push(DeltaOperation::Deduplicate {
                            winner_id: winner.clone(),
                            loser_ids: losers.clone(),
                        });
                        format!(
                            "New strategy in {}; folding {} related bullets into {}",
                            section,
                            losers.len(),
                            winner
                        )
                    }
                    None => format!("New strategy in {}", section),
                };
                DeltaUpdate::new(insight_id, reasoning, operations)
            }
        };

        debug!(delta_id = %delta.id(), ops = delta.operations().len(), "Built curation delta");
        Ok(Some(delta))
    }

    /// Builds a REMOVE delta for administrative pruning.
    pub fn removal(&self, ids: &[BulletId], reasoning: impl Into<String>) -> DeltaUpdate {
        let operations = ids.iter().cloned().map(DeltaOperation::remove).collect();
        DeltaUpdate::new(None, reasoning, operations)
    }
}

fn section_of(insight: &ReflectionInsight) -> String {
    let section = insight.section.trim();
    if section.is_empty() { DEFAULT_SECTION.to_string() } else { section.to_string() }
}

/// Highest net score wins; ties go to the earliest created bullet.
fn pick_winner(related: &[&Bullet]) -> (BulletId, Vec<BulletId>) {
    let mut ordered: Vec<&Bullet> = related.to_vec();
    ordered.sort_by(|a, b| {
        b.net_score()
            .cmp(&a.net_score())
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    let winner = ordered[0].id.clone();
    let losers = ordered[1..].iter().map(|b| b.id.clone()).collect();
    (winner, losers)
}
