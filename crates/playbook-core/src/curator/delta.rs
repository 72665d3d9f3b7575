//! Delta updates for the playbook.
//!
//! Curation never rewrites the playbook wholesale. It emits a small ordered
//! list of operations (ADD, UPDATE, DEDUPLICATE, REMOVE) that is applied as
//! one atomic step.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bullets::BulletId;

/// Identifier of one delta, used to make application idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaId(pub Uuid);

impl DeltaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DeltaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeltaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Single mutation inside a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeltaOperation {
    /// Create a new bullet.
    Add {
        section: String,
        content: String,
        /// Embedding of `content`.
        embedding: Vec<f32>,
    },
    /// Revise an existing bullet's content and/or counters.
    Update {
        bullet_id: BulletId,
        /// Replacement content and its embedding, if the content changes.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<RevisedContent>,
        #[serde(default)]
        helpful_increment: u32,
        #[serde(default)]
        harmful_increment: u32,
    },
    /// Fold `loser_ids` into `winner_id`: counters are summed into the
    /// winner, then the losers are removed.
    Deduplicate { winner_id: BulletId, loser_ids: Vec<BulletId> },
    /// Delete a bullet.
    Remove { bullet_id: BulletId },
}

/// New content for an UPDATE, with the embedding computed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisedContent {
    pub text: String,
    pub embedding: Vec<f32>,
}

impl DeltaOperation {
    /// Creates an ADD operation.
    pub fn add(section: impl Into<String>, content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self::Add { section: section.into(), content: content.into(), embedding }
    }

    /// Creates an UPDATE operation that only bumps counters.
    pub fn bump(bullet_id: BulletId, helpful_increment: u32, harmful_increment: u32) -> Self {
        Self::Update { bullet_id, content: None, helpful_increment, harmful_increment }
    }

    /// Creates a REMOVE operation.
    pub fn remove(bullet_id: BulletId) -> Self {
        Self::Remove { bullet_id }
    }

    /// Short uppercase operation name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "ADD",
            Self::Update { .. } => "UPDATE",
            Self::Deduplicate { .. } => "DEDUPLICATE",
            Self::Remove { .. } => "REMOVE",
        }
    }

    /// One-line description for the delta history, without embeddings.
    pub fn summary(&self) -> String {
        match self {
            Self::Add { section, content, .. } => format!("ADD [{}] {}", section, content),
            Self::Update { bullet_id, content, helpful_increment, harmful_increment } => {
                let mut parts = Vec::new();
                if let Some(revised) = content {
                    parts.push(format!("content={:?}", revised.text));
                }
                if *helpful_increment > 0 {
                    parts.push(format!("helpful+{}", helpful_increment));
                }
                if *harmful_increment > 0 {
                    parts.push(format!("harmful+{}", harmful_increment));
                }
                format!("UPDATE {} {}", bullet_id, parts.join(" "))
            }
            Self::Deduplicate { winner_id, loser_ids } => {
                let losers: Vec<&str> = loser_ids.iter().map(BulletId::as_str).collect();
                format!("DEDUPLICATE {} <- {}", winner_id, losers.join(","))
            }
            Self::Remove { bullet_id } => format!("REMOVE {}", bullet_id),
        }
    }
}

/// Ordered, immutable set of operations derived from one insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaUpdate {
    id: DeltaId,
    insight_id: Option<String>,
    reasoning: String,
    operations: Vec<DeltaOperation>,
    created_at: DateTime<Utc>,
}

impl DeltaUpdate {
    /// Creates a delta with a fresh id.
    pub fn new(
        insight_id: Option<String>,
        reasoning: impl Into<String>,
        operations: Vec<DeltaOperation>,
    ) -> Self {
        Self {
            id: DeltaId::new(),
            insight_id,
            reasoning: reasoning.into(),
            operations,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> DeltaId {
        self.id
    }

    pub fn insight_id(&self) -> Option<&str> {
        self.insight_id.as_deref()
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn operations(&self) -> &[DeltaOperation] {
        &self.operations
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Checks if the delta has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Audit record of an applied delta, as stored in the delta history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDeltaRecord {
    pub delta_id: DeltaId,
    #[serde(default)]
    pub insight_id: Option<String>,
    pub reasoning: String,
    pub applied_at: DateTime<Utc>,
    pub operations: Vec<String>,
    /// Bullets created, changed or removed by the delta.
    pub affected: Vec<BulletId>,
}
