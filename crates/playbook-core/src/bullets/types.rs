//! Bullet entity and identifiers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::curator::DeltaId;

/// Opaque bullet identifier, unique for the lifetime of a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulletId(String);

impl BulletId {
    /// Wraps an existing identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Builds the id for a section and store sequence number, e.g. `validation-00001`.
    pub(crate) fn for_section(section: &str, sequence: u64) -> Self {
        let prefix: String = section
            .split_whitespace()
            .next()
            .unwrap_or("general")
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect::<String>()
            .to_lowercase();
        let prefix = if prefix.is_empty() { "general".to_string() } else { prefix };
        Self(format!("{}-{:05}", prefix, sequence))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BulletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BulletId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for BulletId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A single stored strategy with its feedback counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    /// Unique identifier for the bullet.
    pub id: BulletId,
    /// The strategy or fact.
    pub content: String,
    /// Category label, used for grouping and display only.
    pub section: String,
    /// Vector produced for `content` at creation or last content update.
    pub embedding: Vec<f32>,
    /// Count of times this bullet was reported helpful.
    pub helpful_count: u32,
    /// Count of times this bullet was reported harmful.
    pub harmful_count: u32,
    /// Timestamp when this bullet was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp when this bullet was last updated.
    pub updated_at: DateTime<Utc>,
    /// The insight that created or last modified this bullet.
    #[serde(default)]
    pub source_insight_id: Option<String>,
    /// The delta that last touched this bullet.
    #[serde(default)]
    pub last_delta_id: Option<DeltaId>,
}

impl Bullet {
    pub(crate) fn new(id: BulletId, content: String, section: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id,
            content,
            section,
            embedding,
            helpful_count: 0,
            harmful_count: 0,
            created_at: now,
            updated_at: now,
            source_insight_id: None,
            last_delta_id: None,
        }
    }

    /// `helpful_count - harmful_count`.
    pub fn net_score(&self) -> i64 {
        i64::from(self.helpful_count) - i64::from(self.harmful_count)
    }
}
