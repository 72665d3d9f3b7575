//! Configuration for the playbook engine.
//!
//! All fields have defaults, so an empty `playbook.toml` is valid:
//!
//! ```toml
//! [curator]
//! min_confidence = 0.5
//! duplicate_threshold = 0.9
//! related_threshold = 0.75
//!
//! [retrieval]
//! candidate_multiplier = 3
//!
//! [embedding]
//! dimension = 384
//! timeout_ms = 10000
//!
//! [index]
//! metric = "cosine"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PlaybookError, Result};
use crate::index::DistanceMetric;

/// Default configuration file name inside a playbook directory.
pub const CONFIG_FILE_NAME: &str = "playbook.toml";

/// Curation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratorConfig {
    /// Insights below this confidence are rejected.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Similarity above which an insight reinforces an existing bullet.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,
    /// Similarity above which existing bullets count as related.
    #[serde(default = "default_related_threshold")]
    pub related_threshold: f32,
    /// How many nearest bullets are considered per insight.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
}

fn default_min_confidence() -> f32 {
    0.5
}

fn default_duplicate_threshold() -> f32 {
    0.9
}

fn default_related_threshold() -> f32 {
    0.75
}

fn default_candidate_limit() -> usize {
    8
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            duplicate_threshold: default_duplicate_threshold(),
            related_threshold: default_related_threshold(),
            candidate_limit: default_candidate_limit(),
        }
    }
}

impl CuratorConfig {
    /// Thresholds for bag-of-words vectors such as [`HashingEmbedder`].
    ///
    /// Hashed token vectors score lower than sentence embeddings for the
    /// same paraphrase: three shared content words out of three and five
    /// give a cosine of about 0.77.
    ///
    /// [`HashingEmbedder`]: crate::embedding::HashingEmbedder
    pub fn for_hashing_embedder() -> Self {
        Self { duplicate_threshold: 0.75, related_threshold: 0.5, ..Self::default() }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Index over-fetch factor applied to `top_k` before filtering.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    /// `top_k` used when a caller does not pick one.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_top_k() -> usize {
    5
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { candidate_multiplier: default_candidate_multiplier(), default_top_k: default_top_k() }
    }
}

/// Embedding collaborator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Expected vector length.
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Deadline for one embedding call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_dimension() -> usize {
    384
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl EmbeddingConfig {
    /// `timeout_ms` as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimension: default_dimension(), timeout_ms: default_timeout_ms() }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub metric: DistanceMetric,
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybookConfig {
    #[serde(default)]
    pub curator: CuratorConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

impl PlaybookConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with curator thresholds for [`HashingEmbedder`](crate::embedding::HashingEmbedder).
    #[must_use]
    pub fn for_hashing_embedder() -> Self {
        Self { curator: CuratorConfig::for_hashing_embedder(), ..Self::default() }
    }

    /// Parses TOML and validates the result.
    ///
    /// # Errors
    /// Returns `Config` if parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| PlaybookError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns `Config` if the file is missing, unreadable or invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PlaybookError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
            .map_err(|e| PlaybookError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Serializes to pretty TOML.
    ///
    /// # Errors
    /// Returns `Config` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PlaybookError::Config(e.to_string()))
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// Returns `Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let curator = &self.curator;
        for (name, value) in [
            ("curator.min_confidence", curator.min_confidence),
            ("curator.duplicate_threshold", curator.duplicate_threshold),
            ("curator.related_threshold", curator.related_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PlaybookError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if curator.related_threshold > curator.duplicate_threshold {
            return Err(PlaybookError::Config(format!(
                "curator.related_threshold ({}) must not exceed curator.duplicate_threshold ({})",
                curator.related_threshold, curator.duplicate_threshold
            )));
        }
        if curator.candidate_limit == 0 {
            return Err(PlaybookError::Config("curator.candidate_limit must be at least 1".into()));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(PlaybookError::Config(
                "retrieval.candidate_multiplier must be at least 1".into(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(PlaybookError::Config("embedding.dimension must be at least 1".into()));
        }
        if self.embedding.timeout_ms == 0 {
            return Err(PlaybookError::Config("embedding.timeout_ms must be at least 1".into()));
        }
        Ok(())
    }
}
