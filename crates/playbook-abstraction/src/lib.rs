//! Collaborator contracts for the playbook engine.
//!
//! This crate defines the boundary between the playbook core and the two
//! external collaborators it depends on: the embedding function that turns
//! text into vectors, and the reflection step that turns raw feedback into a
//! structured [`ReflectionInsight`]. Neither collaborator is implemented here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Represents an error that can occur when calling an embedding provider.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingError {
    /// An error occurred during the request (e.g., network issues, invalid request).
    #[error("Request Error: {0}")]
    Request(String),

    /// The provider did not answer within the configured deadline.
    #[error("Embedding request timed out after {timeout_ms} ms")]
    Timeout {
        /// The deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// Provider quota exceeded or rate limit hit (hard stop error).
    #[error("Provider '{provider}' quota exceeded{}", message.as_ref().map(|m| format!(": {}", m)).unwrap_or_default())]
    QuotaExceeded {
        /// The provider name (e.g., "openai", "ollama").
        provider: String,
        /// Optional error message from the provider.
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The provider answered with something that is not a usable vector.
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),

    /// The input text was empty after trimming.
    #[error("Cannot embed empty text")]
    EmptyInput,
}

/// A text-to-vector embedding function.
///
/// Implementations must be deterministic enough that the same text yields
/// comparable vectors across calls, and must report failure as an
/// [`EmbeddingError`] instead of returning a placeholder vector.
///
/// All embedders must be `Send + Sync` to allow concurrent use across threads.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds a single text.
    ///
    /// # Errors
    /// Returns an `EmbeddingError` if the provider fails or times out.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Identifier of the embedding model, for logs.
    fn embedder_id(&self) -> &str {
        "unknown"
    }

    /// Embeds several texts in order.
    ///
    /// The default implementation calls [`Embedder::embed`] once per text and
    /// stops at the first failure.
    ///
    /// # Errors
    /// Returns the first `EmbeddingError` encountered.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// A structured suggestion for a new or revised bullet.
///
/// Produced by the external reflection step and consumed read-only by the
/// curator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionInsight {
    /// Identifier recorded as `source_insight_id` on bullets this insight touches.
    pub id: String,
    /// Proposed bullet content.
    pub key_insight: String,
    /// Proposed section label.
    pub section: String,
    /// Confidence of the reflection step, 0.0 to 1.0.
    pub confidence: f32,
    /// The interaction that produced this insight, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
    /// Bullets the reflection referred to while producing this insight.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullet_ids: Vec<String>,
}

impl ReflectionInsight {
    /// Creates an insight with a fresh identifier.
    pub fn new(key_insight: impl Into<String>, section: impl Into<String>, confidence: f32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key_insight: key_insight.into(),
            section: section.into(),
            confidence,
            interaction_id: None,
            bullet_ids: Vec::new(),
        }
    }

    /// Sets the interaction pointer.
    #[must_use]
    pub fn with_interaction(mut self, interaction_id: impl Into<String>) -> Self {
        self.interaction_id = Some(interaction_id.into());
        self
    }

    /// Records the bullets the reflection referred to.
    #[must_use]
    pub fn with_bullet_ids(mut self, bullet_ids: Vec<String>) -> Self {
        self.bullet_ids = bullet_ids;
        self
    }
}
