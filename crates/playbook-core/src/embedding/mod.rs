//! Embedding helpers.
//!
//! [`embed_checked`] is the only way the playbook calls an [`Embedder`]: it
//! bounds the call with a timeout and rejects vectors that could not have
//! come from a healthy provider.
//!
//! [`HashingEmbedder`] is a local, deterministic embedder based on feature
//! hashing. It needs no network and is what the CLI uses by default.

use std::time::Duration;

use async_trait::async_trait;
use playbook_abstraction::{Embedder, EmbeddingError};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Default vector length, matching common sentence-transformer models.
pub const DEFAULT_DIMENSION: usize = 384;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "and", "or", "in", "on", "for", "with", "by", "at", "as", "it",
    "its", "this", "that", "from", "is", "are", "be", "been", "was", "were", "how", "what", "when",
    "always", "never", "should", "do", "does", "you", "your", "we", "our", "i",
];

const SUFFIXES: &[&str] = &[
    "ations", "ation", "ating", "ated", "ates", "ate", "ings", "ing", "ions", "ion", "ed", "es",
    "s", "e",
];

/// Calls `embedder` with a deadline and validates the vector.
///
/// # Errors
/// Returns `Timeout` if the deadline passes, `EmptyInput` for blank text,
/// `InvalidResponse` for a vector of the wrong length, with non-finite
/// values or with all zeros, and any error the embedder itself returns.
pub async fn embed_checked(
    embedder: &dyn Embedder,
    text: &str,
    dimension: usize,
    timeout: Duration,
) -> Result<Vec<f32>, EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::EmptyInput);
    }

    let embedding = tokio::time::timeout(timeout, embedder.embed(text))
        .await
        .map_err(|_| EmbeddingError::Timeout { timeout_ms: timeout.as_millis() as u64 })??;

    if let Err(e) = validate_embedding(&embedding, dimension) {
        warn!(embedder = embedder.embedder_id(), error = %e, "Rejected embedding");
        return Err(e);
    }
    Ok(embedding)
}

/// Checks length and values of a provider vector.
pub fn validate_embedding(embedding: &[f32], dimension: usize) -> Result<(), EmbeddingError> {
    if embedding.len() != dimension {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} dimensions, got {}",
            dimension,
            embedding.len()
        )));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(EmbeddingError::InvalidResponse("vector contains non-finite values".into()));
    }
    if embedding.iter().all(|v| *v == 0.0) {
        return Err(EmbeddingError::InvalidResponse("zero vector".into()));
    }
    Ok(())
}

/// Deterministic bag-of-words embedder using signed feature hashing.
///
/// Tokens are lowercased, stopwords dropped and common suffixes stripped, so
/// "validate" and "validation" land in the same bucket. Output is L2
/// normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Creates an embedder producing `dimension`-length vectors (at least 1).
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = tokenize(text);
        if tokens.is_empty() {
            tokens.push(text.trim().to_lowercase());
        }

        for token in &tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embedder_id(&self) -> &str {
        "hashing"
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .collect()
}

fn stem(word: &str) -> String {
    for suffix in SUFFIXES {
        if let Some(stem) = word.strip_suffix(suffix) {
            if stem.len() >= 3 {
                return stem.to_string();
            }
        }
    }
    word.to_string()
}
