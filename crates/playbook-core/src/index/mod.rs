//! Vector index adapter.
//!
//! Provides abstraction over similarity-search backends. The index is a
//! derived projection of the bullet store (id → embedding) and can always be
//! rebuilt from it.
//!
//! Stale entries are tolerated: an index may briefly hold an id the store no
//! longer has. Callers resolve every hit against the store and drop misses.

mod flat;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bullets::BulletId;

pub use flat::FlatIndex;

/// Errors raised by index backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// Vector length differs from the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Zero-length vector.
    #[error("empty vector")]
    EmptyVector,

    /// Vector contains NaN or infinity.
    #[error("vector contains non-finite values")]
    NonFinite,

    /// Backend state could not be exported.
    #[error("index serialization failed: {0}")]
    Serialization(String),
}

/// Distance metric used to score neighbours.
///
/// Every metric is turned into a similarity where larger means closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine of the angle between vectors.
    #[default]
    Cosine,
    /// Raw inner product.
    DotProduct,
    /// `1 / (1 + euclidean distance)`.
    Euclidean,
}

impl DistanceMetric {
    /// Similarity of two equal-length vectors.
    pub fn similarity(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let dot = dot(a, b);
                let norm = dot_self(a).sqrt() * dot_self(b).sqrt();
                if norm == 0.0 { 0.0 } else { dot / norm }
            }
            Self::DotProduct => dot(a, b),
            Self::Euclidean => {
                let distance: f32 =
                    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt();
                1.0 / (1.0 + distance)
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn dot_self(a: &[f32]) -> f32 {
    dot(a, a)
}

/// One neighbour returned by [`VectorIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// The bullet id.
    pub id: BulletId,
    /// Similarity to the query, larger is closer.
    pub similarity: f32,
}

/// Capability set every similarity-search backend provides.
///
/// Contract:
/// - `query` returns hits by descending similarity; equal similarities keep
///   insertion order (earlier-inserted id first).
/// - `insert` on an existing id replaces its vector and keeps its position.
/// - `rebuild` replaces the whole contents, or leaves them untouched on error.
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces the vector for an id.
    fn insert(&mut self, id: &BulletId, embedding: &[f32]) -> Result<(), IndexError>;

    /// Removes an id. Returns whether it was present.
    fn remove(&mut self, id: &BulletId) -> bool;

    /// The `k` nearest ids to `embedding`.
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>, IndexError>;

    /// Replaces the contents with `entries`, inserted in the given order.
    fn rebuild(&mut self, entries: &[(BulletId, Vec<f32>)]) -> Result<(), IndexError>;

    /// Number of indexed ids.
    fn len(&self) -> usize;

    /// Whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Indexed ids in insertion order.
    fn ids(&self) -> Vec<BulletId>;

    /// Vector length, once known.
    fn dimension(&self) -> Option<usize>;

    /// The configured metric.
    fn metric(&self) -> DistanceMetric;

    /// Opaque export of the backend state.
    fn to_blob(&self) -> Result<Vec<u8>, IndexError>;
}

/// Rejects vectors no backend should accept.
pub fn check_vector(embedding: &[f32]) -> Result<(), IndexError> {
    if embedding.is_empty() {
        return Err(IndexError::EmptyVector);
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(IndexError::NonFinite);
    }
    Ok(())
}
