//! Exact brute-force index.
//!
//! Scores every stored vector on each query. Adequate for playbooks of a few
//! thousand bullets; larger deployments can plug in an ANN backend behind the
//! same trait.

use std::collections::HashMap;

use serde::Serialize;

use super::{DistanceMetric, IndexError, IndexHit, VectorIndex, check_vector};
use crate::bullets::BulletId;

#[derive(Debug, Clone, Serialize)]
struct Entry {
    id: BulletId,
    vector: Vec<f32>,
}

#[derive(Serialize)]
struct FlatIndexBlob<'a> {
    metric: DistanceMetric,
    dimension: Option<usize>,
    entries: &'a [Entry],
}

/// In-memory exact index, entries kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    metric: DistanceMetric,
    dimension: Option<usize>,
    entries: Vec<Entry>,
    positions: HashMap<BulletId, usize>,
}

impl FlatIndex {
    /// Creates an empty index for `metric`.
    pub fn new(metric: DistanceMetric) -> Self {
        Self { metric, ..Self::default() }
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), IndexError> {
        check_vector(embedding)?;
        match self.dimension {
            Some(expected) if expected != embedding.len() => {
                Err(IndexError::DimensionMismatch { expected, actual: embedding.len() })
            }
            _ => Ok(()),
        }
    }

    fn reindex_positions(&mut self) {
        self.positions =
            self.entries.iter().enumerate().map(|(pos, e)| (e.id.clone(), pos)).collect();
    }
}

impl VectorIndex for FlatIndex {
    fn insert(&mut self, id: &BulletId, embedding: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(embedding)?;
        self.dimension = Some(embedding.len());

        if let Some(&pos) = self.positions.get(id) {
            self.entries[pos].vector = embedding.to_vec();
        } else {
            self.positions.insert(id.clone(), self.entries.len());
            self.entries.push(Entry { id: id.clone(), vector: embedding.to_vec() });
        }
        Ok(())
    }

    fn remove(&mut self, id: &BulletId) -> bool {
        let Some(pos) = self.positions.remove(id) else {
            return false;
        };
        self.entries.remove(pos);
        self.reindex_positions();
        if self.entries.is_empty() {
            self.dimension = None;
        }
        true
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>, IndexError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimension(embedding)?;

        let mut hits: Vec<IndexHit> = self
            .entries
            .iter()
            .map(|entry| IndexHit {
                id: entry.id.clone(),
                similarity: self.metric.similarity(embedding, &entry.vector),
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(k);
        Ok(hits)
    }

    fn rebuild(&mut self, entries: &[(BulletId, Vec<f32>)]) -> Result<(), IndexError> {
        let mut fresh = Self::new(self.metric);
        for (id, vector) in entries {
            fresh.insert(id, vector)?;
        }
        *self = fresh;
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn ids(&self) -> Vec<BulletId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn to_blob(&self) -> Result<Vec<u8>, IndexError> {
        let blob =
            FlatIndexBlob { metric: self.metric, dimension: self.dimension, entries: &self.entries };
        serde_json::to_vec(&blob).map_err(|e| IndexError::Serialization(e.to_string()))
    }
}
