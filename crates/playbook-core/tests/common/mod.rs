//! Shared fixtures for playbook integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use playbook_core::{
    BulletId, DistanceMetric, Embedder, EmbeddingError, FlatIndex, IndexError, IndexHit,
    InMemorySnapshotBackend, Playbook, PlaybookConfig, SnapshotBackend, VectorIndex,
};

pub const DIMENSION: usize = 12;

/// Keyword axes. Texts sharing keywords point the same way.
const AXES: &[&[&str]] = &[
    &["validate", "validation", "validating", "validates"],
    &["email", "emails"],
    &["format", "formats"],
    &["payment", "payments"],
    &["retry", "retries", "retrying"],
    &["signup", "form", "forms"],
    &["log", "logs", "logging"],
    &["timeout", "timeouts"],
];

/// Deterministic embedder over a fixed keyword vocabulary.
///
/// Words outside the vocabulary are ignored unless the text has no keyword
/// at all, in which case they are hashed onto the remaining axes.
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; DIMENSION];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        let mut matched = false;
        for word in &words {
            if let Some(axis) = AXES.iter().position(|forms| forms.contains(&word.as_str())) {
                vector[axis] = 1.0;
                matched = true;
            }
        }
        if !matched {
            let spare = DIMENSION - AXES.len();
            for word in &words {
                let bucket = word.bytes().map(usize::from).sum::<usize>() % spare;
                vector[AXES.len() + bucket] += 1.0;
            }
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

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Request("embedding service unavailable".to_string()));
        }
        Ok(Self::vector(text))
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embedder_id(&self) -> &str {
        "keyword"
    }
}

/// Index wrapper whose inserts can be made to fail.
pub struct FlakyIndex {
    inner: FlatIndex,
    fail_inserts: Arc<AtomicBool>,
}

impl FlakyIndex {
    pub fn new(fail_inserts: Arc<AtomicBool>) -> Self {
        Self { inner: FlatIndex::new(DistanceMetric::Cosine), fail_inserts }
    }
}

impl VectorIndex for FlakyIndex {
    fn insert(&mut self, id: &BulletId, embedding: &[f32]) -> Result<(), IndexError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(IndexError::Serialization("injected insert failure".to_string()));
        }
        self.inner.insert(id, embedding)
    }

    fn remove(&mut self, id: &BulletId) -> bool {
        self.inner.remove(id)
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<IndexHit>, IndexError> {
        self.inner.query(embedding, k)
    }

    fn rebuild(&mut self, entries: &[(BulletId, Vec<f32>)]) -> Result<(), IndexError> {
        self.inner.rebuild(entries)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn ids(&self) -> Vec<BulletId> {
        self.inner.ids()
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }

    fn metric(&self) -> DistanceMetric {
        self.inner.metric()
    }

    fn to_blob(&self) -> Result<Vec<u8>, IndexError> {
        self.inner.to_blob()
    }
}

pub fn test_config() -> PlaybookConfig {
    let mut config = PlaybookConfig::default();
    config.embedding.dimension = DIMENSION;
    config.embedding.timeout_ms = 1_000;
    config
}

pub async fn open_with(
    embedder: Arc<KeywordEmbedder>,
    backend: Arc<dyn SnapshotBackend>,
) -> Playbook {
    Playbook::open(test_config(), embedder, backend).await.unwrap()
}

/// Playbook over an in-memory backend with a fresh keyword embedder.
pub async fn memory_playbook() -> (Playbook, Arc<KeywordEmbedder>, Arc<InMemorySnapshotBackend>) {
    let embedder = Arc::new(KeywordEmbedder::new());
    let backend = Arc::new(InMemorySnapshotBackend::new());
    let playbook = open_with(embedder.clone(), backend.clone()).await;
    (playbook, embedder, backend)
}

/// Enables `RUST_LOG`-controlled tracing output for a test run.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
