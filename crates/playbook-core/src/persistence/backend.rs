//! Snapshot storage backends.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    BULLETS_FILE, DELTAS_FILE, INDEX_FILE, LoadedState, MARKDOWN_FILE, PlaybookSnapshot,
    render_markdown,
};
use crate::curator::AppliedDeltaRecord;
use crate::error::{PlaybookError, Result};

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Persists a snapshot.
    ///
    /// # Arguments
    /// * `snapshot` - Full bullet state
    /// * `index_blob` - Opaque index export, stored for inspection only
    /// * `new_deltas` - Delta records applied since the last successful save
    ///
    /// # Errors
    /// Returns `PersistenceFailure` if anything could not be written.
    async fn save(
        &self,
        snapshot: &PlaybookSnapshot,
        index_blob: &[u8],
        new_deltas: &[AppliedDeltaRecord],
    ) -> Result<()>;

    /// Loads the last saved state, or `None` if nothing was saved yet.
    ///
    /// # Errors
    /// Returns `PersistenceFailure` or `CorruptSnapshot` if saved state
    /// exists but cannot be read.
    async fn load(&self) -> Result<Option<LoadedState>>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Stores a playbook as files in one directory.
pub struct DirectorySnapshotBackend {
    root: PathBuf,
}

impl DirectorySnapshotBackend {
    /// Creates a backend rooted at `root`, creating the directory.
    ///
    /// # Errors
    /// Returns `PersistenceFailure` if the directory cannot be created.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .map_err(|source| PlaybookError::PersistenceFailure { path: root.clone(), source })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `bytes` to `name` via a temp file and rename.
    async fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(name);
        let temp_path = self.root.join(format!("{}.tmp", name));
        let failure = |source| PlaybookError::PersistenceFailure { path: path.clone(), source };

        tokio::fs::write(&temp_path, bytes).await.map_err(failure)?;
        tokio::fs::rename(&temp_path, &path).await.map_err(failure)?;
        Ok(())
    }

    async fn append_deltas(&self, records: &[AppliedDeltaRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let path = self.root.join(DELTAS_FILE);
        let failure = |source| PlaybookError::PersistenceFailure { path: path.clone(), source };

        let mut lines = String::new();
        for record in records {
            lines.push_str(&serde_json::to_string(record)?);
            lines.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(failure)?;
        file.write_all(lines.as_bytes()).await.map_err(failure)?;
        file.flush().await.map_err(failure)?;
        Ok(())
    }

    async fn read_deltas(&self) -> Result<Vec<AppliedDeltaRecord>> {
        let path = self.root.join(DELTAS_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(PlaybookError::PersistenceFailure { path, source }),
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AppliedDeltaRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(path = %path.display(), line = line_no + 1, error = %e, "Skipping unreadable delta record");
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl SnapshotBackend for DirectorySnapshotBackend {
    async fn save(
        &self,
        snapshot: &PlaybookSnapshot,
        index_blob: &[u8],
        new_deltas: &[AppliedDeltaRecord],
    ) -> Result<()> {
        let bullets = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomic(BULLETS_FILE, &bullets).await?;
        self.write_atomic(INDEX_FILE, index_blob).await?;
        self.write_atomic(MARKDOWN_FILE, render_markdown(snapshot).as_bytes()).await?;
        self.append_deltas(new_deltas).await?;

        debug!(
            root = %self.root.display(),
            bullets = snapshot.bullets.len(),
            deltas = new_deltas.len(),
            "Snapshot written"
        );
        Ok(())
    }

    async fn load(&self) -> Result<Option<LoadedState>> {
        let path = self.root.join(BULLETS_FILE);
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PlaybookError::PersistenceFailure { path, source }),
        };

        let snapshot: PlaybookSnapshot = serde_json::from_slice(&content).map_err(|e| {
            PlaybookError::CorruptSnapshot(format!("{}: {}", path.display(), e))
        })?;
        if !snapshot.is_supported() {
            return Err(PlaybookError::PersistenceFailure {
                path,
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsupported snapshot version {}", snapshot.version),
                ),
            });
        }

        let deltas = self.read_deltas().await?;
        Ok(Some(LoadedState { snapshot, deltas }))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[derive(Default)]
struct MemoryState {
    snapshot: Option<PlaybookSnapshot>,
    index_blob: Vec<u8>,
    deltas: Vec<AppliedDeltaRecord>,
}

/// Keeps snapshots in memory. Useful for tests and ephemeral playbooks.
#[derive(Default)]
pub struct InMemorySnapshotBackend {
    state: Mutex<MemoryState>,
    saves: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemorySnapshotBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `save` fail until switched off again.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The last saved snapshot.
    pub async fn snapshot(&self) -> Option<PlaybookSnapshot> {
        self.state.lock().await.snapshot.clone()
    }

    /// The last saved index blob.
    pub async fn index_blob(&self) -> Vec<u8> {
        self.state.lock().await.index_blob.clone()
    }

    /// Every delta record saved so far.
    pub async fn deltas(&self) -> Vec<AppliedDeltaRecord> {
        self.state.lock().await.deltas.clone()
    }
}

#[async_trait]
impl SnapshotBackend for InMemorySnapshotBackend {
    async fn save(
        &self,
        snapshot: &PlaybookSnapshot,
        index_blob: &[u8],
        new_deltas: &[AppliedDeltaRecord],
    ) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PlaybookError::PersistenceFailure {
                path: PathBuf::from("memory"),
                source: io::Error::other("writes disabled"),
            });
        }

        let mut state = self.state.lock().await;
        state.snapshot = Some(snapshot.clone());
        state.index_blob = index_blob.to_vec();
        state.deltas.extend_from_slice(new_deltas);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self) -> Result<Option<LoadedState>> {
        let state = self.state.lock().await;
        Ok(state
            .snapshot
            .clone()
            .map(|snapshot| LoadedState { snapshot, deltas: state.deltas.clone() }))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
