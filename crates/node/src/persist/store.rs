//! Storage backends for persisted artifacts.
use std::{
    collections::HashMap,
    fmt,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::trace;

use crate::errors::PersistenceError;

/// A named blob of node core state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistedArtifact {
    /// The channel manager. Critical.
    Manager,

    /// The network graph. Best effort.
    NetworkGraph,

    /// The payment scorer. Best effort.
    Scorer,
}

impl PersistedArtifact {
    /// Every artifact.
    pub const ALL: [PersistedArtifact; 3] = [
        PersistedArtifact::Manager,
        PersistedArtifact::NetworkGraph,
        PersistedArtifact::Scorer,
    ];

    /// The name the artifact is stored under.
    pub const fn file_name(&self) -> &'static str {
        match self {
            PersistedArtifact::Manager => "manager",
            PersistedArtifact::NetworkGraph => "network_graph",
            PersistedArtifact::Scorer => "scorer",
        }
    }
}

impl fmt::Display for PersistedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Stores artifacts. Every write must replace the previous blob all at once: a reader sees either
/// the old blob or the new one, never a mix or a truncation.
#[async_trait]
pub trait ArtifactStore: Send + Sync + fmt::Debug {
    /// Replaces the stored blob of `artifact`.
    async fn write(&self, artifact: PersistedArtifact, bytes: Vec<u8>)
        -> Result<(), PersistenceError>;

    /// Reads the stored blob of `artifact`, if any.
    async fn read(&self, artifact: PersistedArtifact) -> Result<Option<Vec<u8>>, PersistenceError>;
}

/// Stores every artifact as a file in one directory.
///
/// A write goes to a temporary file in the same directory, is synced, and is then renamed over the
/// target, after which the directory itself is synced.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    dir: PathBuf,
}

impl FsArtifactStore {
    /// Opens a store in `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// The directory the artifacts are stored in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `artifact`.
    pub fn path_of(&self, artifact: PersistedArtifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let staged = stage(dir, bytes)?;
    install(staged, dir, target)
}

/// Writes `bytes` to a synced temporary file in `dir`. Dropping the result removes the file.
fn stage(dir: &Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Renames a staged file over `target` and syncs the directory entry.
fn install(staged: NamedTempFile, dir: &Path, target: &Path) -> io::Result<()> {
    staged.persist(target).map_err(|e| e.error)?;

    #[cfg(unix)]
    File::open(dir)?.sync_all()?;

    Ok(())
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn write(
        &self,
        artifact: PersistedArtifact,
        bytes: Vec<u8>,
    ) -> Result<(), PersistenceError> {
        let dir = self.dir.clone();
        let target = self.path_of(artifact);
        trace!(%artifact, len = bytes.len(), "writing artifact");

        tokio::task::spawn_blocking(move || write_atomically(&dir, &target, &bytes))
            .await
            .map_err(|e| PersistenceError::Join(e.to_string()))??;
        Ok(())
    }

    async fn read(&self, artifact: PersistedArtifact) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.path_of(artifact);
        let read = tokio::task::spawn_blocking(move || match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        })
        .await
        .map_err(|e| PersistenceError::Join(e.to_string()))??;
        Ok(read)
    }
}

/// Keeps artifacts in memory. Writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    blobs: RwLock<HashMap<PersistedArtifact, Vec<u8>>>,
    failing_writes: AtomicUsize,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` writes fail.
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn write(
        &self,
        artifact: PersistedArtifact,
        bytes: Vec<u8>,
    ) -> Result<(), PersistenceError> {
        let failing = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(io::Error::other(format!("injected failure writing {artifact}")).into());
        }

        self.blobs.write().insert(artifact, bytes);
        Ok(())
    }

    async fn read(&self, artifact: PersistedArtifact) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.blobs.read().get(&artifact).cloned())
    }
}
