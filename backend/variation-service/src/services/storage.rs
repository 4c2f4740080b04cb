/// Artifact storage for uploaded sources and produced variations
///
/// Artifacts are immutable once written: every transform output is stored as
/// a new artifact. Two backends are provided:
/// - `FsArtifactStore`: `uploads/` and `processed/` directories, files named `<id>.mp4`
/// - `MemoryArtifactStore`: process-local map, used in tests and mock mode
///
/// Age-based eviction skips artifacts currently held as a job source.
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::{Artifact, ArtifactOrigin};

/// Container extension used for every stored artifact
pub const ARTIFACT_EXTENSION: &str = "mp4";

/// Reference counts for artifacts that must survive sweeps
#[derive(Debug, Default)]
pub struct HoldRegistry {
    holds: DashMap<Uuid, usize>,
}

impl HoldRegistry {
    pub fn acquire(&self, id: Uuid) {
        *self.holds.entry(id).or_insert(0) += 1;
    }

    pub fn release(&self, id: Uuid) {
        let remove = match self.holds.get_mut(&id) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if remove {
            self.holds.remove_if(&id, |_, count| *count == 0);
        }
    }

    pub fn is_held(&self, id: &Uuid) -> bool {
        self.holds.get(id).map(|count| *count > 0).unwrap_or(false)
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist a new artifact and return its metadata
    async fn put(&self, data: Bytes, origin: ArtifactOrigin) -> Result<Artifact, StorageError>;

    /// Read an artifact's bytes
    async fn get(&self, id: Uuid) -> Result<Bytes, StorageError>;

    /// Copy an artifact's payload to `dest`, returning the bytes written
    async fn copy_to(&self, id: Uuid, dest: &Path) -> Result<u64, StorageError>;

    /// Persist the file at `src` as a new artifact. `src` is left in place.
    async fn put_file(&self, src: &Path, origin: ArtifactOrigin) -> Result<Artifact, StorageError>;

    /// Metadata lookup without touching the payload
    fn metadata(&self, id: Uuid) -> Option<Artifact>;

    /// Evict everything older than `max_age` as of `now`, except held artifacts.
    /// Returns the evicted ids.
    async fn sweep_at(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Vec<Uuid>, StorageError>;

    fn holds(&self) -> &HoldRegistry;

    async fn sweep(&self, max_age: Duration) -> Result<Vec<Uuid>, StorageError> {
        self.sweep_at(Utc::now(), max_age).await
    }
}

/// Keeps an artifact out of sweeps until dropped
pub struct ArtifactHold {
    store: Arc<dyn ArtifactStore>,
    id: Uuid,
}

impl ArtifactHold {
    /// Hold `id` if it is currently known to the store
    pub fn acquire(store: Arc<dyn ArtifactStore>, id: Uuid) -> Option<Self> {
        store.metadata(id)?;
        store.holds().acquire(id);
        Some(Self { store, id })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ArtifactHold {
    fn drop(&mut self) {
        self.store.holds().release(self.id);
    }
}

// ========================================
// Filesystem backend
// ========================================

/// Disk-backed store with one directory per artifact origin
pub struct FsArtifactStore {
    uploads_dir: PathBuf,
    processed_dir: PathBuf,
    index: DashMap<Uuid, Artifact>,
    holds: HoldRegistry,
}

impl FsArtifactStore {
    /// Create the store, bootstrapping both directories
    pub async fn new(
        uploads_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
    ) -> Result<Self, StorageError> {
        let uploads_dir = uploads_dir.into();
        let processed_dir = processed_dir.into();
        tokio::fs::create_dir_all(&uploads_dir).await?;
        tokio::fs::create_dir_all(&processed_dir).await?;

        info!(
            uploads = %uploads_dir.display(),
            processed = %processed_dir.display(),
            "Artifact store initialized"
        );

        Ok(Self {
            uploads_dir,
            processed_dir,
            index: DashMap::new(),
            holds: HoldRegistry::default(),
        })
    }

    fn dir_for(&self, origin: ArtifactOrigin) -> &Path {
        match origin {
            ArtifactOrigin::Uploaded => &self.uploads_dir,
            ArtifactOrigin::Derived => &self.processed_dir,
        }
    }

    fn path_for(&self, id: Uuid, origin: ArtifactOrigin) -> PathBuf {
        self.dir_for(origin).join(format!("{id}.{ARTIFACT_EXTENSION}"))
    }

    fn index_written(
        &self,
        id: Uuid,
        origin: ArtifactOrigin,
        size_bytes: u64,
        path: &Path,
    ) -> Artifact {
        let artifact = Artifact {
            id,
            origin,
            size_bytes,
            created_at: Utc::now(),
            location: path.display().to_string(),
        };
        self.index.insert(id, artifact.clone());

        debug!(artifact_id = %id, origin = origin.as_str(), size = size_bytes, "Artifact stored");
        artifact
    }

    async fn sweep_dir(
        &self,
        dir: &Path,
        cutoff: DateTime<Utc>,
        evicted: &mut Vec<Uuid>,
    ) -> Result<(), StorageError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| Uuid::parse_str(stem).ok());

            if let Some(id) = id {
                if self.holds.is_held(&id) {
                    debug!(artifact_id = %id, "Skipping held artifact during sweep");
                    continue;
                }
            }

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => DateTime::<Utc>::from(modified),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat artifact file");
                    continue;
                }
            };

            if modified >= cutoff {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale artifact");
                    continue;
                }
            }

            if let Some(id) = id {
                self.index.remove(&id);
                evicted.push(id);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, data: Bytes, origin: ArtifactOrigin) -> Result<Artifact, StorageError> {
        let id = Uuid::new_v4();
        let path = self.path_for(id, origin);
        tokio::fs::write(&path, &data).await?;
        Ok(self.index_written(id, origin, data.len() as u64, &path))
    }

    async fn get(&self, id: Uuid) -> Result<Bytes, StorageError> {
        let artifact = self.metadata(id).ok_or(StorageError::NotFound(id))?;
        match tokio::fs::read(&artifact.location).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.index.remove(&id);
                Err(StorageError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn copy_to(&self, id: Uuid, dest: &Path) -> Result<u64, StorageError> {
        let artifact = self.metadata(id).ok_or(StorageError::NotFound(id))?;
        match tokio::fs::copy(&artifact.location, dest).await {
            Ok(copied) => Ok(copied),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // a missing destination directory is not a missing artifact
                if tokio::fs::try_exists(&artifact.location).await? {
                    return Err(e.into());
                }
                self.index.remove(&id);
                Err(StorageError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put_file(&self, src: &Path, origin: ArtifactOrigin) -> Result<Artifact, StorageError> {
        let id = Uuid::new_v4();
        let path = self.path_for(id, origin);
        let size_bytes = tokio::fs::copy(src, &path).await?;
        Ok(self.index_written(id, origin, size_bytes, &path))
    }

    fn metadata(&self, id: Uuid) -> Option<Artifact> {
        self.index.get(&id).map(|entry| entry.clone())
    }

    async fn sweep_at(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Vec<Uuid>, StorageError> {
        let cutoff = now - max_age;
        let mut evicted = Vec::new();
        self.sweep_dir(&self.uploads_dir, cutoff, &mut evicted).await?;
        self.sweep_dir(&self.processed_dir, cutoff, &mut evicted).await?;
        Ok(evicted)
    }

    fn holds(&self) -> &HoldRegistry {
        &self.holds
    }
}

// ========================================
// In-memory backend
// ========================================

/// Process-local store; contents are lost with the process
#[derive(Default)]
pub struct MemoryArtifactStore {
    entries: DashMap<Uuid, (Artifact, Bytes)>,
    holds: HoldRegistry,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, data: Bytes, origin: ArtifactOrigin) -> Result<Artifact, StorageError> {
        let id = Uuid::new_v4();
        let artifact = Artifact {
            id,
            origin,
            size_bytes: data.len() as u64,
            created_at: Utc::now(),
            location: format!("memory://{}/{id}", origin.as_str()),
        };
        self.entries.insert(id, (artifact.clone(), data));
        Ok(artifact)
    }

    async fn get(&self, id: Uuid) -> Result<Bytes, StorageError> {
        self.entries
            .get(&id)
            .map(|entry| entry.value().1.clone())
            .ok_or(StorageError::NotFound(id))
    }

    async fn copy_to(&self, id: Uuid, dest: &Path) -> Result<u64, StorageError> {
        let data = self.get(id).await?;
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }

    async fn put_file(&self, src: &Path, origin: ArtifactOrigin) -> Result<Artifact, StorageError> {
        let data = tokio::fs::read(src).await?;
        self.put(Bytes::from(data), origin).await
    }

    fn metadata(&self, id: Uuid) -> Option<Artifact> {
        self.entries.get(&id).map(|entry| entry.value().0.clone())
    }

    async fn sweep_at(
        &self,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Vec<Uuid>, StorageError> {
        let cutoff = now - max_age;
        let stale: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|entry| entry.value().0.created_at < cutoff && !self.holds.is_held(entry.key()))
            .map(|entry| *entry.key())
            .collect();

        for id in &stale {
            self.entries.remove(id);
        }
        Ok(stale)
    }

    fn holds(&self) -> &HoldRegistry {
        &self.holds
    }
}
