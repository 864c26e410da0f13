//! Local capture cache.
//!
//! Encoded captures are kept under their capture id until they are fetched
//! for replay. The file backend writes one `<captureId>.json` per capture;
//! the memory backend is a plain key/value map.

use rewind_core::{CaptureId, CoreError};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No capture stored under the id
    #[error("capture {id} not found")]
    NotFound {
        /// Capture id
        id: CaptureId,
    },
    /// Filesystem failure
    #[error("capture cache I/O failed at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id } => CoreError::NotFound {
                kind: "capture".to_string(),
                id: id.to_string(),
            },
            StoreError::Io { .. } => CoreError::Transport {
                reason: err.to_string(),
            },
        }
    }
}

/// Keyed storage for encoded captures
pub trait CaptureStore: Send + Sync {
    /// Store `data` under `id`, replacing any previous entry
    ///
    /// # Errors
    ///
    /// Returns error if the entry cannot be written
    fn put(&self, id: &CaptureId, data: &[u8]) -> Result<(), StoreError>;

    /// Load the entry for `id`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no entry
    fn get(&self, id: &CaptureId) -> Result<Vec<u8>, StoreError>;

    /// Remove the entry for `id`; returns whether one existed
    ///
    /// # Errors
    ///
    /// Returns error if the entry exists but cannot be removed
    fn delete(&self, id: &CaptureId) -> Result<bool, StoreError>;

    /// Ids of every stored capture, sorted
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be listed
    fn list(&self) -> Result<Vec<CaptureId>, StoreError>;
}

/// One JSON file per capture in a directory
#[derive(Debug, Clone)]
pub struct FsCaptureStore {
    dir: PathBuf,
}

impl FsCaptureStore {
    /// Open a cache directory, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        tracing::debug!(dir = %dir.display(), "opened capture cache");
        Ok(Self { dir })
    }

    /// Cache directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &CaptureId) -> PathBuf {
        self.dir.join(id.file_name())
    }
}

impl CaptureStore for FsCaptureStore {
    fn put(&self, id: &CaptureId, data: &[u8]) -> Result<(), StoreError> {
        let path = self.path(id);
        // Write then rename so a reader never sees a partial capture
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(data)
            .and_then(|()| file.sync_all())
            .map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))?;
        tracing::debug!(%id, bytes = data.len(), "cached capture");
        Ok(())
    }

    fn get(&self, id: &CaptureId) -> Result<Vec<u8>, StoreError> {
        let path = self.path(id);
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound { id: *id },
            _ => StoreError::io(&path, e),
        })
    }

    fn delete(&self, id: &CaptureId) -> Result<bool, StoreError> {
        let path = self.path(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn list(&self) -> Result<Vec<CaptureId>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<CaptureId>().ok());
            match parsed {
                Some(id) => ids.push(id),
                None => tracing::warn!(path = %path.display(), "skipping unrecognized file in capture cache"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory key/value cache
#[derive(Debug, Default)]
pub struct MemoryCaptureStore {
    entries: RwLock<BTreeMap<CaptureId, Vec<u8>>>,
}

impl MemoryCaptureStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored captures
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CaptureStore for MemoryCaptureStore {
    fn put(&self, id: &CaptureId, data: &[u8]) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*id, data.to_vec());
        Ok(())
    }

    fn get(&self, id: &CaptureId) -> Result<Vec<u8>, StoreError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound { id: *id })
    }

    fn delete(&self, id: &CaptureId) -> Result<bool, StoreError> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some())
    }

    fn list(&self) -> Result<Vec<CaptureId>, StoreError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect())
    }
}
