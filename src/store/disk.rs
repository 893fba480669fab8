//! Directory-backed tile store.
//!
//! Each tile is one file named after its key:
//!
//! ```text
//! <root>/
//! ├── tile_13_4093_2723.tile
//! ├── tile_14_8186_5447.tile
//! └── ...
//! ```
//!
//! Writes go to a hidden temporary file first and are renamed into place, so
//! readers never see a partially written tile. Files that do not parse as a
//! tile key are ignored by every operation.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::StoreError;

use super::{TileKey, TileStore};

/// File extension used for stored tiles.
pub const TILE_FILE_EXTENSION: &str = "tile";

/// [`TileStore`] that keeps one file per tile under a root directory.
pub struct DiskTileStore {
    root: PathBuf,
    /// Distinguishes temporary files of concurrent writes to the same key
    write_seq: AtomicU64,
}

impl DiskTileStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            StoreError::Unavailable(format!("cannot create {}: {}", root.display(), e))
        })?;
        debug!(root = %root.display(), "Opened disk tile store");
        Ok(Self {
            root,
            write_seq: AtomicU64::new(0),
        })
    }

    /// Directory holding the tile files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.as_str(), TILE_FILE_EXTENSION))
    }

    fn temp_path(&self, key: &TileKey) -> PathBuf {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(".{}.{}.tmp", key.as_str(), seq))
    }

    /// Classify an I/O failure on `key`.
    ///
    /// A missing or replaced root directory makes the whole store
    /// unavailable; anything else is local to the entry.
    async fn classify(&self, key: &str, err: io::Error) -> StoreError {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => StoreError::Io {
                key: key.to_string(),
                message: err.to_string(),
            },
            Ok(_) => StoreError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )),
            Err(root_err) => StoreError::Unavailable(format!(
                "{}: {}",
                self.root.display(),
                root_err
            )),
        }
    }

    /// Every tile file currently in the root, with its key.
    async fn tile_files(&self) -> Result<Vec<(TileKey, PathBuf)>, StoreError> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter_map(|path| key_from_path(&path).map(|key| (key, path)))
            .collect())
    }

    async fn entries(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut dir = fs::read_dir(&self.root).await.map_err(|e| {
            StoreError::Unavailable(format!("{}: {}", self.root.display(), e))
        })?;

        let mut paths = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => paths.push(entry.path()),
                Ok(None) => break,
                Err(e) => return Err(self.classify("<listing>", e).await),
            }
        }
        Ok(paths)
    }
}

/// Parse `<key>.tile` file names back into keys.
fn key_from_path(path: &Path) -> Option<TileKey> {
    if path.extension()?.to_str()? != TILE_FILE_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Leftovers of writes interrupted before their rename.
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') && name.ends_with(".tmp"))
}

#[async_trait]
impl TileStore for DiskTileStore {
    async fn put(&self, key: &TileKey, blob: Bytes) -> Result<(), StoreError> {
        let temp = self.temp_path(key);
        if let Err(e) = fs::write(&temp, &blob).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.classify(key.as_str(), e).await);
        }
        if let Err(e) = fs::rename(&temp, self.tile_path(key)).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.classify(key.as_str(), e).await);
        }
        Ok(())
    }

    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        match fs::read(self.tile_path(key)).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                // A missing file only means a miss if the root is still there
                match self.classify(key.as_str(), e).await {
                    StoreError::Io { .. } => Ok(None),
                    unavailable => Err(unavailable),
                }
            }
            Err(e) => Err(self.classify(key.as_str(), e).await),
        }
    }

    async fn has(&self, key: &TileKey) -> Result<bool, StoreError> {
        match fs::metadata(self.tile_path(key)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) => match self.classify(key.as_str(), e).await {
                StoreError::Io { .. } => Ok(false),
                unavailable => Err(unavailable),
            },
        }
    }

    async fn keys(&self) -> Result<BTreeSet<TileKey>, StoreError> {
        Ok(self
            .tile_files()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut removed = 0usize;
        let mut swept = 0usize;
        for path in self.entries().await? {
            let is_tile = key_from_path(&path).is_some();
            if !is_tile && !is_temp_file(&path) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) if is_tile => removed += 1,
                Ok(()) => swept += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(self.classify(&path.display().to_string(), e).await),
            }
        }
        debug!(removed, swept, root = %self.root.display(), "Cleared disk tile store");
        Ok(())
    }

    async fn total_size_bytes(&self) -> Result<u64, StoreError> {
        let mut total = 0u64;
        for (key, path) in self.tile_files().await? {
            match fs::metadata(&path).await {
                Ok(meta) => total += meta.len(),
                // Removed between listing and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to stat tile file");
                    return Err(self.classify(key.as_str(), e).await);
                }
            }
        }
        Ok(total)
    }
}

// =============================================================================
// Tests
// =============================================================================
