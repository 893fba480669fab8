//! In-memory tile store.
//!
//! Holds every tile for the life of the process with no eviction. Used by
//! tests and by callers that only need a warm cache for one session.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::error::StoreError;

use super::{TileKey, TileStore};

#[derive(Default)]
struct Entries {
    tiles: HashMap<TileKey, Bytes>,
    size_bytes: u64,
}

/// [`TileStore`] backed by a `HashMap`.
///
/// The running byte total is kept next to the map under the same lock, so
/// size queries never observe a half-applied write.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use tilestash::geo::to_tile;
/// use tilestash::store::{MemoryTileStore, TileKey, TileStore};
///
/// #[tokio::main]
/// async fn main() {
///     let store = MemoryTileStore::new();
///     let key = TileKey::from(to_tile(51.5, -0.12, 15));
///
///     store.put(&key, Bytes::from_static(b"\x89PNG")).await.unwrap();
///     assert!(store.has(&key).await.unwrap());
///     assert_eq!(store.total_size_bytes().await.unwrap(), 4);
/// }
/// ```
#[derive(Default)]
pub struct MemoryTileStore {
    entries: RwLock<Entries>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tiles.
    pub async fn len(&self) -> usize {
        self.entries.read().await.tiles.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.tiles.is_empty()
    }
}

#[async_trait]
impl TileStore for MemoryTileStore {
    async fn put(&self, key: &TileKey, blob: Bytes) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        let added = blob.len() as u64;

        // Replacing an entry must not double count it
        if let Some(old) = entries.tiles.insert(key.clone(), blob) {
            entries.size_bytes = entries.size_bytes.saturating_sub(old.len() as u64);
        }
        entries.size_bytes += added;
        Ok(())
    }

    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.read().await.tiles.get(key).cloned())
    }

    async fn has(&self, key: &TileKey) -> Result<bool, StoreError> {
        Ok(self.entries.read().await.tiles.contains_key(key))
    }

    async fn keys(&self) -> Result<BTreeSet<TileKey>, StoreError> {
        Ok(self.entries.read().await.tiles.keys().cloned().collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.tiles.clear();
        entries.size_bytes = 0;
        Ok(())
    }

    async fn total_size_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.entries.read().await.size_bytes)
    }
}

// =============================================================================
// Tests
// =============================================================================
