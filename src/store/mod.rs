//! Persistent tile storage.
//!
//! Tiles are stored as opaque blobs under a [`TileKey`] derived from their
//! coordinate. The [`TileStore`] trait is the capability the rest of the crate
//! depends on:
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │  FetchScheduler  │     │   CacheManager   │
//! │     (put)        │     │ (get/has/clear)  │
//! └────────┬─────────┘     └────────┬─────────┘
//!          └───────────┬────────────┘
//!                      ▼
//!          ┌────────────────────────┐
//!          │    dyn TileStore       │
//!          ├───────────┬────────────┤
//!          │  Memory   │   Disk     │
//!          └───────────┴────────────┘
//! ```
//!
//! Writes are key-scoped and last-write-wins, so concurrent puts of distinct
//! keys need no coordination.

mod disk;
mod key;
mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

pub use disk::{DiskTileStore, TILE_FILE_EXTENSION};
pub use key::{TileKey, TILE_KEY_PREFIX};
pub use memory::MemoryTileStore;

/// Key-value store for tile blobs.
///
/// Every operation is idempotent. A failed operation returns a
/// [`StoreError`]; implementations never report success for a write that
/// did not land.
#[async_trait]
pub trait TileStore: Send + Sync {
    /// Store `blob` under `key`, replacing any previous value.
    async fn put(&self, key: &TileKey, blob: Bytes) -> Result<(), StoreError>;

    /// Fetch the blob stored under `key`.
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError>;

    /// Whether `key` is present.
    async fn has(&self, key: &TileKey) -> Result<bool, StoreError>;

    /// All stored keys.
    async fn keys(&self) -> Result<BTreeSet<TileKey>, StoreError>;

    /// Remove every entry.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Sum of the byte lengths of every stored blob.
    async fn total_size_bytes(&self) -> Result<u64, StoreError>;
}

const SIZE_UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

/// Render a byte count for people, e.g. `1.5 MB`.
///
/// Uses base-1024 units with at most two decimals.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    let text = format!("{:.2}", rounded);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, SIZE_UNITS[unit])
}
