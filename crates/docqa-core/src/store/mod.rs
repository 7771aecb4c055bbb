//! Index persistence abstraction.
//!
//! The [`IndexStore`] trait persists and restores a whole [`VectorIndex`],
//! enabling pluggable backends (SQLite in the app crate, in-memory here).
//! A store is bound to its location when it is constructed.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::index::VectorIndex;

/// Durable storage for a [`VectorIndex`].
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load`](IndexStore::load) | Restore the last committed index, if any |
/// | [`save`](IndexStore::save) | Atomically replace the persisted index |
/// | [`location`](IndexStore::location) | Human-readable location for status output |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Restore the last committed index.
    ///
    /// Returns `Ok(None)` when nothing was ever committed, which is distinct
    /// from [`Error::IndexCorrupt`](crate::error::Error::IndexCorrupt) for
    /// data that exists but cannot be decoded.
    async fn load(&self) -> Result<Option<VectorIndex>>;

    /// Persist the full index. Either the whole index is committed or the
    /// previous one remains.
    async fn save(&self, index: &VectorIndex) -> Result<()>;

    fn location(&self) -> String;
}
