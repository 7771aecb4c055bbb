//! In-memory [`IndexStore`] implementation for testing and WASM targets.
//!
//! Saves a clone of the index behind `std::sync::RwLock`; nothing survives
//! the process.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::Result;
use crate::index::VectorIndex;

use super::IndexStore;

/// In-memory store for testing and WASM environments.
pub struct InMemoryIndexStore {
    saved: RwLock<Option<VectorIndex>>,
}

impl InMemoryIndexStore {
    pub fn new() -> Self {
        Self {
            saved: RwLock::new(None),
        }
    }

    /// A store that already holds a committed index.
    pub fn with_index(index: VectorIndex) -> Self {
        Self {
            saved: RwLock::new(Some(index)),
        }
    }

    /// Number of passages in the committed index, if any.
    pub fn saved_len(&self) -> Option<usize> {
        self.saved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(VectorIndex::len)
    }
}

impl Default for InMemoryIndexStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexStore for InMemoryIndexStore {
    async fn load(&self) -> Result<Option<VectorIndex>> {
        Ok(self
            .saved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save(&self, index: &VectorIndex) -> Result<()> {
        *self.saved.write().unwrap_or_else(PoisonError::into_inner) = Some(index.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::IndexEntry;
    use crate::models::Passage;

    fn sample_index() -> VectorIndex {
        let embedder = HashEmbedder::new(64);
        let texts = [
            "solar panels on the roof",
            "rainwater collection barrels",
            "composting kitchen scraps",
            "solar battery storage",
        ];
        let entries = texts.iter().enumerate().map(|(i, t)| IndexEntry {
            passage: Passage {
                id: format!("p{}", i),
                text: t.to_string(),
                source: "guide.pdf".to_string(),
                page: 1,
                chunk_index: i as u32,
                start_char: 0,
                end_char: t.len(),
            },
            vector: embedder.embed_one(t),
        });
        VectorIndex::from_entries("hash", 64, entries.collect()).unwrap()
    }

    #[tokio::test]
    async fn test_load_before_save_is_absent() {
        let store = InMemoryIndexStore::new();
        assert!(store.load().await.unwrap().is_none());
        assert_eq!(store.saved_len(), None);
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_search() {
        let index = sample_index();
        let query = HashEmbedder::new(64).embed_one("solar power");
        let before = index.search(&query, 3);

        let store = InMemoryIndexStore::new();
        store.save(&index).await.unwrap();
        let restored = store.load().await.unwrap().unwrap();

        assert_eq!(restored.search(&query, 3), before);
        assert_eq!(store.saved_len(), Some(4));
    }
}
