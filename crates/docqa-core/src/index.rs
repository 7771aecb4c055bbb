//! Flat vector index over passage embeddings.
//!
//! Exhaustive cosine search: every query is scored against every entry.
//! At document-collection scale this is fast enough and, unlike approximate
//! structures, gives the same ranking for the same inserted vectors every
//! time.

use std::sync::Arc;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{Passage, ScoredPassage};

/// A passage together with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub passage: Passage,
    pub vector: Vec<f32>,
}

/// In-memory vector index.
///
/// Entries are kept in insertion order, which is also the tie-break order
/// for equal similarity scores.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Create an empty index for vectors produced by `model`.
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
            entries: Vec::new(),
        }
    }

    /// Rebuild an index from persisted parts, validating every vector.
    pub fn from_entries(
        model: impl Into<String>,
        dims: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        let mut index = Self::new(model, dims);
        index.insert(entries)?;
        Ok(index)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append entries. Existing entries are never removed or deduplicated.
    ///
    /// # Errors
    ///
    /// [`Error::DimensionMismatch`] if any vector length differs from
    /// [`dims`](Self::dims); in that case nothing is inserted.
    pub fn insert(&mut self, entries: impl IntoIterator<Item = IndexEntry>) -> Result<()> {
        let entries: Vec<IndexEntry> = entries.into_iter().collect();
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dims) {
            return Err(Error::DimensionMismatch {
                expected: self.dims,
                actual: bad.vector.len(),
            });
        }
        self.entries.extend(entries);
        Ok(())
    }

    /// Return up to `k` passages ranked by descending cosine similarity.
    ///
    /// Ties keep insertion order. An empty index or `k == 0` yields an
    /// empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<ScoredPassage> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query, &e.vector)))
            .collect();

        // Stable sort: equal scores stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredPassage {
                passage: self.entries[i].passage.clone(),
                score,
            })
            .collect()
    }
}

/// Tagged index presence.
///
/// `Absent` means no index was ever built; it is an expected state, not an
/// error.
#[derive(Debug, Clone, Default)]
pub enum IndexHandle {
    #[default]
    Absent,
    Ready(Arc<VectorIndex>),
}

impl IndexHandle {
    pub fn index(&self) -> Option<&Arc<VectorIndex>> {
        match self {
            IndexHandle::Absent => None,
            IndexHandle::Ready(index) => Some(index),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, IndexHandle::Ready(_))
    }

    /// Number of indexed passages, `0` when absent.
    pub fn passage_count(&self) -> usize {
        self.index().map_or(0, |i| i.len())
    }
}
