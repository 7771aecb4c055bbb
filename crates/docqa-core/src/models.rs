//! Core data models that flow through the indexing and retrieval pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Text of a single document page, as produced by a [`DocumentLoader`](crate::loader::DocumentLoader).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// Filename of the source document.
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// Page text with surrounding whitespace trimmed.
    pub text: String,
}

/// An immutable span of page text prepared for embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    /// SHA-256 over source, page, chunk index and text.
    pub id: String,
    pub text: String,
    /// Filename of the source document.
    pub source: String,
    /// 1-based page number within the source document.
    pub page: u32,
    /// Sequence number within the source document, contiguous across pages.
    pub chunk_index: u32,
    /// Character offset of the first character within the page text.
    pub start_char: usize,
    /// Character offset one past the last character within the page text.
    pub end_char: usize,
}

/// A retrieved passage with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPassage {
    pub passage: Passage,
    pub score: f32,
}

/// Opaque, already-verified caller identity supplied by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
