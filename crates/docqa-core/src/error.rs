//! Error taxonomy shared by every layer of docqa.
//!
//! Absence of an index is deliberately not represented here: the read path
//! degrades to the insufficient-information sentinel instead of failing.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for docqa operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while indexing, retrieving, or answering.
#[derive(Error, Debug)]
pub enum Error {
    /// The byte stream is not a readable document of the expected format.
    #[error("unreadable document '{name}': {reason}")]
    UnreadableDocument { name: String, reason: String },

    /// `chunk_overlap` must be strictly less than `chunk_size`, and `chunk_size` > 0.
    #[error("invalid chunk config: chunk_size={chunk_size}, chunk_overlap={chunk_overlap}")]
    InvalidChunkConfig {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    /// The embedding model cannot be loaded or reached. Not recoverable locally.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Persisted index data exists but cannot be decoded.
    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    /// A full reindex was requested but the storage area holds no documents.
    #[error("no documents to index")]
    NoDocumentsToIndex,

    /// An upload is not a PDF.
    #[error("invalid document type: {0}")]
    InvalidDocumentType(String),

    /// The language model did not answer within the configured timeout.
    #[error("answer synthesis timed out after {0:?}")]
    SynthesisTimeout(Duration),

    /// The index lifecycle has not been started, or its start failed.
    #[error("index lifecycle not started")]
    NotStarted,

    /// A stored document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A vector does not match the index dimensionality.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The language model call failed for a reason other than a timeout.
    #[error("generation failed: {0}")]
    Generation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn unreadable(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::UnreadableDocument {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a bulk operation (bootstrap, reindex) may skip the offending
    /// document and continue with the rest of the batch.
    pub fn is_per_document(&self) -> bool {
        matches!(self, Error::UnreadableDocument { .. } | Error::Io(_))
    }
}
