//! Retriever: query text in, ranked passages out.
//!
//! The retriever operates on an [`IndexHandle`] snapshot and an
//! [`Embedder`], with no storage or configuration dependencies. The caller
//! owns locking and decides what to do with an empty result.

use crate::embedding::{embed_query, Embedder};
use crate::error::Result;
use crate::index::IndexHandle;
use crate::models::ScoredPassage;

/// Default number of passages handed to the answer synthesizer.
pub const DEFAULT_TOP_K: usize = 3;

/// Retrieve the `k` passages most similar to `query`.
///
/// An absent index or a blank query yields an empty result without calling
/// the embedder: "no index yet" is an expected state, not a failure.
/// Results are always `k` long when the index holds at least `k`
/// passages; there is no relevance threshold.
pub async fn retrieve(
    embedder: &dyn Embedder,
    handle: &IndexHandle,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredPassage>> {
    let index = match handle.index() {
        Some(index) if !index.is_empty() => index,
        _ => return Ok(Vec::new()),
    };
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let query_vec = embed_query(embedder, query).await?;
    Ok(index.search(&query_vec, k))
}
