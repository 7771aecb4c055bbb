//! Index lifecycle manager.
//!
//! Owns the single in-memory index of the process and every path that
//! mutates it. All mutations (bootstrap, upload, reindex, removal) run
//! under one async writer lock for their whole extract → chunk → embed →
//! insert → save sequence. A new index is published only after the store
//! has committed it, so readers always see either the previous or the new
//! index, and a failed save leaves both the persisted and the in-memory
//! index as they were.
//!
//! ```text
//! Uninitialized ──start──▶ Loading ──found──────────────▶ Ready
//!                             │                             ▲
//!                             ├──absent, PDFs present──▶ Rebuilding
//!                             └──absent, no PDFs──────▶ Absent
//! ```
//!
//! Uploads and reindexes pass through `Rebuilding` and return to the prior
//! state on failure. A rebuild that indexes no passage never replaces the
//! current index.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use docqa_core::chunk::Chunker;
use docqa_core::embedding::{embed_batched, Embedder};
use docqa_core::index::{IndexEntry, IndexHandle, VectorIndex};
use docqa_core::loader::DocumentLoader;
use docqa_core::models::{Passage, ScoredPassage};
use docqa_core::search;
use docqa_core::store::IndexStore;
use docqa_core::{Error, Result};

use crate::documents::DocumentStorage;
use crate::extract::load_pages;

/// Default number of passages per embedding request.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Uninitialized,
    Loading,
    Ready,
    Rebuilding,
    Absent,
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IndexState::Uninitialized => "uninitialized",
            IndexState::Loading => "loading",
            IndexState::Ready => "ready",
            IndexState::Rebuilding => "rebuilding",
            IndexState::Absent => "absent",
        };
        f.write_str(s)
    }
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    /// Documents that contributed to the rebuilt index.
    pub document_count: usize,
    pub passage_count: usize,
}

pub struct IndexManager {
    storage: DocumentStorage,
    loader: Arc<dyn DocumentLoader>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    batch_size: usize,
    rebuild_on_corrupt: bool,
    handle: RwLock<IndexHandle>,
    state: RwLock<IndexState>,
    writer: tokio::sync::Mutex<()>,
}

impl IndexManager {
    pub fn new(
        storage: DocumentStorage,
        loader: Arc<dyn DocumentLoader>,
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
    ) -> Self {
        Self {
            storage,
            loader,
            chunker,
            embedder,
            store,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            rebuild_on_corrupt: true,
            handle: RwLock::new(IndexHandle::Absent),
            state: RwLock::new(IndexState::Uninitialized),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Whether [`start`](Self::start) rebuilds from stored documents when the
    /// persisted index is corrupt.
    pub fn with_rebuild_on_corrupt(mut self, rebuild: bool) -> Self {
        self.rebuild_on_corrupt = rebuild;
        self
    }

    pub fn storage(&self) -> &DocumentStorage {
        &self.storage
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn index_location(&self) -> String {
        self.store.location()
    }

    pub fn state(&self) -> IndexState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: IndexState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Current published index. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> IndexHandle {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, index: VectorIndex) {
        *self.handle.write().unwrap_or_else(PoisonError::into_inner) =
            IndexHandle::Ready(Arc::new(index));
        self.set_state(IndexState::Ready);
    }

    /// Load the persisted index, bootstrapping from stored documents when
    /// none exists.
    ///
    /// # Errors
    ///
    /// [`Error::IndexCorrupt`] when the persisted index cannot be decoded
    /// and no rebuild is possible or allowed; any error from a bootstrap
    /// rebuild.
    pub async fn start(&self) -> Result<IndexState> {
        let _guard = self.writer.lock().await;
        let previous = self.state();
        self.set_state(IndexState::Loading);

        let result = self.start_locked().await;
        match &result {
            Ok(state) => tracing::info!(state = %state, "index lifecycle started"),
            Err(_) => self.set_state(previous),
        }
        result
    }

    async fn start_locked(&self) -> Result<IndexState> {
        match self.store.load().await {
            Ok(Some(index)) if self.is_compatible(&index) => {
                tracing::info!(
                    passages = index.len(),
                    location = %self.store.location(),
                    "loaded persisted index"
                );
                self.publish(index);
                Ok(IndexState::Ready)
            }
            Ok(Some(index)) => {
                tracing::warn!(
                    persisted_model = %index.model(),
                    persisted_dims = index.dims(),
                    model = %self.embedder.model_name(),
                    dims = self.embedder.dims(),
                    "persisted index was built with a different embedder; rebuilding"
                );
                self.bootstrap().await
            }
            Ok(None) => self.bootstrap().await,
            Err(Error::IndexCorrupt(reason)) => {
                let documents = self.storage.list()?;
                if !self.rebuild_on_corrupt || documents.is_empty() {
                    return Err(Error::IndexCorrupt(reason));
                }
                tracing::warn!(%reason, "persisted index is corrupt; rebuilding from documents");
                self.bootstrap().await
            }
            Err(e) => Err(e),
        }
    }

    fn is_compatible(&self, index: &VectorIndex) -> bool {
        index.model() == self.embedder.model_name() && index.dims() == self.embedder.dims()
    }

    async fn bootstrap(&self) -> Result<IndexState> {
        let documents = self.storage.list()?;
        if documents.is_empty() {
            tracing::info!(dir = %self.storage.dir().display(), "no documents stored; index absent");
            self.set_state(IndexState::Absent);
            return Ok(IndexState::Absent);
        }

        self.set_state(IndexState::Rebuilding);
        let (index, summary) = self.build_from(&documents).await?;
        if index.is_empty() {
            tracing::warn!(
                documents = documents.len(),
                "no stored document could be indexed; index absent"
            );
            self.set_state(IndexState::Absent);
            return Ok(IndexState::Absent);
        }
        self.store.save(&index).await?;
        tracing::info!(
            documents = summary.document_count,
            passages = summary.passage_count,
            "bootstrapped index from stored documents"
        );
        self.publish(index);
        Ok(IndexState::Ready)
    }

    /// Extract, chunk and embed one document. A document without any
    /// extractable text is unreadable.
    async fn entries_for(&self, name: &str, bytes: Arc<[u8]>) -> Result<Vec<IndexEntry>> {
        let pages = load_pages(Arc::clone(&self.loader), name, bytes).await?;
        let passages: Vec<Passage> = self.chunker.split(&pages).collect();
        if passages.is_empty() {
            return Err(Error::unreadable(name, "no extractable text"));
        }

        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let vectors = embed_batched(self.embedder.as_ref(), &texts, self.batch_size).await?;

        Ok(passages
            .into_iter()
            .zip(vectors)
            .map(|(passage, vector)| IndexEntry { passage, vector })
            .collect())
    }

    /// Build a fresh index from the named stored documents. Unreadable
    /// documents are logged and skipped; embedding failures abort.
    async fn build_from(&self, names: &[String]) -> Result<(VectorIndex, RebuildSummary)> {
        let mut index = VectorIndex::new(self.embedder.model_name(), self.embedder.dims());
        let mut document_count = 0;

        for name in names {
            let entries = match self.storage.read(name).await {
                Ok(bytes) => self.entries_for(name, Arc::from(bytes)).await,
                Err(e) => Err(e),
            };
            match entries {
                Ok(entries) => {
                    tracing::debug!(document = %name, passages = entries.len(), "indexed document");
                    index.insert(entries)?;
                    document_count += 1;
                }
                Err(e) if e.is_per_document() => {
                    tracing::warn!(document = %name, error = %e, "skipping document");
                }
                Err(e) => return Err(e),
            }
        }

        let summary = RebuildSummary {
            document_count,
            passage_count: index.len(),
        };
        Ok((index, summary))
    }

    /// State to return to if a mutation fails. Mutations are only accepted
    /// once [`start`](Self::start) has succeeded.
    fn ensure_started(&self) -> Result<IndexState> {
        match self.state() {
            state @ (IndexState::Ready | IndexState::Absent) => Ok(state),
            _ => Err(Error::NotStarted),
        }
    }

    /// Index one document and store its bytes under `name`.
    ///
    /// Returns the number of passages added. Extraction or embedding
    /// failures leave storage and index untouched. If the save fails the
    /// document file may already be stored; the published index is
    /// unchanged and the next reindex picks the file up.
    ///
    /// # Errors
    ///
    /// [`Error::NotStarted`] before a successful [`start`](Self::start);
    /// [`Error::UnreadableDocument`] when the document yields no passages.
    pub async fn add_document(&self, name: &str, bytes: Vec<u8>) -> Result<usize> {
        let _guard = self.writer.lock().await;
        let previous = self.ensure_started()?;
        self.set_state(IndexState::Rebuilding);

        let result = self.add_locked(name, bytes).await;
        if result.is_err() {
            self.set_state(previous);
        }
        result
    }

    async fn add_locked(&self, name: &str, bytes: Vec<u8>) -> Result<usize> {
        let bytes: Arc<[u8]> = Arc::from(bytes);
        let entries = self.entries_for(name, Arc::clone(&bytes)).await?;
        let added = entries.len();

        self.storage.write(name, &bytes).await?;

        let mut index = match self.snapshot().index() {
            Some(current) => VectorIndex::clone(current),
            None => VectorIndex::new(self.embedder.model_name(), self.embedder.dims()),
        };
        index.insert(entries)?;
        self.store.save(&index).await?;

        tracing::info!(document = name, passages = added, total = index.len(), "document indexed");
        self.publish(index);
        Ok(added)
    }

    /// Discard the current index and rebuild it from every stored document.
    ///
    /// # Errors
    ///
    /// [`Error::NoDocumentsToIndex`] when storage is empty or no stored
    /// document could be indexed; the published and persisted index are
    /// left untouched. [`Error::NotStarted`] before a successful
    /// [`start`](Self::start).
    pub async fn reindex_all(&self) -> Result<RebuildSummary> {
        let _guard = self.writer.lock().await;
        let previous = self.ensure_started()?;

        let documents = self.storage.list()?;
        if documents.is_empty() {
            return Err(Error::NoDocumentsToIndex);
        }

        self.set_state(IndexState::Rebuilding);

        let result = async {
            let (index, summary) = self.build_from(&documents).await?;
            if index.is_empty() {
                tracing::warn!(
                    documents = documents.len(),
                    "no stored document could be indexed; keeping current index"
                );
                return Err(Error::NoDocumentsToIndex);
            }
            self.store.save(&index).await?;
            Ok::<_, Error>((index, summary))
        }
        .await;

        match result {
            Ok((index, summary)) => {
                tracing::info!(
                    documents = summary.document_count,
                    passages = summary.passage_count,
                    "reindex complete"
                );
                self.publish(index);
                Ok(summary)
            }
            Err(e) => {
                self.set_state(previous);
                Err(e)
            }
        }
    }

    /// Delete a stored document. Its passages stay in the index until the
    /// next reindex.
    pub async fn remove_document(&self, name: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.storage.remove(name).await?;
        tracing::info!(document = name, "document removed from storage");
        Ok(())
    }

    pub fn list_documents(&self) -> Result<Vec<String>> {
        self.storage.list()
    }

    /// Top-`k` passages for `query` from the published index.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>> {
        let handle = self.snapshot();
        search::retrieve(self.embedder.as_ref(), &handle, query, k).await
    }

    /// Wait for any in-flight mutation to finish.
    pub async fn shutdown(&self) {
        let _guard = self.writer.lock().await;
        tracing::info!(passages = self.snapshot().passage_count(), "index manager stopped");
    }
}
