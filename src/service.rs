//! In-process operations of the document QA service.
//!
//! [`DocQa`] ties the index manager, the answer synthesizer and the
//! history sink together. The HTTP server and the CLI are thin wrappers
//! around these methods.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use serde::Serialize;

use docqa_core::chunk::Chunker;
use docqa_core::embedding::{embed_query, Embedder};
use docqa_core::loader::DocumentLoader;
use docqa_core::models::UserIdentity;
use docqa_core::prompt::Generator;
use docqa_core::search::DEFAULT_TOP_K;
use docqa_core::store::IndexStore;
use docqa_core::Result;

use crate::answer::Synthesizer;
use crate::config::Config;
use crate::documents::{sanitize_document_name, stored_document_name, DocumentStorage};
use crate::embedding::create_embedder;
use crate::extract::PdfLoader;
use crate::history::{HistoryEntry, HistorySink, NoopHistory, SqliteHistory};
use crate::lifecycle::{IndexManager, IndexState, DEFAULT_EMBED_BATCH_SIZE};
use crate::llm::create_generator;
use crate::sqlite_store::SqliteIndexStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub document_count: usize,
    pub indexed_passage_count: usize,
    pub embedding_model_name: String,
    pub index_ready: bool,
    pub state: IndexState,
    pub llm_model_name: String,
    pub documents_dir: PathBuf,
    pub index_location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReport {
    pub filename: String,
    pub indexed_chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub document_count: usize,
    pub passage_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AskReport {
    pub answer: String,
}

/// Everything [`DocQa`] is assembled from. [`DocQa::open`] builds these
/// from configuration; tests supply their own.
pub struct Components {
    pub storage: DocumentStorage,
    pub loader: Arc<dyn DocumentLoader>,
    pub chunker: Chunker,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn IndexStore>,
    pub generator: Arc<dyn Generator>,
    pub history: Arc<dyn HistorySink>,
    pub top_k: usize,
    pub llm_timeout: Duration,
    pub embed_batch_size: usize,
    pub rebuild_on_corrupt: bool,
}

impl Components {
    /// Components with default tuning: top 3 passages, a two-minute model
    /// timeout, no history and PDF loading.
    pub fn new(
        storage: DocumentStorage,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            storage,
            loader: Arc::new(PdfLoader),
            chunker: Chunker::default(),
            embedder,
            store,
            generator,
            history: Arc::new(NoopHistory),
            top_k: DEFAULT_TOP_K,
            llm_timeout: Duration::from_secs(120),
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            rebuild_on_corrupt: true,
        }
    }
}

pub struct DocQa {
    manager: IndexManager,
    synthesizer: Synthesizer,
    history: Arc<dyn HistorySink>,
    top_k: usize,
}

impl DocQa {
    /// Build every component from configuration and start the index
    /// lifecycle.
    ///
    /// The embedder is checked once; if it cannot produce a vector the
    /// service does not start.
    pub async fn open(config: &Config) -> AnyResult<Self> {
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;

        let embedder = create_embedder(&config.embedding)
            .await
            .context("Failed to initialize embedding provider")?;
        embed_query(embedder.as_ref(), "ping")
            .await
            .with_context(|| format!("Embedding model '{}' is unavailable", embedder.model_name()))?;

        let generator = create_generator(&config.llm).context("Failed to initialize llm provider")?;

        let history: Arc<dyn HistorySink> = match &config.history.path {
            Some(path) => Arc::new(
                SqliteHistory::open(path)
                    .await
                    .with_context(|| format!("Failed to open history store: {}", path.display()))?,
            ),
            None => Arc::new(NoopHistory),
        };

        let components = Components {
            storage: DocumentStorage::new(&config.storage.documents_dir),
            loader: Arc::new(PdfLoader),
            chunker,
            embedder,
            store: Arc::new(SqliteIndexStore::new(&config.storage.index_path)),
            generator,
            history,
            top_k: config.retrieval.top_k,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            embed_batch_size: config.embedding.batch_size,
            rebuild_on_corrupt: config.index.rebuild_on_corrupt,
        };

        Ok(Self::start(components).await?)
    }

    /// Assemble the service from explicit components and start the index
    /// lifecycle.
    pub async fn start(components: Components) -> Result<Self> {
        let manager = IndexManager::new(
            components.storage,
            components.loader,
            components.chunker,
            components.embedder,
            components.store,
        )
        .with_batch_size(components.embed_batch_size)
        .with_rebuild_on_corrupt(components.rebuild_on_corrupt);
        manager.start().await?;

        Ok(Self {
            manager,
            synthesizer: Synthesizer::new(components.generator, components.llm_timeout),
            history: components.history,
            top_k: components.top_k.max(1),
        })
    }

    pub fn manager(&self) -> &IndexManager {
        &self.manager
    }

    pub fn get_status(&self) -> Result<StatusReport> {
        let handle = self.manager.snapshot();
        Ok(StatusReport {
            document_count: self.manager.storage().count()?,
            indexed_passage_count: handle.passage_count(),
            embedding_model_name: self.manager.embedder().model_name().to_string(),
            index_ready: handle.is_ready(),
            state: self.manager.state(),
            llm_model_name: self.synthesizer.model_name().to_string(),
            documents_dir: self.manager.storage().dir().to_path_buf(),
            index_location: self.manager.index_location(),
        })
    }

    pub fn list_documents(&self) -> Result<Vec<String>> {
        self.manager.list_documents()
    }

    /// Store and index a PDF.
    ///
    /// # Errors
    ///
    /// [`InvalidDocumentType`](docqa_core::Error::InvalidDocumentType) unless `filename` names a `.pdf`;
    /// [`UnreadableDocument`](docqa_core::Error::UnreadableDocument) when the bytes cannot be parsed.
    pub async fn upload_document(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadReport> {
        let filename = sanitize_document_name(filename)?;
        let indexed_chunk_count = self.manager.add_document(&filename, bytes).await?;
        Ok(UploadReport {
            filename,
            indexed_chunk_count,
        })
    }

    pub async fn delete_document(&self, filename: &str) -> Result<()> {
        let filename = stored_document_name(filename)?;
        self.manager.remove_document(&filename).await
    }

    pub async fn reindex(&self) -> Result<ReindexReport> {
        let summary = self.manager.reindex_all().await?;
        Ok(ReindexReport {
            document_count: summary.document_count,
            passage_count: summary.passage_count,
        })
    }

    /// Answer `question` from the indexed documents and record the exchange
    /// for `caller`. A failure to record history is logged, not returned.
    pub async fn ask(&self, question: &str, caller: &UserIdentity) -> Result<AskReport> {
        let passages = self.manager.retrieve(question, self.top_k).await?;
        tracing::debug!(user = %caller, passages = passages.len(), "retrieved context");

        let answer = self.synthesizer.answer(question, &passages).await?;

        if let Err(e) = self.history.record(caller, question, &answer).await {
            tracing::warn!(user = %caller, error = %format!("{:#}", e), "failed to record history");
        }

        Ok(AskReport { answer })
    }

    pub async fn history(&self, caller: &UserIdentity) -> AnyResult<Vec<HistoryEntry>> {
        self.history.entries(caller).await
    }

    /// Wait for in-flight index mutations to finish.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
