//! # docqa
//!
//! A local-first question answering service over PDF documents.
//!
//! Uploaded PDFs are split into overlapping passages, embedded, and kept in
//! a persisted vector index. Questions are answered by retrieving the most
//! similar passages and asking a language model to answer from them alone.
//!
//! ## Architecture
//!
//! ```text
//!  upload ─▶ PdfLoader ─▶ Chunker ─▶ Embedder ─▶ VectorIndex ─▶ SQLite
//!                                                     │
//!  ask ───▶ Embedder ─▶ retrieve (top-k) ◀────────────┘
//!                          │
//!                          ▼
//!                     Synthesizer ─▶ Generator (Ollama / OpenAI)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language model providers |
//! | [`documents`] | Document storage directory |
//! | [`sqlite_store`] | Persisted vector index |
//! | [`lifecycle`] | Index lifecycle manager |
//! | [`answer`] | Answer synthesis |
//! | [`history`] | Question/answer history |
//! | [`service`] | Service operations |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI commands |

pub mod answer;
pub mod commands;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod history;
pub mod lifecycle;
pub mod llm;
pub mod logging;
pub mod server;
pub mod service;
pub mod sqlite_store;

pub use docqa_core;
