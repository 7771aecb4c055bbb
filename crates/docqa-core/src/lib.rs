//! # docqa Core
//!
//! Shared, WASM-safe logic for docqa: data models, the overlapping
//! chunker, the embedder and generator traits, the flat vector index and
//! its persistence trait, retrieval, and the grounding prompt contract.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod loader;
pub mod models;
pub mod prompt;
pub mod search;
pub mod store;

pub use error::{Error, Result};
