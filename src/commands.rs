//! CLI command implementations.
//!
//! Each command opens the service from configuration, performs one
//! operation and prints a human-readable result to stdout.

use anyhow::{Context, Result};
use std::path::Path;

use docqa_core::models::UserIdentity;

use crate::config::Config;
use crate::service::DocQa;

pub async fn run_status(config: &Config) -> Result<()> {
    let service = DocQa::open(config).await?;
    let status = service.get_status()?;

    println!("state:            {}", status.state);
    println!("index ready:      {}", status.index_ready);
    println!("documents:        {}", status.document_count);
    println!("indexed passages: {}", status.indexed_passage_count);
    println!("embedding model:  {}", status.embedding_model_name);
    println!("llm model:        {}", status.llm_model_name);
    println!("documents dir:    {}", status.documents_dir.display());
    println!("index location:   {}", status.index_location);
    Ok(())
}

pub async fn run_files(config: &Config) -> Result<()> {
    let service = DocQa::open(config).await?;
    let files = service.list_documents()?;
    if files.is_empty() {
        println!("No documents stored.");
    }
    for f in files {
        println!("{}", f);
    }
    Ok(())
}

pub async fn run_upload(config: &Config, path: &Path) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Not a file path: {}", path.display()))?;
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let service = DocQa::open(config).await?;
    let report = service.upload_document(filename, bytes).await?;
    service.shutdown().await;

    println!(
        "Uploaded {} ({} passages indexed)",
        report.filename, report.indexed_chunk_count
    );
    Ok(())
}

pub async fn run_delete(config: &Config, name: &str) -> Result<()> {
    let service = DocQa::open(config).await?;
    service.delete_document(name).await?;
    println!("Deleted {}", name);
    Ok(())
}

pub async fn run_reindex(config: &Config) -> Result<()> {
    let service = DocQa::open(config).await?;
    let report = service.reindex().await?;
    service.shutdown().await;
    println!(
        "Reindexed {} documents ({} passages)",
        report.document_count, report.passage_count
    );
    Ok(())
}

pub async fn run_ask(config: &Config, question: &str, user: &str) -> Result<()> {
    let service = DocQa::open(config).await?;
    let report = service.ask(question, &UserIdentity::new(user)).await?;
    println!("{}", report.answer);
    Ok(())
}

pub async fn run_history(config: &Config, user: &str) -> Result<()> {
    let service = DocQa::open(config).await?;
    let entries = service.history(&UserIdentity::new(user)).await?;
    if entries.is_empty() {
        println!("No history for {}.", user);
    }
    for e in entries {
        println!("[{}] Q: {}", e.created_at.format("%Y-%m-%d %H:%M:%S"), e.question);
        println!("    A: {}", e.answer);
    }
    Ok(())
}
