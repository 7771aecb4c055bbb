//! Managed document storage area.
//!
//! A flat directory with one file per uploaded PDF, keyed by file name.
//! Writes go to a hidden temporary file first and are renamed into place,
//! so a listing never shows a half-written document.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use docqa_core::{Error, Result};

use crate::extract::has_pdf_extension;

/// Reduce an uploaded name to its final path component and check that it
/// names a PDF.
///
/// # Errors
///
/// [`Error::InvalidDocumentType`] when nothing usable remains or the
/// name does not end in `.pdf`.
pub fn sanitize_document_name(raw: &str) -> Result<String> {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() || base == "." || base == ".." || base.starts_with('.') {
        return Err(Error::InvalidDocumentType(format!(
            "'{}' is not a valid file name",
            raw
        )));
    }
    if !has_pdf_extension(base) {
        return Err(Error::InvalidDocumentType(format!(
            "'{}' is not a PDF; only .pdf files are accepted",
            base
        )));
    }
    Ok(base.to_string())
}

/// Resolve a name that must refer to a stored document exactly as given.
///
/// # Errors
///
/// [`Error::InvalidDocumentType`] when `raw` contains a path separator;
/// [`Error::NotFound`] when it cannot name a stored PDF at all.
pub fn stored_document_name(raw: &str) -> Result<String> {
    if raw.contains(['/', '\\']) {
        return Err(Error::InvalidDocumentType(format!(
            "'{}' is not a plain file name",
            raw
        )));
    }
    sanitize_document_name(raw).map_err(|_| Error::NotFound(raw.to_string()))
}

#[derive(Debug, Clone)]
pub struct DocumentStorage {
    dir: PathBuf,
}

impl DocumentStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Sorted names of the stored PDFs. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !has_pdf_extension(&name) {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.path_of(name))
            .await
            .map_err(|e| not_found_or_io(name, e))
    }

    /// Store `bytes` under `name`, replacing any previous file of that name.
    pub async fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let target = self.path_of(name);
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(target)
    }

    /// # Errors
    ///
    /// [`Error::NotFound`] if no document of that name is stored.
    pub async fn remove(&self, name: &str) -> Result<()> {
        tokio::fs::remove_file(self.path_of(name))
            .await
            .map_err(|e| not_found_or_io(name, e))
    }
}

fn not_found_or_io(name: &str, e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(name.to_string())
    } else {
        Error::Io(e)
    }
}
