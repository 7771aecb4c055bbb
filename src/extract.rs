//! PDF text extraction.
//!
//! [`PdfLoader`] turns PDF bytes into per-page [`PageText`] records with
//! `pdf-extract`. The extractor may panic on malformed input; such panics
//! are reported as [`Error::UnreadableDocument`]. Extraction is CPU-bound,
//! so async callers go through [`load_pages`], which runs any loader on a
//! blocking thread.

use std::sync::Arc;

use docqa_core::loader::DocumentLoader;
use docqa_core::models::PageText;
use docqa_core::{Error, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Whether `name` carries a `.pdf` extension (case-insensitive).
pub fn has_pdf_extension(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Loader for PDF documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn load(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>> {
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(Error::unreadable(name, "missing %PDF- header"));
        }

        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
            .map_err(|_| Error::unreadable(name, "PDF extractor panicked"))?
            .map_err(|e| Error::unreadable(name, format!("PDF extraction failed: {}", e)))?;

        Ok(pages
            .into_iter()
            .enumerate()
            .filter_map(|(i, text)| {
                let text = text.trim();
                (!text.is_empty()).then(|| PageText {
                    source: name.to_string(),
                    page: i as u32 + 1,
                    text: text.to_string(),
                })
            })
            .collect())
    }
}

/// Run `loader` on a blocking thread.
pub async fn load_pages(
    loader: Arc<dyn DocumentLoader>,
    name: &str,
    bytes: Arc<[u8]>,
) -> Result<Vec<PageText>> {
    let owned_name = name.to_string();
    tokio::task::spawn_blocking(move || loader.load(&owned_name, &bytes))
        .await
        .map_err(|e| Error::unreadable(name, format!("extractor aborted: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_extension_is_case_insensitive() {
        assert!(has_pdf_extension("manual.pdf"));
        assert!(has_pdf_extension("MANUAL.PDF"));
        assert!(!has_pdf_extension("notes.txt"));
        assert!(!has_pdf_extension("pdf"));
    }

    #[test]
    fn non_pdf_bytes_are_unreadable() {
        let err = PdfLoader.load("fake.pdf", b"hello world").unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument { ref name, .. } if name == "fake.pdf"));
    }

    #[test]
    fn truncated_pdf_is_unreadable() {
        let err = PdfLoader.load("broken.pdf", b"%PDF-1.4\n%%EOF").unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument { .. }));
    }

    struct PanickingLoader;

    impl DocumentLoader for PanickingLoader {
        fn load(&self, _name: &str, _bytes: &[u8]) -> Result<Vec<PageText>> {
            panic!("extractor bug");
        }
    }

    #[tokio::test]
    async fn panic_in_loader_becomes_unreadable() {
        let err = load_pages(Arc::new(PanickingLoader), "boom.pdf", Arc::from(&b"%PDF-"[..]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument { .. }));
    }
}
