//! Fixed-size, overlapping text chunker.
//!
//! Splits page text into [`Passage`]s of at most `chunk_size` characters,
//! where consecutive passages from the same page share exactly
//! `chunk_overlap` characters. Windows never cross a page boundary.
//!
//! # Algorithm
//!
//! 1. `stride = chunk_size - chunk_overlap`.
//! 2. For each page, emit the character window `[start, start + chunk_size)`
//!    clamped to the page length, for `start = 0, stride, 2 × stride, …`.
//! 3. Stop after the first window that reaches the end of the page; the
//!    last window of a page is the only one that may be shorter.
//! 4. Number passages contiguously across all pages of a document.
//!
//! Offsets are measured in Unicode scalar values, so multi-byte text never
//! splits inside a character.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::Chunker;
//! use docqa_core::models::PageText;
//!
//! let pages = vec![PageText { source: "a.pdf".into(), page: 1, text: "0123456789abcdefghij".into() }];
//! let chunker = Chunker::new(10, 5).unwrap();
//! let texts: Vec<String> = chunker.split(&pages).map(|p| p.text).collect();
//! assert_eq!(texts, ["0123456789", "56789abcde", "abcdefghij"]);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{PageText, Passage};

/// Default maximum passage length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// Default overlap between consecutive passages, in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Validated chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Create a chunker.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidChunkConfig`] unless `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(Error::InvalidChunkConfig {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Lazily split `pages` into passages.
    ///
    /// `pages` should belong to a single document, since chunk indices are
    /// numbered contiguously across the whole slice.
    pub fn split<'a>(&self, pages: &'a [PageText]) -> Passages<'a> {
        Passages {
            chunker: *self,
            pages: pages.iter(),
            current: None,
            next_index: 0,
        }
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Iterator over the passages of a document. Created by [`Chunker::split`].
pub struct Passages<'a> {
    chunker: Chunker,
    pages: std::slice::Iter<'a, PageText>,
    current: Option<PageCursor<'a>>,
    next_index: u32,
}

impl Iterator for Passages<'_> {
    type Item = Passage;

    fn next(&mut self) -> Option<Passage> {
        loop {
            if let Some(cursor) = self.current.as_mut() {
                if let Some((start, end)) = cursor.next_window(&self.chunker) {
                    let passage = cursor.passage(self.next_index, start, end);
                    self.next_index += 1;
                    return Some(passage);
                }
            }
            let page = self.pages.next()?;
            self.current = Some(PageCursor::new(page));
        }
    }
}

/// Window position within one page.
struct PageCursor<'a> {
    page: &'a PageText,
    /// Byte offset of every char, followed by `text.len()`.
    offsets: Vec<usize>,
    start: usize,
    done: bool,
}

impl<'a> PageCursor<'a> {
    fn new(page: &'a PageText) -> Self {
        let mut offsets: Vec<usize> = page.text.char_indices().map(|(i, _)| i).collect();
        offsets.push(page.text.len());
        Self {
            page,
            offsets,
            start: 0,
            done: false,
        }
    }

    fn char_len(&self) -> usize {
        self.offsets.len() - 1
    }

    fn next_window(&mut self, chunker: &Chunker) -> Option<(usize, usize)> {
        let len = self.char_len();
        if self.done || len == 0 {
            return None;
        }
        let start = self.start;
        let end = (start + chunker.chunk_size).min(len);
        if end == len {
            self.done = true;
        } else {
            self.start += chunker.chunk_size - chunker.chunk_overlap;
        }
        Some((start, end))
    }

    fn passage(&self, index: u32, start: usize, end: usize) -> Passage {
        let text = &self.page.text[self.offsets[start]..self.offsets[end]];
        make_passage(self.page, index, start, end, text)
    }
}

/// Build a [`Passage`] with a content-derived id.
fn make_passage(page: &PageText, index: u32, start: usize, end: usize, text: &str) -> Passage {
    let mut hasher = Sha256::new();
    hasher.update(page.source.as_bytes());
    hasher.update([0]);
    hasher.update(page.page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    let id = format!("{:x}", hasher.finalize());

    Passage {
        id,
        text: text.to_string(),
        source: page.source.clone(),
        page: page.page,
        chunk_index: index,
        start_char: start,
        end_char: end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(n: u32, text: &str) -> PageText {
        PageText {
            source: "doc.pdf".to_string(),
            page: n,
            text: text.to_string(),
        }
    }

    fn filler(len: usize) -> String {
        (0..len)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect()
    }

    #[test]
    fn test_rejects_overlap_not_below_size() {
        for (size, overlap) in [(500, 500), (10, 20), (0, 0)] {
            let err = Chunker::new(size, overlap).unwrap_err();
            assert!(matches!(err, Error::InvalidChunkConfig { .. }));
        }
        assert!(Chunker::new(500, 499).is_ok());
        assert!(Chunker::new(1, 0).is_ok());
    }

    #[test]
    fn test_short_page_single_passage() {
        let pages = vec![page(1, "Hello, world!")];
        let passages: Vec<Passage> = Chunker::default().split(&pages).collect();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "Hello, world!");
        assert_eq!(passages[0].start_char, 0);
        assert_eq!(passages[0].end_char, 13);
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        let pages = vec![page(1, "")];
        assert_eq!(Chunker::default().split(&pages).count(), 0);
    }

    #[test]
    fn test_windows_stop_at_page_end() {
        let pages = vec![page(1, "0123456789abcdefghij")];
        let chunker = Chunker::new(10, 5).unwrap();
        let texts: Vec<String> = chunker.split(&pages).map(|p| p.text).collect();
        assert_eq!(texts, ["0123456789", "56789abcde", "abcdefghij"]);
    }

    #[test]
    fn test_two_pages_at_defaults_yield_five_passages() {
        // 900 chars -> [0,500) [400,900); 1300 chars -> [0,500) [400,900) [800,1300)
        let pages = vec![page(1, &filler(900)), page(2, &filler(1300))];
        let passages: Vec<Passage> = Chunker::new(500, 100).unwrap().split(&pages).collect();
        assert_eq!(passages.len(), 5);
        let pages_of: Vec<u32> = passages.iter().map(|p| p.page).collect();
        assert_eq!(pages_of, [1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_overlap_invariant() {
        let text = filler(2345);
        let pages = vec![page(1, &text)];
        let chunker = Chunker::new(500, 100).unwrap();
        let passages: Vec<Passage> = chunker.split(&pages).collect();
        for pair in passages.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert_eq!(a.end_char - b.start_char, 100);
            let tail: String = a.text.chars().skip(a.text.chars().count() - 100).collect();
            let head: String = b.text.chars().take(100).collect();
            assert_eq!(tail, head);
        }
        assert_eq!(passages.last().unwrap().end_char, 2345);
    }

    #[test]
    fn test_passage_length_bounded() {
        let pages = vec![page(1, &filler(1234)), page(2, &filler(77))];
        let chunker = Chunker::new(100, 30).unwrap();
        for p in chunker.split(&pages) {
            assert!(p.text.chars().count() <= 100);
            assert_eq!(p.text.chars().count(), p.end_char - p.start_char);
        }
    }

    #[test]
    fn test_indices_contiguous_across_pages() {
        let pages = vec![page(1, &filler(250)), page(2, &filler(250))];
        let chunker = Chunker::new(100, 20).unwrap();
        for (i, p) in chunker.split(&pages).enumerate() {
            assert_eq!(p.chunk_index, i as u32);
        }
    }

    #[test]
    fn test_overlap_does_not_cross_pages() {
        let pages = vec![page(1, "aaaaaaaaaa"), page(2, "bbbbbbbbbb")];
        let chunker = Chunker::new(8, 4).unwrap();
        let passages: Vec<Passage> = chunker.split(&pages).collect();
        let first_of_page_two = passages.iter().find(|p| p.page == 2).unwrap();
        assert_eq!(first_of_page_two.start_char, 0);
        assert!(first_of_page_two.text.chars().all(|c| c == 'b'));
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────┐ añoñú 👋 │ información │".repeat(20);
        let pages = vec![page(1, &text)];
        let chunker = Chunker::new(17, 5).unwrap();
        let passages: Vec<Passage> = chunker.split(&pages).collect();
        assert!(passages.len() > 1);
        for p in &passages {
            assert!(p.text.chars().count() <= 17);
        }
    }

    #[test]
    fn test_deterministic() {
        let pages = vec![page(1, &filler(1500)), page(2, "Alpha beta gamma")];
        let chunker = Chunker::new(200, 50).unwrap();
        let a: Vec<Passage> = chunker.split(&pages).collect();
        let b: Vec<Passage> = chunker.split(&pages).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_ids_depend_on_position() {
        let pages = vec![page(1, "same"), page(2, "same")];
        let passages: Vec<Passage> = Chunker::default().split(&pages).collect();
        assert_ne!(passages[0].id, passages[1].id);
    }
}
