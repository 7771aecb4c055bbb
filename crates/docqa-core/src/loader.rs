//! Document loader abstraction.
//!
//! Loaders turn stored document bytes into ordered page texts. The PDF
//! implementation lives in the `docqa` app crate; keeping the trait here lets
//! the core pipeline and its tests run without any extraction backend.

use crate::error::Result;
use crate::models::PageText;

/// Extracts ordered page-level text blocks from a document.
///
/// Implementations are pure transformations: no side effects, and the same
/// bytes always yield the same pages. Failures are reported as
/// [`Error::UnreadableDocument`](crate::error::Error::UnreadableDocument).
pub trait DocumentLoader: Send + Sync {
    /// Returns pages in document order. Pages without text are omitted.
    fn load(&self, name: &str, bytes: &[u8]) -> Result<Vec<PageText>>;
}
