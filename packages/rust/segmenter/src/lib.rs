//! Document segmentation: PDF bytes → ordered page-level plain text.
//!
//! The document is parsed once up front (so a file that is not a PDF fails
//! immediately with a parse error), then pages are extracted lazily, one per
//! call to [`Pages::next`]. A page whose text cannot be extracted yields an
//! empty string rather than an error.

mod cleanup;

use lopdf::Document;
use tracing::{debug, info, instrument, warn};

use riskclause_shared::{PageText, Result, RiskClauseError};

/// Lazy, finite, single-pass sequence of pages in page order.
///
/// Owns the parsed document; once consumed it cannot be restarted.
pub struct Pages {
    document: Document,
    remaining: std::vec::IntoIter<u32>,
    total: usize,
}

impl Pages {
    /// Number of pages in the document.
    pub fn total(&self) -> usize {
        self.total
    }

    fn extract(&self, number: u32) -> String {
        match self.document.extract_text(&[number]) {
            Ok(raw) => {
                let text = cleanup::run_pipeline(&raw);
                debug!(page = number, chars = text.len(), "page text extracted");
                text
            }
            Err(e) => {
                warn!(page = number, error = %e, "no extractable text, treating page as empty");
                String::new()
            }
        }
    }
}

impl Iterator for Pages {
    type Item = PageText;

    fn next(&mut self) -> Option<PageText> {
        let number = self.remaining.next()?;
        Some(PageText::new(number, self.extract(number)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.remaining.size_hint()
    }
}

impl ExactSizeIterator for Pages {}

impl std::fmt::Debug for Pages {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pages")
            .field("total", &self.total)
            .field("remaining", &self.remaining.len())
            .finish()
    }
}

/// Open a PDF document from its bytes and prepare page extraction.
#[instrument(skip_all, fields(bytes = bytes.len()))]
pub fn segment(bytes: &[u8]) -> Result<Pages> {
    let document = Document::load_mem(bytes)
        .map_err(|e| RiskClauseError::parse(format!("cannot open document as PDF: {e}")))?;

    if document.is_encrypted() {
        return Err(RiskClauseError::parse("encrypted PDF documents are not supported"));
    }

    let numbers: Vec<u32> = document.get_pages().into_keys().collect();
    let total = numbers.len();

    if total == 0 {
        warn!("document has no pages");
    }
    info!(pages = total, "document opened");

    Ok(Pages {
        document,
        remaining: numbers.into_iter(),
        total,
    })
}
