use crate::error::{PipelineError, Result};
use lopdf::Document;
use tracing::warn;

/// Pulls raw text out of an uploaded document. Behind a trait so the
/// orchestrator can be exercised without real PDF bytes.
pub trait TextExtractor: Send + Sync {
    /// Returns the concatenated text of every page, pages joined by a
    /// newline. A well-formed PDF without a text layer yields an empty
    /// string, not an error.
    fn extract(&self, content: &[u8], filename: &str) -> Result<String>;
}

#[derive(Debug, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, content: &[u8], filename: &str) -> Result<String> {
        let document = Document::load_mem(content)
            .map_err(|error| PipelineError::Extraction(format!("{filename}: {error}")))?;

        let mut full_text = String::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| {
                    PipelineError::Extraction(format!("{filename} page {page_no}: {error}"))
                })?;
            full_text.push_str(&text);
            full_text.push('\n');
        }

        if full_text.trim().is_empty() {
            warn!(filename = %filename, "no text extracted; pdf likely has no text layer");
        }

        Ok(full_text)
    }
}

impl<T: TextExtractor + ?Sized> TextExtractor for Box<T> {
    fn extract(&self, content: &[u8], filename: &str) -> Result<String> {
        (**self).extract(content, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_bytes_fail_with_extraction_error() {
        let extractor = PdfTextExtractor;
        let result = extractor.extract(b"%PDF-1.4\n%broken", "broken.pdf");

        match result {
            Err(PipelineError::Extraction(details)) => {
                assert!(details.contains("broken.pdf"));
            }
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn arbitrary_bytes_fail_with_extraction_error() {
        let extractor = PdfTextExtractor;
        assert!(extractor.extract(b"not a pdf at all", "junk.pdf").is_err());
    }
}
