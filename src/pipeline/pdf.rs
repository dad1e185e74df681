//! PDF text extraction via `lopdf`.
//!
//! Pages are read one at a time in document order. A page that yields no
//! text, or whose content stream `lopdf` cannot decode (unusual font
//! encodings, image-only scans), is skipped with a warning rather than
//! failing the whole upload. Only a document that cannot be opened at all
//! is an error.
//!
//! "No text" means an empty string once the newline `lopdf` appends after
//! the last text object is removed. A page holding only whitespace is kept.

use super::document::{DocumentKind, ExtractOptions};
use crate::error::ScriptGenError;
use lopdf::Document;
use tracing::{debug, warn};

/// `.pdf` extractor: the text of every non-empty page, each followed by `\n`.
pub fn extract_pdf_text(bytes: &[u8], _options: &ExtractOptions) -> Result<String, ScriptGenError> {
    let document =
        Document::load_mem(bytes).map_err(|e| ScriptGenError::extraction(DocumentKind::Pdf, e))?;

    if document.is_encrypted() {
        return Err(ScriptGenError::extraction(
            DocumentKind::Pdf,
            "document is password protected",
        ));
    }

    let pages = document.get_pages();
    debug!("PDF has {} pages", pages.len());

    let mut text = String::new();
    for page_num in pages.keys() {
        match document.extract_text(&[*page_num]) {
            Ok(page_text) => {
                let page_text = page_text.strip_suffix('\n').unwrap_or(&page_text);
                if page_text.is_empty() {
                    debug!("Page {}: no extractable text", page_num);
                    continue;
                }
                text.push_str(page_text);
                text.push('\n');
            }
            Err(e) => warn!("Page {}: text extraction failed, skipping: {}", page_num, e),
        }
    }
    Ok(text)
}
