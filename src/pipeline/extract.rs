//! Extractor dispatch: turn an upload into prompt-ready content.
//!
//! Text extractors are synchronous and CPU-bound, so [`extract_document`]
//! runs them on the blocking pool via `spawn_blocking`.
//!
//! Plain text and CSV live in this module; the heavier formats have their
//! own modules ([`super::pdf`], [`super::office`]).

use super::document::{DocumentKind, ExtractOptions, ExtractedDocument, Strategy, Upload};
use crate::error::ScriptGenError;
use tracing::{debug, info};

/// Extract the content of an optional upload.
///
/// Returns `Ok(None)` when there is no upload or its extension is not
/// supported; the caller then sends the bare prompt. Media kinds are passed
/// through without inspection.
///
/// # Errors
/// [`ScriptGenError::Extraction`] when a recognised document is corrupt.
pub async fn extract_document(
    upload: Option<Upload>,
    options: ExtractOptions,
) -> Result<Option<ExtractedDocument>, ScriptGenError> {
    let Some(upload) = upload else {
        return Ok(None);
    };
    let Some(kind) = DocumentKind::from_filename(&upload.filename) else {
        info!(
            "Ignoring upload '{}': unsupported extension",
            upload.filename
        );
        return Ok(None);
    };

    match kind.strategy() {
        Strategy::Media(mime) => {
            let mime_type = mime.resolve(&upload);
            debug!(
                "Passing {} upload through as {} ({} bytes)",
                kind,
                mime_type,
                upload.bytes.len()
            );
            Ok(Some(ExtractedDocument::Media {
                kind,
                mime_type,
                data: upload.bytes,
            }))
        }
        Strategy::Text(extractor) => {
            let size = upload.bytes.len();
            let text = tokio::task::spawn_blocking(move || extractor(&upload.bytes, &options))
                .await
                .map_err(|e| ScriptGenError::Internal(format!("Extraction task panicked: {e}")))??;
            debug!(
                "Extracted {} chars from {} bytes of {}",
                text.len(),
                size,
                kind
            );
            Ok(Some(ExtractedDocument::Text { kind, text }))
        }
    }
}

/// Decode UTF-8, dropping invalid byte sequences instead of failing.
///
/// Unlike [`String::from_utf8_lossy`] nothing is substituted: a stray `0xFF`
/// simply disappears.
pub fn decode_utf8_dropping_invalid(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// `.txt` extractor.
pub fn extract_plain_text(bytes: &[u8], _options: &ExtractOptions) -> Result<String, ScriptGenError> {
    Ok(decode_utf8_dropping_invalid(bytes))
}

/// `.csv` extractor: every record on its own line, cells joined by `", "`.
///
/// There is no header row and records may have different lengths.
pub fn extract_csv_text(bytes: &[u8], _options: &ExtractOptions) -> Result<String, ScriptGenError> {
    let decoded = decode_utf8_dropping_invalid(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ScriptGenError::extraction(DocumentKind::Csv, e))?;
        lines.push(record.iter().collect::<Vec<_>>().join(", "));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str, bytes: &[u8]) -> Upload {
        Upload {
            filename: name.to_string(),
            content_type: None,
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn invalid_utf8_byte_is_dropped() {
        let text = extract_plain_text(b"caf\xFFe", &ExtractOptions::default()).unwrap();
        assert_eq!(text, "cafe");
    }

    #[test]
    fn truncated_multibyte_sequence_is_dropped() {
        // "é" is C3 A9; a lone C3 before ASCII is invalid.
        assert_eq!(decode_utf8_dropping_invalid(b"a\xC3b\xC3\xA9"), "abé");
    }

    #[test]
    fn empty_text_file() {
        assert_eq!(extract_plain_text(b"", &ExtractOptions::default()).unwrap(), "");
    }

    #[test]
    fn csv_rows_and_cells() {
        let csv = b"time,line\n0,\"Hello, world\"\n5,Bye\n";
        let text = extract_csv_text(csv, &ExtractOptions::default()).unwrap();
        assert_eq!(text, "time, line\n0, Hello, world\n5, Bye");
    }

    #[test]
    fn csv_ragged_rows_are_kept() {
        let text = extract_csv_text(b"a,b,c\nd\n", &ExtractOptions::default()).unwrap();
        assert_eq!(text, "a, b, c\nd");
    }

    #[test]
    fn csv_empty_file() {
        assert_eq!(extract_csv_text(b"", &ExtractOptions::default()).unwrap(), "");
    }

    #[tokio::test]
    async fn no_upload_means_no_document() {
        let doc = extract_document(None, ExtractOptions::default()).await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn unknown_extension_is_skipped() {
        let doc = extract_document(Some(upload("notes.rtf", b"{\\rtf1}")), ExtractOptions::default())
            .await
            .unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn text_upload_is_extracted() {
        let doc = extract_document(Some(upload("Notes.TXT", b"hi\xFF")), ExtractOptions::default())
            .await
            .unwrap();
        assert_eq!(
            doc,
            Some(ExtractedDocument::Text {
                kind: DocumentKind::Text,
                text: "hi".into()
            })
        );
    }

    #[tokio::test]
    async fn video_upload_passes_through() {
        let doc = extract_document(Some(upload("clip.MP4", &[0, 0, 0, 24])), ExtractOptions::default())
            .await
            .unwrap()
            .unwrap();
        match doc {
            ExtractedDocument::Media { kind, mime_type, data } => {
                assert_eq!(kind, DocumentKind::Video);
                assert_eq!(mime_type, "video/mp4");
                assert_eq!(data, vec![0, 0, 0, 24]);
            }
            other => panic!("expected media, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_image_passes_through() {
        let doc = extract_document(Some(upload("blank.png", b"")), ExtractOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(doc, ExtractedDocument::Media { ref data, .. } if data.is_empty()));
    }

    #[tokio::test]
    async fn corrupt_document_is_an_extraction_error() {
        let err = extract_document(Some(upload("broken.docx", b"not a zip")), ExtractOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScriptGenError::Extraction {
                kind: DocumentKind::Docx,
                ..
            }
        ));
    }
}
