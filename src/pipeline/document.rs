//! Document kinds and the per-kind extraction strategy table.
//!
//! A file's kind is decided once from its extension and never re-inspected:
//! [`DocumentKind::from_filename`] picks the tag, [`DocumentKind::strategy`]
//! maps the tag to either a text extractor or a media pass-through.

use crate::config::FalsyCells;
use crate::error::ScriptGenError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A file uploaded alongside the prompt. Owned by one request.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Client-supplied filename; only its extension is used.
    pub filename: String,
    /// Declared content type from the multipart field, if any.
    pub content_type: Option<String>,
    /// Raw file bytes.
    pub bytes: Vec<u8>,
}

/// Supported document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Pdf,
    /// `.png`, `.jpg`, `.jpeg`
    Image,
    /// `.mp4`
    Video,
    /// `.txt`
    Text,
    Csv,
    Docx,
    Xlsx,
    Pptx,
}

impl DocumentKind {
    /// Resolve the kind from a filename's extension (case-insensitive).
    ///
    /// Returns `None` for files without an extension and for unsupported
    /// extensions; those uploads are ignored and only the prompt is sent.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            "mp4" => Some(Self::Video),
            "txt" => Some(Self::Text),
            "csv" => Some(Self::Csv),
            "docx" => Some(Self::Docx),
            "xlsx" => Some(Self::Xlsx),
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }

    /// Upper-case label shown to the model in `DOCUMENT (<label>):`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Text => "TEXT",
            Self::Csv => "CSV",
            Self::Docx => "DOCX",
            Self::Xlsx => "EXCEL",
            Self::Pptx => "PRESENTATION",
        }
    }

    /// The extraction strategy for this kind.
    pub fn strategy(self) -> Strategy {
        match self {
            Self::Pdf => Strategy::Text(super::pdf::extract_pdf_text),
            Self::Image => Strategy::Media(MediaMime::Declared),
            Self::Video => Strategy::Media(MediaMime::Fixed("video/mp4")),
            Self::Text => Strategy::Text(super::extract::extract_plain_text),
            Self::Csv => Strategy::Text(super::extract::extract_csv_text),
            Self::Docx => Strategy::Text(super::office::extract_docx_text),
            Self::Xlsx => Strategy::Text(super::office::extract_xlsx_text),
            Self::Pptx => Strategy::Text(super::office::extract_pptx_text),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Options threaded into every text extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    pub falsy_cells: FalsyCells,
}

/// Signature shared by all text extractors.
pub type TextExtractor = fn(&[u8], &ExtractOptions) -> Result<String, ScriptGenError>;

/// How a document kind turns into prompt content.
#[derive(Clone, Copy)]
pub enum Strategy {
    /// Extract plain text and embed it in a labelled segment.
    Text(TextExtractor),
    /// Pass the bytes through untouched as a media segment.
    Media(MediaMime),
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Text(_) => f.write_str("Text(<extractor>)"),
            Strategy::Media(m) => f.debug_tuple("Media").field(m).finish(),
        }
    }
}

/// Where a media segment's MIME type comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaMime {
    /// The upload's declared content type, guessed from the extension when absent.
    Declared,
    /// Always this type, whatever the upload declares.
    Fixed(&'static str),
}

impl MediaMime {
    /// Resolve the MIME type for an upload.
    pub fn resolve(self, upload: &Upload) -> String {
        match self {
            MediaMime::Fixed(mime) => mime.to_string(),
            MediaMime::Declared => upload
                .content_type
                .as_deref()
                .map(str::trim)
                .filter(|ct| !ct.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    mime_guess::from_path(&upload.filename)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string()
                }),
        }
    }
}

/// Content derived from an upload, ready for prompt assembly.
///
/// Lives only for the duration of one request; the assembler consumes it.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedDocument {
    Text { kind: DocumentKind, text: String },
    Media {
        kind: DocumentKind,
        mime_type: String,
        data: Vec<u8>,
    },
}

impl ExtractedDocument {
    pub fn kind(&self) -> DocumentKind {
        match self {
            ExtractedDocument::Text { kind, .. } | ExtractedDocument::Media { kind, .. } => *kind,
        }
    }
}
