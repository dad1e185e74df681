//! Error types for the edgequake-scriptgen library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ScriptGenError`]: **Fatal**: the request cannot be answered at all
//!   (corrupt document, upstream model failure, missing credentials).
//!   Returned as `Err(ScriptGenError)` from [`crate::relay::generate_reply`]
//!   and mapped to an HTTP error status by [`crate::server`].
//!
//! * [`TableShapeMismatch`]: **Non-fatal**: the model output could not be
//!   coerced into a three-column table. The relay falls back to the sanitised
//!   text instead, so this never reaches the caller.
//!
//! Undecodable UTF-8 and empty stream fragments are recovered where they are
//! found and have no error type at all.

use crate::pipeline::document::DocumentKind;
use thiserror::Error;

/// All fatal errors returned by the edgequake-scriptgen library.
#[derive(Debug, Error)]
pub enum ScriptGenError {
    // ── Document errors ───────────────────────────────────────────────────
    /// A recognised document could not be opened or parsed.
    #[error("Failed to extract {kind} document: {detail}")]
    Extraction { kind: DocumentKind, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured model backend is missing credentials or a provider.
    #[error("Model backend '{backend}' is not configured.\n{hint}")]
    ModelNotConfigured { backend: String, hint: String },

    /// The upstream model call failed, either before streaming started or
    /// through an error object inside the stream.
    #[error("Upstream model error{}: {message}", http_suffix(.status))]
    Upstream { status: Option<u16>, message: String },

    /// No fragment arrived within the idle timeout.
    #[error("Upstream model stream stalled for {secs}s")]
    UpstreamTimeout { secs: u64 },

    // ── Request errors ───────────────────────────────────────────────────
    /// The inbound request could not be read (malformed multipart body).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScriptGenError {
    pub(crate) fn extraction(kind: DocumentKind, detail: impl std::fmt::Display) -> Self {
        Self::Extraction {
            kind,
            detail: detail.to_string(),
        }
    }

    /// Whether a fresh attempt at opening the upstream stream may succeed.
    ///
    /// Rate limits (429), server-side failures (5xx) and transport errors
    /// (no status at all) are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status: None, .. } => true,
            Self::Upstream {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            Self::UpstreamTimeout { .. } => true,
            _ => false,
        }
    }
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Why a block of model output could not be turned into a table.
///
/// Recovered by [`crate::pipeline::postprocess::normalize_markdown_table`],
/// which returns the sanitised input verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableShapeMismatch {
    /// Fewer than one full row of cells.
    #[error("only {cells} non-empty cells, need at least {columns}")]
    TooFewCells { cells: usize, columns: usize },

    /// Cells do not divide evenly into rows.
    #[error("{cells} non-empty cells leave a remainder of {remainder} over {columns} columns")]
    Ragged {
        cells: usize,
        columns: usize,
        remainder: usize,
    },

    /// A cell spans a line break, so it is prose or a wrapped cell rather
    /// than one table cell.
    #[error("cell {index} spans multiple lines")]
    MultilineCell { index: usize },
}
