//! Result types returned by the relay.

use crate::pipeline::document::DocumentKind;
use serde::{Deserialize, Serialize};

/// Body of a successful `POST /chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Normalized script table, or the sanitized model text when the output
    /// did not have a table shape.
    pub reply: String,
}

/// Per-request diagnostics. Logged, never sent to the client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayStats {
    /// Kind of the uploaded document, if one was used.
    pub document: Option<DocumentKind>,
    /// Characters of extracted text (0 for media and bare prompts).
    pub extracted_chars: usize,
    /// Bytes of media forwarded inline.
    pub media_bytes: usize,
    /// Number of prompt segments sent.
    pub segments: usize,
    /// Retries needed to open the upstream stream.
    pub retries: u32,
    /// Fragments received.
    pub fragments: usize,
    /// Fragments that carried no text.
    pub empty_fragments: usize,
    /// Finish reason reported by the model, if any.
    pub finish_reason: Option<String>,
    /// Characters collected from the stream before cleanup.
    pub raw_chars: usize,
    /// Characters in the final reply.
    pub reply_chars: usize,
    /// Whether the reply is a normalized table (false: sanitized fallback).
    pub table_normalized: bool,
    /// Time spent extracting the document.
    pub extract_ms: u64,
    /// Time from opening the stream to draining it.
    pub model_ms: u64,
    /// Wall-clock time for the whole request.
    pub total_ms: u64,
}

/// Reply plus the diagnostics gathered while producing it.
#[derive(Debug, Clone)]
pub struct RelayOutput {
    pub reply: ChatReply,
    pub stats: RelayStats,
}
