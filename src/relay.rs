//! The request pipeline: upload and prompt in, script table out.
//!
//! [`generate_reply`] is the only entry point the server needs. It owns the
//! upload for the duration of the call and drops every intermediate buffer
//! before returning.
//!
//! ## Retry Strategy
//!
//! Only opening the stream is retried. HTTP 429 / 5xx and transport errors
//! before the first fragment are transient; the wait is
//! `retry_backoff_ms * 2^(attempt-1)`, so with the defaults (500 ms, 2
//! retries) a request waits at most 1.5 s before giving up. Once fragments
//! are flowing a failure is final.

use crate::config::RelayConfig;
use crate::error::ScriptGenError;
use crate::model::{FragmentStream, GenerativeModel};
use crate::output::{ChatReply, RelayOutput, RelayStats};
use crate::pipeline::assemble::{assemble, PromptSegment};
use crate::pipeline::collect::collect_text;
use crate::pipeline::document::{ExtractOptions, ExtractedDocument, Upload};
use crate::pipeline::extract::extract_document;
use crate::pipeline::postprocess::{normalize_table, sanitize_output};
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Run one prompt (and optional upload) through extraction, the model and
/// post-processing.
///
/// # Errors
/// - [`ScriptGenError::Extraction`] for a corrupt document.
/// - [`ScriptGenError::Upstream`] / [`ScriptGenError::UpstreamTimeout`] when
///   the model call fails.
///
/// A reply that is not table-shaped is not an error: it is returned
/// sanitized but otherwise unchanged.
pub async fn generate_reply(
    model: &dyn GenerativeModel,
    config: &RelayConfig,
    prompt: &str,
    upload: Option<Upload>,
) -> Result<RelayOutput, ScriptGenError> {
    let start = Instant::now();
    let mut stats = RelayStats::default();

    // ── Extract ──────────────────────────────────────────────────────────
    let options = ExtractOptions {
        falsy_cells: config.falsy_cells,
    };
    let document = extract_document(upload, options).await?;
    if let Some(doc) = &document {
        stats.document = Some(doc.kind());
        match doc {
            ExtractedDocument::Text { text, .. } => stats.extracted_chars = text.chars().count(),
            ExtractedDocument::Media { data, .. } => stats.media_bytes = data.len(),
        }
    }
    stats.extract_ms = start.elapsed().as_millis() as u64;

    // ── Assemble ─────────────────────────────────────────────────────────
    let segments = assemble(document, prompt);
    stats.segments = segments.len();

    // ── Model ────────────────────────────────────────────────────────────
    let model_start = Instant::now();
    let (stream, retries) = open_stream(model, &segments, config).await?;
    drop(segments);
    stats.retries = retries;

    let idle = Duration::from_secs(config.stream_idle_timeout_secs);
    let (raw, collected) = collect_text(stream, config.candidate_policy, idle).await?;
    stats.model_ms = model_start.elapsed().as_millis() as u64;
    stats.fragments = collected.fragments;
    stats.empty_fragments = collected.empty_fragments;
    stats.finish_reason = collected.finish_reason;
    stats.raw_chars = raw.chars().count();

    // ── Post-process ─────────────────────────────────────────────────────
    let sanitized = sanitize_output(&raw);
    let reply = match normalize_table(&sanitized, config.separator_policy) {
        Ok(table) => {
            stats.table_normalized = true;
            debug!("Normalized table: {} data rows", table.rows.len());
            table.render()
        }
        Err(mismatch) => {
            debug!("Returning sanitized text: {}", mismatch);
            sanitized
        }
    };
    stats.reply_chars = reply.chars().count();
    stats.total_ms = start.elapsed().as_millis() as u64;

    info!(
        "Reply via {}: {} fragments, {} chars, table={}, {}ms",
        model.name(),
        stats.fragments,
        stats.reply_chars,
        stats.table_normalized,
        stats.total_ms
    );

    Ok(RelayOutput {
        reply: ChatReply { reply },
        stats,
    })
}

/// Open the upstream stream, retrying transient failures with backoff.
async fn open_stream(
    model: &dyn GenerativeModel,
    segments: &[PromptSegment],
    config: &RelayConfig,
) -> Result<(FragmentStream, u32), ScriptGenError> {
    let mut attempt = 0u32;
    loop {
        match model.stream_generate(segments).await {
            Ok(stream) => return Ok((stream, attempt)),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let backoff = backoff_ms(config.retry_backoff_ms, attempt);
                warn!(
                    "{}: retry {}/{} after {}ms ({})",
                    model.name(),
                    attempt,
                    config.max_retries,
                    backoff,
                    e
                );
                sleep(Duration::from_millis(backoff)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// `base_ms * 2^(attempt-1)`, saturating at `u64::MAX`.
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeparatorPolicy;
    use crate::pipeline::collect::ResponseFragment;
    use async_trait::async_trait;
    use futures::stream;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replies with fixed chunks after failing `failures` times with `error`.
    struct ScriptedModel {
        chunks: Vec<&'static str>,
        failures: u32,
        status: Option<u16>,
        calls: AtomicU32,
        seen: Mutex<Vec<PromptSegment>>,
    }

    impl ScriptedModel {
        fn new(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                failures: 0,
                status: None,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, failures: u32, status: u16) -> Self {
            self.failures = failures;
            self.status = Some(status);
            self
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream_generate(&self, segments: &[PromptSegment]) -> Result<FragmentStream, ScriptGenError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(ScriptGenError::Upstream {
                    status: self.status,
                    message: "scripted failure".into(),
                });
            }
            *self.seen.lock().unwrap() = segments.to_vec();
            let items: Vec<Result<ResponseFragment, ScriptGenError>> = self
                .chunks
                .iter()
                .map(|c| Ok(ResponseFragment::from_text(*c)))
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }
    }

    fn fast_config() -> RelayConfig {
        RelayConfig::builder().retry_backoff_ms(1).build().unwrap()
    }

    fn upload(name: &str, bytes: &[u8]) -> Upload {
        Upload {
            filename: name.into(),
            content_type: None,
            bytes: bytes.to_vec(),
        }
    }

    #[tokio::test]
    async fn collapsed_table_is_normalized() {
        let model = ScriptedModel::new(vec!["**| Time | VO | Visuals |", "| 0 | Hello | Wide shot |**"]);
        let out = generate_reply(&model, &fast_config(), "make a script", None)
            .await
            .unwrap();
        assert_eq!(
            out.reply.reply,
            "| Time | VO | Visuals |\n| :------- | :--------- | :--------- |\n| 0 | Hello | Wide shot |"
        );
        assert!(out.stats.table_normalized);
        assert_eq!(out.stats.fragments, 2);
        assert_eq!(out.stats.segments, 2);
    }

    #[tokio::test]
    async fn prose_reply_is_sanitized_only() {
        let model = ScriptedModel::new(vec!["  ### Hello", " there! **Ask** me anything.  "]);
        let out = generate_reply(&model, &fast_config(), "hi", None).await.unwrap();
        assert_eq!(out.reply.reply, "Hello there! Ask me anything.");
        assert!(!out.stats.table_normalized);
    }

    #[tokio::test]
    async fn text_upload_reaches_the_model() {
        let model = ScriptedModel::new(vec!["ok"]);
        let out = generate_reply(&model, &fast_config(), "use it", Some(upload("notes.txt", b"facts\xFF")))
            .await
            .unwrap();
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            PromptSegment::DocumentContext("\nDOCUMENT (TEXT):\nfacts\n\nUSER TASK:\nuse it\n".into())
        );
        assert_eq!(out.stats.extracted_chars, 5);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let model = ScriptedModel::new(vec!["done"]).failing(2, 503);
        let out = generate_reply(&model, &fast_config(), "", None).await.unwrap();
        assert_eq!(out.reply.reply, "done");
        assert_eq!(out.stats.retries, 2);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let model = ScriptedModel::new(vec!["never"]).failing(10, 429);
        let err = generate_reply(&model, &fast_config(), "", None).await.unwrap_err();
        assert!(matches!(err, ScriptGenError::Upstream { status: Some(429), .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let model = ScriptedModel::new(vec!["never"]).failing(1, 400);
        let err = generate_reply(&model, &fast_config(), "", None).await.unwrap_err();
        assert!(matches!(err, ScriptGenError::Upstream { status: Some(400), .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_saturates() {
        assert_eq!(backoff_ms(500, 1), 500);
        assert_eq!(backoff_ms(500, 2), 1000);
        assert_eq!(backoff_ms(500, 3), 2000);
        assert_eq!(backoff_ms(500, 65), u64::MAX);
        assert_eq!(backoff_ms(1, u32::MAX), u64::MAX);
        assert_eq!(backoff_ms(0, 100), 0);
    }

    #[tokio::test]
    async fn corrupt_upload_fails_before_the_model() {
        let model = ScriptedModel::new(vec!["never"]);
        let err = generate_reply(&model, &fast_config(), "", Some(upload("deck.pptx", b"nope")))
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptGenError::Extraction { .. }));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn separator_policy_is_applied() {
        let chunks = vec!["| T | V | S |\n| :--- | :--- | :--- |\n| 0 | a | b |"];
        let config = RelayConfig::builder()
            .separator_policy(SeparatorPolicy::DropExisting)
            .build()
            .unwrap();
        let out = generate_reply(&ScriptedModel::new(chunks), &config, "", None)
            .await
            .unwrap();
        assert_eq!(out.reply.reply.lines().count(), 3);
    }
}
