//! Streaming response collection.
//!
//! A model reply arrives as a sequence of [`ResponseFragment`]s. Each one may
//! carry zero or more candidates, and each candidate zero or more parts, so
//! every level is optional and an empty fragment is an ordinary no-op.
//!
//! [`collect_text`] drains the stream and returns the full text only once it
//! has ended. Dropping the returned future drops the stream with it, which
//! closes the upstream connection; any partial text is discarded.

use crate::config::CandidatePolicy;
use crate::error::ScriptGenError;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

/// One increment of a streamed model reply.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFragment {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// One alternative completion inside a fragment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A content part. Non-text parts deserialize with `text: None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

impl ResponseFragment {
    /// A single-candidate, single-part fragment holding `text`.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: vec![Part {
                        text: Some(text.into()),
                    }],
                }),
                finish_reason: None,
            }],
        }
    }

    /// The candidate selected by `policy`, if the fragment has one.
    pub fn candidate(&self, policy: CandidatePolicy) -> Option<&Candidate> {
        match policy {
            CandidatePolicy::FirstOnly => self.candidates.first(),
        }
    }
}

/// Counters gathered while draining a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    /// Fragments received.
    pub fragments: usize,
    /// Fragments that contributed no text.
    pub empty_fragments: usize,
    /// Last finish reason reported by the selected candidate.
    pub finish_reason: Option<String>,
}

/// Append the non-empty text parts of one fragment; returns the bytes added.
fn append_fragment(
    text: &mut String,
    fragment: &ResponseFragment,
    policy: CandidatePolicy,
    stats: &mut CollectStats,
) -> usize {
    let Some(candidate) = fragment.candidate(policy) else {
        return 0;
    };
    if let Some(reason) = &candidate.finish_reason {
        stats.finish_reason = Some(reason.clone());
    }
    let Some(content) = &candidate.content else {
        return 0;
    };

    let before = text.len();
    for part in &content.parts {
        if let Some(t) = part.text.as_deref().filter(|t| !t.is_empty()) {
            text.push_str(t);
        }
    }
    text.len() - before
}

/// Drain `stream`, concatenating text in arrival order.
///
/// # Errors
/// - The first `Err` item the stream yields (upstream error object,
///   transport failure).
/// - [`ScriptGenError::UpstreamTimeout`] if no item arrives within `idle`.
pub async fn collect_text<S>(
    mut stream: S,
    policy: CandidatePolicy,
    idle: Duration,
) -> Result<(String, CollectStats), ScriptGenError>
where
    S: Stream<Item = Result<ResponseFragment, ScriptGenError>> + Unpin,
{
    let mut text = String::new();
    let mut stats = CollectStats::default();

    loop {
        let next = tokio::time::timeout(idle, stream.next())
            .await
            .map_err(|_| ScriptGenError::UpstreamTimeout {
                secs: idle.as_secs(),
            })?;
        let Some(item) = next else {
            break;
        };
        let fragment = item?;
        stats.fragments += 1;
        let added = append_fragment(&mut text, &fragment, policy, &mut stats);
        if added == 0 {
            stats.empty_fragments += 1;
        }
        trace!("Fragment {}: +{} bytes", stats.fragments, added);
    }

    debug!(
        "Stream drained: {} fragments ({} empty), {} bytes, finish={:?}",
        stats.fragments,
        stats.empty_fragments,
        text.len(),
        stats.finish_reason
    );
    Ok((text, stats))
}
