//! Gemini / Vertex AI backend: `streamGenerateContent` with `alt=sse`.
//!
//! ## Wire format
//!
//! The request is one `user` turn whose parts mirror the prompt segments:
//! text segments become `{"text": …}`, media segments become
//! `{"inlineData": {"mimeType": …, "data": <base64>}}`.
//!
//! The reply is Server-Sent Events, one JSON `GenerateContentResponse` per
//! `data:` line. Lines are split on raw bytes before UTF-8 decoding, so a
//! multi-byte character split across two network chunks survives intact.
//!
//! ## Endpoints
//!
//! | `model` | URL |
//! |---------|-----|
//! | `gemini-2.0-flash` | `{base}/models/gemini-2.0-flash:streamGenerateContent?alt=sse` |
//! | `projects/p/locations/l/endpoints/123` | `{base}/projects/p/locations/l/endpoints/123:streamGenerateContent?alt=sse` |
//!
//! The second form addresses a tuned model deployed on Vertex AI; it needs
//! an OAuth access token rather than an API key.

use super::{FragmentStream, GenerativeModel};
use crate::config::RelayConfig;
use crate::error::ScriptGenError;
use crate::pipeline::assemble::PromptSegment;
use crate::pipeline::collect::{Candidate, ResponseFragment};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, warn};

/// How requests authenticate.
#[derive(Clone)]
enum Auth {
    /// `?key=` query parameter (Generative Language API).
    ApiKey(String),
    /// `Authorization: Bearer` (Vertex AI).
    Bearer(String),
}

/// Gemini streaming client. Cheap to share; holds one connection pool.
pub struct GeminiModel {
    client: reqwest::Client,
    endpoint: String,
    auth: Auth,
    generation: Option<GenerationConfig>,
    name: String,
}

impl GeminiModel {
    /// Build a client from the relay config.
    ///
    /// # Errors
    /// [`ScriptGenError::ModelNotConfigured`] when neither an access token
    /// nor an API key is set.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ScriptGenError> {
        let auth = match (&config.access_token, &config.api_key) {
            (Some(token), _) if !token.is_empty() => Auth::Bearer(token.clone()),
            (_, Some(key)) if !key.is_empty() => Auth::ApiKey(key.clone()),
            _ => {
                return Err(ScriptGenError::ModelNotConfigured {
                    backend: "gemini".to_string(),
                    hint: "Set GEMINI_API_KEY, or VERTEX_ACCESS_TOKEN for a Vertex AI endpoint."
                        .to_string(),
                })
            }
        };

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ScriptGenError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: stream_endpoint(&config.api_base, &config.model),
            auth,
            generation: GenerationConfig::from_config(config),
            name: format!("gemini/{}", config.model),
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_generate(&self, segments: &[PromptSegment]) -> Result<FragmentStream, ScriptGenError> {
        let body = build_request(segments, self.generation.clone());
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(&body);
        request = match &self.auth {
            Auth::ApiKey(key) => request.query(&[("key", key)]),
            Auth::Bearer(token) => request.bearer_auth(token),
        };

        debug!("POST {} ({} parts)", self.endpoint, body.contents[0].parts.len());
        let response = request.send().await.map_err(|e| ScriptGenError::Upstream {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ScriptGenError::Upstream {
                status: Some(status.as_u16()),
                message: error_message(&text),
            });
        }

        Ok(Box::pin(sse_fragments(response.bytes_stream())))
    }
}

/// Streaming URL for `model` under `api_base`.
pub fn stream_endpoint(api_base: &str, model: &str) -> String {
    let base = api_base.trim_end_matches('/');
    let model = model.trim_start_matches('/');
    if model.starts_with("projects/") || model.starts_with("models/") {
        format!("{base}/{model}:streamGenerateContent?alt=sse")
    } else {
        format!("{base}/models/{model}:streamGenerateContent?alt=sse")
    }
}

// ── Request body ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<usize>,
}

impl GenerationConfig {
    fn from_config(config: &RelayConfig) -> Option<Self> {
        if config.temperature.is_none() && config.max_output_tokens.is_none() {
            return None;
        }
        Some(Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }
}

fn build_request(segments: &[PromptSegment], generation: Option<GenerationConfig>) -> GenerateRequest {
    let parts = segments
        .iter()
        .map(|segment| match segment {
            PromptSegment::Media { mime_type, data } => RequestPart::Inline {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: STANDARD.encode(data),
                },
            },
            PromptSegment::Instruction(text)
            | PromptSegment::DocumentContext(text)
            | PromptSegment::UserText(text) => RequestPart::Text { text: text.clone() },
        })
        .collect();

    GenerateRequest {
        contents: vec![RequestContent { role: "user", parts }],
        generation_config: generation,
    }
}

/// Best-effort human message from an error response body.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        // Plain responses wrap the error in an object, streamed ones in an array.
        let error = v.get("error").or_else(|| v.get(0).and_then(|first| first.get("error")))?;
        error.get("message")?.as_str().map(str::to_string)
    });
    match message {
        Some(m) => m,
        None if body.trim().is_empty() => "<no body>".to_string(),
        None => body.trim().to_string(),
    }
}

// ── SSE parsing ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

/// Decode one `data:` payload. Malformed JSON is logged and skipped.
fn parse_chunk(data: &str) -> Option<Result<ResponseFragment, ScriptGenError>> {
    match serde_json::from_str::<WireChunk>(data) {
        Ok(WireChunk {
            error: Some(error), ..
        }) => Some(Err(ScriptGenError::Upstream {
            status: error.code,
            message: error.message,
        })),
        Ok(chunk) => Some(Ok(ResponseFragment {
            candidates: chunk.candidates,
        })),
        Err(e) => {
            warn!("Skipping malformed stream chunk: {}", e);
            None
        }
    }
}

struct SseState<S> {
    inner: Pin<Box<S>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<ResponseFragment, ScriptGenError>>,
    done: bool,
}

impl<S> SseState<S> {
    fn handle_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data.is_empty() || data == "[DONE]" {
            return;
        }
        if let Some(item) = parse_chunk(data) {
            self.pending.push_back(item);
        }
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&line);
        }
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&rest);
        }
    }
}

/// Turn a raw SSE byte stream into response fragments.
///
/// A transport error ends the stream after being yielded once.
pub fn sse_fragments<S, B, E>(bytes: S) -> impl Stream<Item = Result<ResponseFragment, ScriptGenError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = SseState {
        inner: Box::pin(bytes),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.inner.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(chunk.as_ref());
                    state.drain_lines();
                }
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.clear();
                    return Some((
                        Err(ScriptGenError::Upstream {
                            status: None,
                            message: format!("stream interrupted: {e}"),
                        }),
                        state,
                    ));
                }
                None => {
                    state.done = true;
                    state.flush();
                }
            }
        }
    })
}
