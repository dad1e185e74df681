//! `edgequake-llm` backend: any provider the factory knows (OpenAI,
//! Anthropic, Gemini, Ollama, …) behind the [`GenerativeModel`] trait.
//!
//! Providers answer with one complete message, so the reply stream holds a
//! single fragment. The instruction segment becomes the system message; the
//! remaining text segments are joined into one user message and media
//! segments ride along as base64 attachments.

use super::{FragmentStream, GenerativeModel};
use crate::config::RelayConfig;
use crate::error::ScriptGenError;
use crate::pipeline::assemble::PromptSegment;
use crate::pipeline::collect::ResponseFragment;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory};
use std::sync::Arc;
use tracing::{debug, warn};

/// Adapter from an [`LLMProvider`] to [`GenerativeModel`].
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    name: String,
}

impl ProviderModel {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &RelayConfig) -> Self {
        let name = match &config.provider_name {
            Some(p) => format!("{p}/{}", config.model),
            None => format!("provider/{}", config.model),
        };
        Self {
            provider,
            options: build_options(config),
            name,
        }
    }

    /// Resolve a provider from the config (or the environment) and wrap it.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ScriptGenError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }
}

#[async_trait]
impl GenerativeModel for ProviderModel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_generate(&self, segments: &[PromptSegment]) -> Result<FragmentStream, ScriptGenError> {
        let messages = build_messages(segments);
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(upstream_error)?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.name, response.prompt_tokens, response.completion_tokens
        );
        let fragment = ResponseFragment::from_text(response.content);
        Ok(Box::pin(tokio_stream::once(Ok(fragment))))
    }
}

/// Prompt segments regrouped into chat roles.
#[derive(Debug, Default, PartialEq)]
struct ChatParts<'a> {
    system: Vec<&'a str>,
    user: Vec<&'a str>,
    media: Vec<(&'a str, &'a [u8])>,
}

fn split_segments(segments: &[PromptSegment]) -> ChatParts<'_> {
    let mut parts = ChatParts::default();
    for segment in segments {
        match segment {
            PromptSegment::Instruction(text) => parts.system.push(text.as_str()),
            PromptSegment::DocumentContext(text) | PromptSegment::UserText(text) => {
                parts.user.push(text.as_str())
            }
            PromptSegment::Media { mime_type, data } => {
                parts.media.push((mime_type.as_str(), data.as_slice()))
            }
        }
    }
    parts
}

fn build_messages(segments: &[PromptSegment]) -> Vec<ChatMessage> {
    let parts = split_segments(segments);
    let mut messages = Vec::with_capacity(2);
    if !parts.system.is_empty() {
        messages.push(ChatMessage::system(parts.system.join("\n")));
    }

    let user_text = parts.user.join("\n");
    if parts.media.is_empty() {
        messages.push(ChatMessage::user(user_text));
    } else {
        let images = parts
            .media
            .iter()
            .map(|(mime, data)| {
                if !mime.starts_with("image/") {
                    warn!("Forwarding {} attachment; not every provider accepts it", mime);
                }
                ImageData::new(STANDARD.encode(data), *mime)
            })
            .collect();
        messages.push(ChatMessage::user_with_images(user_text, images));
    }
    messages
}

fn build_options(config: &RelayConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_output_tokens,
        ..Default::default()
    }
}

/// Resolve an LLM provider from config, then from the environment.
fn resolve_provider(config: &RelayConfig) -> Result<Arc<dyn LLMProvider>, ScriptGenError> {
    if let Some(ref name) = config.provider_name {
        return create_provider(name, &config.model);
    }

    // Honour EDGEQUAKE_LLM_PROVIDER + EDGEQUAKE_MODEL when both set
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _) =
        ProviderFactory::from_env().map_err(|e| ScriptGenError::ModelNotConfigured {
            backend: "provider".to_string(),
            hint: format!("No LLM provider auto-detected: {e}"),
        })?;
    Ok(llm_provider)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ScriptGenError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ScriptGenError::ModelNotConfigured {
            backend: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Map a provider failure onto the HTTP status it corresponds to, so the
/// retry loop only repeats transient failures.
///
/// Transport failures keep `status: None`; permanent errors (auth, bad
/// request, unknown model, config) get a 4xx and are never retried.
fn upstream_error(err: LlmError) -> ScriptGenError {
    let status = match &err {
        LlmError::NetworkError(_) | LlmError::Timeout => None,
        LlmError::RateLimited(_) => Some(429),
        LlmError::AuthError(_) => Some(401),
        LlmError::ModelNotFound(_) => Some(404),
        LlmError::TokenLimitExceeded { .. } => Some(413),
        LlmError::InvalidRequest(_) | LlmError::ConfigError(_) | LlmError::NotSupported(_) => Some(400),
        _ => Some(502),
    };
    ScriptGenError::Upstream {
        status,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_provider_errors_are_not_retried() {
        let permanent = [
            LlmError::AuthError("bad key".into()),
            LlmError::InvalidRequest("no".into()),
            LlmError::ModelNotFound("gpt-nope".into()),
            LlmError::ConfigError("missing base url".into()),
            LlmError::TokenLimitExceeded { max: 8, got: 9 },
        ];
        for err in permanent {
            let mapped = upstream_error(err);
            assert!(!mapped.is_retryable(), "{mapped}");
        }
    }

    #[test]
    fn transient_provider_errors_are_retried() {
        let transient = [
            LlmError::NetworkError("reset".into()),
            LlmError::Timeout,
            LlmError::RateLimited("slow down".into()),
            LlmError::ProviderError("overloaded".into()),
        ];
        for err in transient {
            let mapped = upstream_error(err);
            assert!(mapped.is_retryable(), "{mapped}");
        }
        assert!(matches!(
            upstream_error(LlmError::AuthError("x".into())),
            ScriptGenError::Upstream { status: Some(401), .. }
        ));
    }

    #[test]
    fn segments_regroup_by_role() {
        let segments = vec![
            PromptSegment::Instruction("sys".into()),
            PromptSegment::Media {
                mime_type: "image/jpeg".into(),
                data: vec![1, 2, 3],
            },
            PromptSegment::UserText("task".into()),
        ];
        let parts = split_segments(&segments);
        assert_eq!(parts.system, vec!["sys"]);
        assert_eq!(parts.user, vec!["task"]);
        assert_eq!(parts.media, vec![("image/jpeg", &[1u8, 2, 3][..])]);
    }

    #[test]
    fn document_context_goes_to_user_turn() {
        let segments = vec![
            PromptSegment::Instruction("sys".into()),
            PromptSegment::DocumentContext("\nDOCUMENT (PDF):\nx\n".into()),
        ];
        let parts = split_segments(&segments);
        assert_eq!(parts.user.len(), 1);
        assert!(parts.media.is_empty());
        assert_eq!(build_messages(&segments).len(), 2);
    }

    #[test]
    fn options_follow_config() {
        let config = RelayConfig::builder()
            .backend(crate::config::ModelBackend::Provider)
            .temperature(0.3)
            .max_output_tokens(1024)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.3));
        assert_eq!(opts.max_tokens, Some(1024));

        let defaults = build_options(&RelayConfig::default());
        assert_eq!(defaults.temperature, None);
        assert_eq!(defaults.max_tokens, None);
    }
}
