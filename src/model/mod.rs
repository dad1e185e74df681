//! Generative model backends.
//!
//! The relay only needs one capability from a model: take an ordered list of
//! [`PromptSegment`]s and return a stream of [`ResponseFragment`]s. That
//! capability is the [`GenerativeModel`] trait. One instance is built at
//! startup by [`build_model`] and shared by every request through an `Arc`.
//!
//! | Backend | Transport | Fragments |
//! |---------|-----------|-----------|
//! | [`gemini::GeminiModel`] | `streamGenerateContent` over SSE | one per SSE event |
//! | [`provider::ProviderModel`] | any `edgequake-llm` provider | one per reply |

pub mod gemini;
pub mod provider;

use crate::config::{ModelBackend, RelayConfig};
use crate::error::ScriptGenError;
use crate::pipeline::assemble::PromptSegment;
use crate::pipeline::collect::ResponseFragment;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::info;

pub use gemini::GeminiModel;
pub use provider::ProviderModel;

/// A boxed stream of reply fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<ResponseFragment, ScriptGenError>> + Send>>;

/// A streaming text/multimodal model.
///
/// Implementations hold no per-request state and are safe to call from many
/// requests at once.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Human-readable backend/model name for logs.
    fn name(&self) -> &str;

    /// Open a reply stream for `segments`.
    ///
    /// Errors returned here happen before any fragment is produced and may
    /// be retried; errors inside the stream may not.
    async fn stream_generate(&self, segments: &[PromptSegment]) -> Result<FragmentStream, ScriptGenError>;
}

/// Construct the backend selected by `config.backend`.
pub fn build_model(config: &RelayConfig) -> Result<Arc<dyn GenerativeModel>, ScriptGenError> {
    let model: Arc<dyn GenerativeModel> = match config.backend {
        ModelBackend::Gemini => Arc::new(GeminiModel::from_config(config)?),
        ModelBackend::Provider => Arc::new(ProviderModel::from_config(config)?),
    };
    info!("Model backend ready: {}", model.name());
    Ok(model)
}
