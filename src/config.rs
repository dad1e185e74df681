//! Configuration types for the script relay.
//!
//! All relay behaviour is controlled through [`RelayConfig`], built via its
//! [`RelayConfigBuilder`]. One config is created at startup and shared by
//! every request; nothing in it changes while the server runs.
//!
//! The fixed system instruction is intentionally *not* part of the config:
//! it lives in [`crate::prompts`] as a static constant.

use crate::error::ScriptGenError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default Gemini REST base URL (API-key auth).
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini model identifier.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Configuration for the script relay.
///
/// Built via [`RelayConfig::builder()`] or using [`RelayConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_scriptgen::{RelayConfig, SeparatorPolicy};
///
/// let config = RelayConfig::builder()
///     .model("gemini-2.0-flash")
///     .api_key("AIza...")
///     .separator_policy(SeparatorPolicy::DropExisting)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct RelayConfig {
    /// Which model transport to use. Default: [`ModelBackend::Gemini`].
    pub backend: ModelBackend,

    /// Model identifier. Default: `gemini-2.0-flash`.
    ///
    /// For the Gemini backend this is either a bare model name
    /// (`gemini-2.0-flash`) or a full resource name
    /// (`projects/<p>/locations/<l>/endpoints/<id>`) for tuned Vertex AI
    /// endpoints. For the provider backend it is passed to
    /// `ProviderFactory::create_llm_provider`.
    pub model: String,

    /// REST base URL for the Gemini backend. Default: [`DEFAULT_API_BASE`].
    ///
    /// Vertex AI uses `https://<location>-aiplatform.googleapis.com/v1`.
    pub api_base: String,

    /// Gemini API key, sent as the `key` query parameter.
    pub api_key: Option<String>,

    /// OAuth access token, sent as `Authorization: Bearer`. Takes precedence
    /// over `api_key` (Vertex AI does not accept API keys on endpoints).
    pub access_token: Option<String>,

    /// Provider name for [`ModelBackend::Provider`] (e.g. "openai", "ollama").
    /// If None, the provider is auto-detected from the environment.
    pub provider_name: Option<String>,

    /// Sampling temperature. If None, the model default is used.
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate. If None, the model default is used.
    pub max_output_tokens: Option<usize>,

    /// Retry attempts when opening the upstream stream fails transiently. Default: 2.
    ///
    /// Only the initial call is retried. Once a fragment has arrived the
    /// reply is partly consumed and a retry would duplicate text.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// TCP connect timeout for the upstream call, in seconds. Default: 30.
    pub connect_timeout_secs: u64,

    /// Maximum silence between two stream fragments, in seconds. Default: 120.
    ///
    /// Long scripts can take minutes in total, so there is no overall request
    /// deadline, only an idle one.
    pub stream_idle_timeout_secs: u64,

    /// Largest accepted request body in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Which candidate of a multi-candidate fragment is read. Default: first only.
    pub candidate_policy: CandidatePolicy,

    /// How spreadsheet cells holding `0` / `FALSE` render. Default: [`FalsyCells::Preserve`].
    pub falsy_cells: FalsyCells,

    /// What to do with an alignment row the model already emitted. Default: [`SeparatorPolicy::AlwaysInsert`].
    pub separator_policy: SeparatorPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            access_token: None,
            provider_name: None,
            temperature: None,
            max_output_tokens: None,
            max_retries: 2,
            retry_backoff_ms: 500,
            connect_timeout_secs: 30,
            stream_idle_timeout_secs: 120,
            max_upload_bytes: 50 * 1024 * 1024,
            candidate_policy: CandidatePolicy::default(),
            falsy_cells: FalsyCells::default(),
            separator_policy: SeparatorPolicy::default(),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("backend", &self.backend)
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("provider_name", &self.provider_name)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("max_retries", &self.max_retries)
            .field("stream_idle_timeout_secs", &self.stream_idle_timeout_secs)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("candidate_policy", &self.candidate_policy)
            .field("falsy_cells", &self.falsy_cells)
            .field("separator_policy", &self.separator_policy)
            .finish()
    }
}

impl RelayConfig {
    /// Create a new builder for `RelayConfig`.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn backend(mut self, backend: ModelBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = Some(n);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn stream_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stream_idle_timeout_secs = secs;
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn candidate_policy(mut self, policy: CandidatePolicy) -> Self {
        self.config.candidate_policy = policy;
        self
    }

    pub fn falsy_cells(mut self, policy: FalsyCells) -> Self {
        self.config.falsy_cells = policy;
        self
    }

    pub fn separator_policy(mut self, policy: SeparatorPolicy) -> Self {
        self.config.separator_policy = policy;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RelayConfig, ScriptGenError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ScriptGenError::InvalidConfig("Model must not be empty".into()));
        }
        if c.backend == ModelBackend::Gemini
            && !(c.api_base.starts_with("http://") || c.api_base.starts_with("https://"))
        {
            return Err(ScriptGenError::InvalidConfig(format!(
                "API base must be an HTTP(S) URL, got '{}'",
                c.api_base
            )));
        }
        if c.stream_idle_timeout_secs == 0 {
            return Err(ScriptGenError::InvalidConfig(
                "Stream idle timeout must be ≥ 1s".into(),
            ));
        }
        if c.max_upload_bytes == 0 {
            return Err(ScriptGenError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Model transport used for the upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ModelBackend {
    /// Gemini / Vertex AI `streamGenerateContent` over SSE. (default)
    #[default]
    Gemini,
    /// Any `edgequake-llm` provider; the reply arrives as a single fragment.
    Provider,
}

impl fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelBackend::Gemini => f.write_str("gemini"),
            ModelBackend::Provider => f.write_str("provider"),
        }
    }
}

/// Which candidate of a response fragment contributes text.
///
/// The relay asks for a single completion, so only one policy exists. It is
/// named so that reading a different candidate is a config change rather
/// than a hunt for a hard-coded `[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CandidatePolicy {
    /// Read the first candidate; ignore any others in the same fragment.
    #[default]
    FirstOnly,
}

/// Rendering of falsy spreadsheet values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FalsyCells {
    /// Render `0`, `0.0` and `FALSE` as literal text; only missing cells are blank. (default)
    #[default]
    Preserve,
    /// Render every falsy value as an empty cell, matching truthiness-based
    /// spreadsheet dumps. Loses legitimate zeroes.
    Blank,
}

/// Handling of an alignment row the model already emitted after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeparatorPolicy {
    /// Always insert the fixed separator and render every later group,
    /// including one made of `:---` cells. (default)
    #[default]
    AlwaysInsert,
    /// Insert the fixed separator and drop data rows whose three cells are
    /// all alignment markers.
    DropExisting,
}
