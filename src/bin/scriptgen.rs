//! Server binary for edgequake-scriptgen.
//!
//! A thin shim over the library crate that maps CLI flags (each backed by an
//! environment variable) to `RelayConfig` + `ServerConfig`, builds the model
//! once and serves the router until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_scriptgen::server::DEFAULT_ALLOWED_ORIGINS;
use edgequake_scriptgen::{
    build_model, router, AppState, FalsyCells, ModelBackend, RelayConfig, SeparatorPolicy, ServerConfig,
};
use std::io;
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const AFTER_HELP: &str = "\
EXAMPLES:
  # Gemini with an API key
  GEMINI_API_KEY=AIza... scriptgen

  # Tuned model on a Vertex AI endpoint
  scriptgen --api-base https://us-central1-aiplatform.googleapis.com/v1 \\
            --model projects/123/locations/us-central1/endpoints/456 \\
            --access-token \"$(gcloud auth print-access-token)\"

  # Any edgequake-llm provider
  OPENAI_API_KEY=sk-... scriptgen --backend provider --provider openai --model gpt-4.1-mini

ENDPOINTS:
  GET  /       health probe
  POST /chat   multipart: prompt (text), file (optional upload)";

#[derive(Parser, Debug)]
#[command(
    name = "scriptgen",
    version,
    about = "Serve a prompt + document relay that returns video-script tables",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "SCRIPTGEN_BIND", default_value = "127.0.0.1:8000")]
    bind: SocketAddr,

    /// Allowed CORS origins (comma-separated).
    #[arg(
        long = "allowed-origin",
        env = "SCRIPTGEN_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = DEFAULT_ALLOWED_ORIGINS.map(String::from)
    )]
    allowed_origins: Vec<String>,

    /// Model backend: gemini or provider.
    #[arg(long, env = "SCRIPTGEN_BACKEND", value_enum, default_value = "gemini")]
    backend: BackendArg,

    /// Model ID, or a full `projects/…/endpoints/…` resource name.
    #[arg(long, env = "SCRIPTGEN_MODEL", default_value = edgequake_scriptgen::config::DEFAULT_MODEL)]
    model: String,

    /// Gemini REST base URL.
    #[arg(long, env = "GEMINI_API_BASE", default_value = edgequake_scriptgen::config::DEFAULT_API_BASE)]
    api_base: String,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OAuth access token (Vertex AI). Takes precedence over the API key.
    #[arg(long, env = "VERTEX_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// edgequake-llm provider for `--backend provider` (openai, anthropic, ollama, …).
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0). Model default when unset.
    #[arg(long, env = "SCRIPTGEN_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max output tokens. Model default when unset.
    #[arg(long, env = "SCRIPTGEN_MAX_OUTPUT_TOKENS")]
    max_output_tokens: Option<usize>,

    /// Retries when opening the model stream fails transiently.
    #[arg(long, env = "SCRIPTGEN_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Seconds without a stream fragment before the request fails.
    #[arg(long, env = "SCRIPTGEN_STREAM_IDLE_TIMEOUT", default_value_t = 120)]
    stream_idle_timeout: u64,

    /// Upstream TCP connect timeout in seconds.
    #[arg(long, env = "SCRIPTGEN_CONNECT_TIMEOUT", default_value_t = 30)]
    connect_timeout: u64,

    /// Largest accepted request body, in MiB.
    #[arg(long, env = "SCRIPTGEN_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Render 0 / FALSE spreadsheet cells as empty.
    #[arg(long, env = "SCRIPTGEN_BLANK_FALSY_CELLS")]
    blank_falsy_cells: bool,

    /// Drop alignment rows the model already emitted after the header.
    #[arg(long, env = "SCRIPTGEN_DROP_EXISTING_SEPARATOR")]
    drop_existing_separator: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCRIPTGEN_VERBOSE")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, env = "SCRIPTGEN_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum BackendArg {
    Gemini,
    Provider,
}

impl From<BackendArg> for ModelBackend {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Gemini => ModelBackend::Gemini,
            BackendArg::Provider => ModelBackend::Provider,
        }
    }
}

fn relay_config(cli: &Cli) -> Result<RelayConfig> {
    let mut builder = RelayConfig::builder()
        .backend(cli.backend.clone().into())
        .model(&cli.model)
        .api_base(&cli.api_base)
        .max_retries(cli.max_retries)
        .stream_idle_timeout_secs(cli.stream_idle_timeout)
        .connect_timeout_secs(cli.connect_timeout)
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024));

    if let Some(key) = &cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(token) = &cli.access_token {
        builder = builder.access_token(token);
    }
    if let Some(provider) = &cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_output_tokens {
        builder = builder.max_output_tokens(n);
    }
    if cli.blank_falsy_cells {
        builder = builder.falsy_cells(FalsyCells::Blank);
    }
    if cli.drop_existing_separator {
        builder = builder.separator_policy(SeparatorPolicy::DropExisting);
    }

    builder.build().context("Invalid configuration")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Config + model (built once, shared by every request) ─────────────
    let config = relay_config(&cli)?;
    info!("{:?}", config);
    let model = build_model(&config).context("Failed to initialise the model backend")?;

    let server = ServerConfig {
        bind: cli.bind,
        allowed_origins: cli.allowed_origins.clone(),
    };
    let app = router(AppState::new(model, config), &server).context("Failed to build router")?;

    // ── Serve ────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", server.bind))?;

    if !cli.quiet {
        eprintln!(
            "{} listening on {}  {}",
            bold("scriptgen"),
            server.bind,
            dim(&format!("origins: {}", server.allowed_origins.join(", ")))
        );
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}
