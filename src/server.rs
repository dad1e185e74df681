//! HTTP surface: `GET /` and `POST /chat`.
//!
//! The router is a thin shell around [`crate::relay::generate_reply`]. The
//! model handle and config live in [`AppState`], built once at startup and
//! cloned (two `Arc` bumps) into every request.
//!
//! | Route | Body | Reply |
//! |-------|------|-------|
//! | `GET /` | none | `{"status": "running"}` |
//! | `POST /chat` | multipart `prompt`, `file` | `{"reply": "..."}` |
//!
//! Failures reply `{"error": "..."}` with a status from [`status_for`].

use crate::config::RelayConfig;
use crate::error::ScriptGenError;
use crate::model::GenerativeModel;
use crate::output::ChatReply;
use crate::pipeline::document::Upload;
use crate::relay::generate_reply;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Origins of the bundled web front-end's dev server.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://127.0.0.1:5173"];

/// Listener and CORS settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind. Default: `127.0.0.1:8000`.
    pub bind: SocketAddr,
    /// Origins allowed to call the API with credentials.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<dyn GenerativeModel>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(model: Arc<dyn GenerativeModel>, config: RelayConfig) -> Self {
        Self {
            model,
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
///
/// # Errors
/// [`ScriptGenError::InvalidConfig`] if an allowed origin is not a valid
/// header value.
pub fn router(state: AppState, server: &ServerConfig) -> Result<Router, ScriptGenError> {
    let cors = cors_layer(&server.allowed_origins)?;
    let body_limit = state.config.max_upload_bytes;

    Ok(Router::new()
        .route("/", get(health))
        .route("/chat", post(chat))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, ScriptGenError> {
    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o.trim())
                .map_err(|_| ScriptGenError::InvalidConfig(format!("Invalid CORS origin '{o}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "running" }))
}

async fn chat(State(state): State<AppState>, multipart: Multipart) -> Result<Json<ChatReply>, ApiError> {
    let (prompt, upload) = read_form(multipart).await?;
    info!(
        "POST /chat: {} prompt chars, file={}",
        prompt.chars().count(),
        upload.as_ref().map(|u| u.filename.as_str()).unwrap_or("-")
    );

    let output = generate_reply(state.model.as_ref(), &state.config, &prompt, upload).await?;
    Ok(Json(output.reply))
}

/// Read the `prompt` and `file` fields; anything else is ignored.
///
/// A `file` field with neither a filename nor content counts as no upload,
/// which is what browsers send for an empty file input.
async fn read_form(mut multipart: Multipart) -> Result<(String, Option<Upload>), ApiError> {
    let mut prompt = String::new();
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "prompt" => prompt = field.text().await?,
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?.to_vec();
                if filename.is_empty() && bytes.is_empty() {
                    continue;
                }
                upload = Some(Upload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            _ => {}
        }
    }
    Ok((prompt, upload))
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// HTTP status for a relay error.
pub fn status_for(err: &ScriptGenError) -> StatusCode {
    match err {
        ScriptGenError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ScriptGenError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        ScriptGenError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ScriptGenError::Extraction { .. }
        | ScriptGenError::ModelNotConfigured { .. }
        | ScriptGenError::InvalidConfig(_)
        | ScriptGenError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// An error on its way to becoming a JSON response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<ScriptGenError> for ApiError {
    fn from(err: ScriptGenError) -> Self {
        Self {
            status: status_for(&err),
            message: err.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            message: ScriptGenError::InvalidRequest(err.body_text()).to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status, self.message);
        } else {
            info!("{} {}", self.status, self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
