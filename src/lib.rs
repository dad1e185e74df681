//! # edgequake-scriptgen
//!
//! Turn a prompt, plus an optional document, into a video-script table
//! written by a generative model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! prompt + upload
//!  │
//!  ├─ 1. Extract   PDF / DOCX / XLSX / PPTX / CSV / TXT → text,
//!  │               PNG / JPEG / MP4 → inline media (spawn_blocking)
//!  ├─ 2. Assemble  instruction → document or media → task
//!  ├─ 3. Model     streamed call (Gemini SSE, or any edgequake-llm provider)
//!  ├─ 4. Collect   concatenate fragment text in arrival order
//!  ├─ 5. Sanitize  drop `###` / `***` / `**`, trim
//!  └─ 6. Table     re-flow pipe cells into a 3-column markdown table
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_scriptgen::{build_model, generate_reply, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let model = build_model(&config)?;
//!     let output = generate_reply(model.as_ref(), &config, "A 30s script about tea", None).await?;
//!     println!("{}", output.reply.reply);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scriptgen` server binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router or the relay in another service:
//! ```toml
//! edgequake-scriptgen = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod relay;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CandidatePolicy, FalsyCells, ModelBackend, RelayConfig, RelayConfigBuilder, SeparatorPolicy};
pub use error::{ScriptGenError, TableShapeMismatch};
pub use model::{build_model, FragmentStream, GenerativeModel};
pub use output::{ChatReply, RelayOutput, RelayStats};
pub use pipeline::assemble::PromptSegment;
pub use pipeline::collect::ResponseFragment;
pub use pipeline::document::{DocumentKind, Upload};
pub use relay::generate_reply;
pub use server::{router, AppState, ServerConfig};
