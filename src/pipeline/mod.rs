//! Pipeline stages for turning an upload and a prompt into a script table.
//!
//! Each submodule implements one transformation step and is testable on its
//! own; only the model call between `assemble` and `collect` does network I/O,
//! and it lives in [`crate::model`].
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ assemble ──▶ (model) ──▶ collect ──▶ postprocess
//! (bytes→text)  (segments)   (stream)    (concat)    (sanitize, table)
//! ```
//!
//! 1. [`document`] / [`extract`]: pick a strategy from the file extension
//!    and run it; [`pdf`] and [`office`] hold the heavier extractors, which
//!    run in `spawn_blocking`
//! 2. [`assemble`]: order instruction, document and task into segments
//! 3. [`collect`]: drain the fragment stream into one string
//! 4. [`postprocess`]: strip emphasis noise and re-flow the table

pub mod assemble;
pub mod collect;
pub mod document;
pub mod extract;
pub mod office;
pub mod pdf;
pub mod postprocess;
