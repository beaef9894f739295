//! # plan2fit
//!
//! Convert PDF running-training plans into Garmin `.fit` workout files.
//!
//! ## Why this crate?
//!
//! Coaches hand out training plans as PDFs; watches want structured FIT
//! workouts. Retyping every session into Garmin Connect is slow and
//! error-prone. This crate extracts the plan text, lets an LLM interpret the
//! free-form session descriptions into a strict workout schema, renders each
//! workout as a FIT CSV grid, and drives Garmin's FitCSVTool to produce the
//! binary `.fit` files a watch imports directly.
//!
//! ## Pipeline Overview
//!
//! ```text
//! plan PDF(s)
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Extract    PDF → Markdown-like text (CPU-bound, spawn_blocking)
//!  ├─ 3. Interpret  LLM call with timeout/retry → validated workout JSON
//!  ├─ 4. Export     one fixed-grid FIT CSV per workout
//!  └─ 5. Convert    java -jar FitCSVTool.jar -c per CSV (bounded parallel)
//! ```
//!
//! Stages communicate only through files in a configured directory layout, so
//! each stage can be re-run in isolation — the usual workflow when a model
//! response needs a prompt tweak.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plan2fit::{PipelineConfig, WeekSelection};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = PipelineConfig::builder()
//!         .weeks(WeekSelection::Range(3, 4))
//!         .build()?;
//!     let summary = plan2fit::run(&config).await?;
//!     println!(
//!         "{} workouts, {} fit files",
//!         summary.workouts,
//!         summary.converted.succeeded.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `plan2fit` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! plan2fit = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod run;
pub mod workout;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder, PipelinePaths, Settings, WeekSelection};
pub use error::Plan2FitError;
pub use pipeline::convert::ConvertReport;
pub use run::{
    convert_stage, export_stage, extract_stage, ingest, interpret_stage, run, ExportSummary,
    ExtractSummary, RunSummary,
};
pub use workout::{RepeatStep, Step, TimedStep, Workout};
