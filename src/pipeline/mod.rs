//! Pipeline stages for plan-to-FIT conversion.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch the PDF extraction backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ interpret ──▶ export ──▶ convert
//! (URL/path) (PDF→text)  (LLM→JSON)  (FIT CSV)  (FitCSVTool)
//! ```
//!
//! 1. [`input`]     — canonicalise the user-supplied path or URL to a local file
//! 2. [`extract`]   — pull Markdown-like text out of each PDF; runs in
//!    `spawn_blocking` because PDF parsing is CPU-bound
//! 3. [`interpret`] — drive the LLM call with timeout/retry/backoff and parse
//!    the untrusted response; the only stage with network I/O
//! 4. [`export`]    — encode each workout as a fixed-grid FIT CSV artifact
//! 5. [`convert`]   — run the external FitCSVTool per CSV; per-file failures
//!    never abort the batch
//!
//! Stages communicate only through files in the configured directories; no
//! in-memory hand-off and no shared mutable state.

pub mod convert;
pub mod export;
pub mod extract;
pub mod input;
pub mod interpret;
