//! Error types for the plan2fit library.
//!
//! One fatal error enum covers everything that stops a stage: a stage either
//! produces its artifact or returns `Err(Plan2FitError)`. The single
//! deliberate exception is the FIT conversion batch, where a failing file
//! must not abort the remaining files — those failures are collected as data
//! in [`crate::pipeline::convert::ConvertReport`] and reported at the end of
//! the batch instead of being propagated.
//!
//! Interpretation failures always carry the path of the persisted raw model
//! response, so a bad LLM answer stays diagnosable after the process exits.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the plan2fit library.
#[derive(Debug, Error)]
pub enum Plan2FitError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM call failed after every retry.
    #[error("LLM call failed after {retries} retries: {detail}")]
    LlmFailed { retries: u32, detail: String },

    /// A single LLM call exceeded the configured timeout.
    #[error("LLM call timed out after {secs}s\nIncrease --api-timeout or lower --max-tokens.")]
    LlmTimeout { secs: u64 },

    /// The model answered, but the answer is not a workout array — neither
    /// directly nor inside a ```json fence.
    #[error(
        "LLM response is not a parseable workout array: {detail}\n\
         Raw response kept at '{raw_path}' for inspection."
    )]
    InterpretationFailed { detail: String, raw_path: PathBuf },

    /// Parsed workout data violates a structural invariant.
    #[error("Workout '{workout}' violates the schema: {detail}")]
    SchemaViolation { workout: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a stage output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The external FIT converter jar is missing.
    #[error(
        "FIT converter not found at '{path}'\n\
         Download FitCSVTool.jar from the Garmin FIT SDK and point\n\
         `fit_tool` in the settings file (or --fit-tool) at it."
    )]
    FitToolNotFound { path: PathBuf },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or settings-file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpretation_failed_names_the_debug_artifact() {
        let e = Plan2FitError::InterpretationFailed {
            detail: "expected value at line 1 column 1".into(),
            raw_path: PathBuf::from("/tmp/debug/llm_raw_output.txt"),
        };
        let msg = e.to_string();
        assert!(msg.contains("llm_raw_output.txt"), "got: {msg}");
        assert!(msg.contains("line 1 column 1"));
    }

    #[test]
    fn schema_violation_names_the_workout() {
        let e = Plan2FitError::SchemaViolation {
            workout: "S4T2".into(),
            detail: "step indices must be contiguous from 0".into(),
        };
        assert!(e.to_string().contains("S4T2"));
    }

    #[test]
    fn llm_timeout_display() {
        let e = Plan2FitError::LlmTimeout { secs: 90 };
        assert!(e.to_string().contains("90s"));
    }

    #[test]
    fn fit_tool_not_found_mentions_settings_key() {
        let e = Plan2FitError::FitToolNotFound {
            path: PathBuf::from("tools/FitCSVTool.jar"),
        };
        assert!(e.to_string().contains("fit_tool"));
    }
}
