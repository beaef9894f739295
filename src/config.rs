//! Configuration types for the plan-to-FIT pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`] and constructed once at process start. No
//! stage reads ambient global state: every entry point in [`crate::run`]
//! takes the config by reference.
//!
//! The directory layout (where each stage reads and writes its artifacts)
//! lives in [`PipelinePaths`] and can be loaded from a small TOML settings
//! file, so the same binary can drive several plan directories without
//! recompilation.

use crate::error::Plan2FitError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory layout shared by all stages.
///
/// Each stage reads the previous stage's directory and writes its own; the
/// file system is the only channel between stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePaths {
    /// Source PDFs.
    pub raw_dir: PathBuf,
    /// Extracted Markdown-like text, one `.md` per PDF.
    pub processed_dir: PathBuf,
    /// Structured workout JSON (`workouts.json`).
    pub json_dir: PathBuf,
    /// Raw LLM responses, persisted before parsing.
    pub debug_dir: PathBuf,
    /// One FIT CSV per workout.
    pub csv_dir: PathBuf,
    /// Binary `.fit` output.
    pub fit_dir: PathBuf,
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self::under("data")
    }
}

impl PipelinePaths {
    /// Standard layout rooted at `base`: `raw/`, `processed/`,
    /// `structured/{json,debug,csv,fit}/`.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            raw_dir: base.join("raw"),
            processed_dir: base.join("processed"),
            json_dir: base.join("structured/json"),
            debug_dir: base.join("structured/debug"),
            csv_dir: base.join("structured/csv"),
            fit_dir: base.join("structured/fit"),
        }
    }
}

/// Which weeks of the plan the interpreter should extract.
///
/// Plans are delimited by week headings (`## Week 3`, `## Semana 3`, …); the
/// filter selects the slice between the first selected heading and the
/// heading after the last selected week. If the start heading is not found
/// the whole plan is used — a missing marker must not silently drop training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeekSelection {
    /// Interpret the whole plan (default).
    #[default]
    All,
    /// A single week.
    Single(u32),
    /// A contiguous inclusive range, e.g. weeks 3–4.
    Range(u32, u32),
}

impl WeekSelection {
    /// First and one-past-last week numbers, if the selection is bounded.
    pub fn bounds(&self) -> Option<(u32, u32)> {
        match *self {
            WeekSelection::All => None,
            WeekSelection::Single(w) => Some((w, w + 1)),
            WeekSelection::Range(first, last) => Some((first, last.max(first) + 1)),
        }
    }
}

/// Settings-file form of the configuration.
///
/// Only the knobs that vary between plan directories belong here; call-site
/// concerns (retries, timeouts, temperature) stay on the builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PipelinePaths,
    /// Path to FitCSVTool.jar.
    pub fit_tool: Option<PathBuf>,
    /// LLM model identifier.
    pub model: Option<String>,
    /// LLM provider name (e.g. "openai", "azure").
    pub provider: Option<String>,
    /// Week-heading keyword; the original plans use "semana".
    pub week_keyword: Option<String>,
    /// Override for the embedded FIT format specification document.
    pub format_spec: Option<PathBuf>,
    /// Override for the embedded intensity/duration mapping guide.
    pub mapping_spec: Option<PathBuf>,
}

impl Settings {
    /// Parse a TOML settings string.
    pub fn from_toml(toml_str: &str) -> Result<Self, Plan2FitError> {
        toml::from_str(toml_str)
            .map_err(|e| Plan2FitError::InvalidConfig(format!("settings file: {e}")))
    }

    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Plan2FitError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|_| Plan2FitError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        Self::from_toml(&text)
    }
}

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use plan2fit::{PipelineConfig, WeekSelection};
///
/// let config = PipelineConfig::builder()
///     .weeks(WeekSelection::Range(3, 4))
///     .model("gpt-4o")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory layout for all stage artifacts.
    pub paths: PipelinePaths,

    /// LLM model identifier, e.g. "gpt-4o". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "azure").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the interpretation call. Default: 0.4.
    ///
    /// Extraction wants the model faithful to the plan text, but unlike pure
    /// transcription it must rephrase free-form session descriptions into
    /// schema fields, which degrades at temperature 0. 0.4 is the value the
    /// prompt was tuned against.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate. Default: 3900.
    ///
    /// A two-week slice of a plan comes out around 2 500 tokens of JSON.
    /// Setting this too low truncates the array mid-object and the parse
    /// fails with a misleading "EOF while parsing" error.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient LLM failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-LLM-call timeout in seconds. Default: 120.
    ///
    /// The interpretation call is the single slowest, least reliable step of
    /// the pipeline; without a timeout a hung connection stalls the whole
    /// batch indefinitely.
    pub api_timeout_secs: u64,

    /// Download timeout for URL plan inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Week filter applied before interpretation. Default: all weeks.
    pub weeks: WeekSelection,

    /// Keyword of the week headings in the plan text. Default: "week".
    pub week_keyword: String,

    /// Path to FitCSVTool.jar. Default: `tools/FitCSVTool.jar`.
    pub fit_tool: PathBuf,

    /// Java executable used to run the converter. Default: "java".
    pub java_bin: String,

    /// Concurrent converter processes. Default: 4.
    ///
    /// Conversions are independent per file, so a bounded parallel map is
    /// safe; the JVM startup dominates each invocation.
    pub convert_concurrency: usize,

    /// Override file for the embedded FIT format specification document.
    pub format_spec_path: Option<PathBuf>,

    /// Override file for the embedded mapping guide document.
    pub mapping_spec_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PipelinePaths::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.4,
            max_tokens: 3900,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            weeks: WeekSelection::All,
            week_keyword: "week".to_string(),
            fit_tool: PathBuf::from("tools/FitCSVTool.jar"),
            java_bin: "java".to_string(),
            convert_concurrency: 4,
            format_spec_path: None,
            mapping_spec_path: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("paths", &self.paths)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("weeks", &self.weeks)
            .field("week_keyword", &self.week_keyword)
            .field("fit_tool", &self.fit_tool)
            .field("convert_concurrency", &self.convert_concurrency)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn paths(mut self, paths: PipelinePaths) -> Self {
        self.config.paths = paths;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
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

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn weeks(mut self, weeks: WeekSelection) -> Self {
        self.config.weeks = weeks;
        self
    }

    pub fn week_keyword(mut self, kw: impl Into<String>) -> Self {
        self.config.week_keyword = kw.into();
        self
    }

    pub fn fit_tool(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.fit_tool = path.into();
        self
    }

    pub fn java_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.java_bin = bin.into();
        self
    }

    pub fn convert_concurrency(mut self, n: usize) -> Self {
        self.config.convert_concurrency = n.max(1);
        self
    }

    pub fn format_spec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.format_spec_path = Some(path.into());
        self
    }

    pub fn mapping_spec_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.mapping_spec_path = Some(path.into());
        self
    }

    /// Fold a loaded settings file into the builder. Explicit builder calls
    /// made after this override the file.
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.config.paths = settings.paths.clone();
        if let Some(ref tool) = settings.fit_tool {
            self.config.fit_tool = tool.clone();
        }
        if let Some(ref model) = settings.model {
            self.config.model = Some(model.clone());
        }
        if let Some(ref provider) = settings.provider {
            self.config.provider_name = Some(provider.clone());
        }
        if let Some(ref kw) = settings.week_keyword {
            self.config.week_keyword = kw.clone();
        }
        if let Some(ref p) = settings.format_spec {
            self.config.format_spec_path = Some(p.clone());
        }
        if let Some(ref p) = settings.mapping_spec {
            self.config.mapping_spec_path = Some(p.clone());
        }
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Plan2FitError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(Plan2FitError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(Plan2FitError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.week_keyword.trim().is_empty() {
            return Err(Plan2FitError::InvalidConfig(
                "week_keyword must not be empty".into(),
            ));
        }
        if let WeekSelection::Range(first, last) = c.weeks {
            if first > last {
                return Err(Plan2FitError::InvalidConfig(format!(
                    "week range {first}-{last}: first must be ≤ last"
                )));
            }
        }
        Ok(self.config)
    }
}
