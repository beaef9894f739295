//! LLM interpretation: turn extracted plan text into structured workouts.
//!
//! This module owns the only network I/O in the pipeline. It is intentionally
//! thin around the call itself — all prompt engineering lives in
//! [`crate::prompts`] so it can be changed without touching retry or
//! error-handling logic here.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent. Exponential
//! backoff (`retry_backoff_ms * 2^(attempt-1)`) avoids hammering a recovering
//! endpoint: with 500 ms base and 3 retries the wait sequence is
//! 500 ms → 1 s → 2 s. Every attempt is additionally capped by
//! `api_timeout_secs` so a hung connection cannot stall the batch.
//!
//! ## Response handling
//!
//! The model's answer is untrusted text. It is persisted to the debug
//! directory BEFORE any parse attempt, then parsed in two explicit steps:
//! the whole response as a JSON array, or failing that the contents of the
//! first json-tagged code fence. Both failing is fatal — a response that
//! cannot be parsed must never turn into a silently empty workout batch.

use crate::config::{PipelineConfig, WeekSelection};
use crate::error::Plan2FitError;
use crate::prompts::{self, build_extraction_prompt, SYSTEM_PROMPT};
use crate::workout::Workout;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Result of a successful interpretation.
pub struct Interpreted {
    /// Validated workouts, in plan order.
    pub workouts: Vec<Workout>,
    /// Where the raw model response was persisted.
    pub raw_path: PathBuf,
}

/// Interpret extracted plan text into validated workouts.
///
/// Filters the text to the configured weeks, sends one chat request, persists
/// the raw response under `debug_dir`, then parses and validates. Any parse
/// or validation failure is fatal and names the persisted raw artifact.
pub async fn interpret(
    provider: &Arc<dyn LLMProvider>,
    plan_text: &str,
    config: &PipelineConfig,
) -> Result<Interpreted, Plan2FitError> {
    let selected = filter_weeks(plan_text, &config.week_keyword, config.weeks);
    if selected.len() < plan_text.len() {
        debug!(
            "Week filter kept {} of {} chars",
            selected.len(),
            plan_text.len()
        );
    }

    let format_spec = load_spec_doc(&config.format_spec_path, prompts::FORMAT_SPEC)?;
    let mapping_guide = load_spec_doc(&config.mapping_spec_path, prompts::MAPPING_GUIDE)?;

    let prompt = build_extraction_prompt(&format_spec, &mapping_guide, &selected, config.weeks);
    let messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(&prompt),
    ];

    let raw = call_llm(provider, &messages, config).await?;

    // Persist the raw response before parsing, regardless of parse outcome,
    // so a bad answer stays diagnosable.
    let raw_path = config.paths.debug_dir.join("llm_raw_output.txt");
    if let Some(parent) = raw_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Plan2FitError::OutputWriteFailed {
                path: raw_path.clone(),
                source: e,
            })?;
    }
    tokio::fs::write(&raw_path, &raw)
        .await
        .map_err(|e| Plan2FitError::OutputWriteFailed {
            path: raw_path.clone(),
            source: e,
        })?;

    let workouts = match parse_workouts(&raw) {
        Ok(workouts) => workouts,
        Err(detail) => {
            return Err(Plan2FitError::InterpretationFailed { detail, raw_path });
        }
    };

    for workout in &workouts {
        workout.validate()?;
    }

    info!("Interpreted {} workouts", workouts.len());
    Ok(Interpreted { workouts, raw_path })
}

/// Read an override spec document, or fall back to the embedded one.
fn load_spec_doc(
    override_path: &Option<PathBuf>,
    embedded: &'static str,
) -> Result<Cow<'static, str>, Plan2FitError> {
    match override_path {
        Some(path) => std::fs::read_to_string(path)
            .map(Cow::Owned)
            .map_err(|_| Plan2FitError::FileNotFound { path: path.clone() }),
        None => Ok(Cow::Borrowed(embedded)),
    }
}

/// Drive the chat call with per-attempt timeout and exponential backoff.
async fn call_llm(
    provider: &Arc<dyn LLMProvider>,
    messages: &[ChatMessage],
    config: &PipelineConfig,
) -> Result<String, Plan2FitError> {
    let start = Instant::now();
    let options = build_options(config);
    let attempt_cap = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<String> = None;
    let mut all_timeouts = true;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_delay_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Interpretation retry {}/{} after {}ms",
                attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(attempt_cap, provider.chat(messages, Some(&options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "Interpretation: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                return Ok(response.content);
            }
            Ok(Err(e)) => {
                let err_msg = format!("{}", e);
                warn!("Interpretation attempt {} failed — {}", attempt + 1, err_msg);
                all_timeouts = false;
                last_err = Some(err_msg);
            }
            Err(_elapsed) => {
                warn!(
                    "Interpretation attempt {} timed out after {}s",
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(format!("timed out after {}s", config.api_timeout_secs));
            }
        }
    }

    if all_timeouts {
        return Err(Plan2FitError::LlmTimeout {
            secs: config.api_timeout_secs,
        });
    }

    Err(Plan2FitError::LlmFailed {
        retries: config.max_retries,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Backoff before retry `attempt` (1-based): `base * 2^(attempt-1)`,
/// saturating — a huge retry cap must not overflow the multiplication.
fn backoff_delay_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

// ── Week filter ──────────────────────────────────────────────────────────

/// Cut the plan text down to the selected weeks.
///
/// Looks for the `## <keyword> <first>` heading (case-insensitive, any
/// heading level) and the heading one past the last selected week. No start
/// match ⇒ the whole text: a missing marker must not silently drop training.
pub fn filter_weeks(text: &str, keyword: &str, weeks: WeekSelection) -> String {
    let Some((first, stop)) = weeks.bounds() else {
        return text.to_string();
    };

    let kw = regex::escape(keyword);
    let pattern = format!(
        r"(?si)(#+\s*{kw}\s*{first}\b.*?)(#+\s*{kw}\s*{stop}\b|$)"
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("Week filter regex failed to compile ({}), using full text", e);
            return text.to_string();
        }
    };

    match re.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim().to_string(),
        None => {
            warn!(
                "Week heading '{} {}' not found, using full plan text",
                keyword, first
            );
            text.to_string()
        }
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)```").unwrap());

/// Parse the model response into workouts.
///
/// Two explicit attempts: the trimmed response as a JSON array, then the
/// contents of the first ```json fence. The error string reports both
/// failures so the caller's diagnostic is complete.
pub fn parse_workouts(raw: &str) -> Result<Vec<Workout>, String> {
    let direct_err = match serde_json::from_str::<Vec<Workout>>(raw.trim()) {
        Ok(workouts) => return Ok(workouts),
        Err(e) => e,
    };

    match RE_JSON_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(fenced) => serde_json::from_str::<Vec<Workout>>(fenced.as_str().trim())
            .map_err(|e| format!("direct parse: {direct_err}; fenced parse: {e}")),
        None => Err(format!(
            "direct parse: {direct_err}; no ```json fence in response"
        )),
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, Plan2FitError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Plan2FitError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed and
///    configured the provider entirely; we use it as-is. Useful in tests or
///    when the caller needs custom middleware.
///
/// 2. **Named provider + model** (`config.provider_name`) — reads the
///    corresponding API key (`OPENAI_API_KEY`, etc.) from the environment.
///
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`) —
///    a provider and model chosen at the execution-environment level.
///
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — the factory
///    scans all known API key variables and picks the first available
///    provider, preferring OpenAI when its key is present.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, Plan2FitError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4o");
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4o");
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Plan2FitError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
