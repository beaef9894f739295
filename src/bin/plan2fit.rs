//! CLI binary for plan2fit.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints per-stage results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use plan2fit::{PipelineConfig, Settings, WeekSelection};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full pipeline over the default data/ layout
  plan2fit run

  # Pull a plan in first (local file or URL)
  plan2fit ingest https://coach.example.com/plans/marathon.pdf
  plan2fit run

  # Only weeks 3 and 4, Portuguese plan headings
  plan2fit --weeks 3-4 --week-keyword semana run

  # Re-run a single stage after fixing its inputs
  plan2fit interpret
  plan2fit export
  plan2fit convert

  # Use a specific model and provider
  plan2fit --model gpt-4o --provider openai interpret

  # Drive a different plan directory via a settings file
  plan2fit --settings plans/marathon.toml run

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID

SETUP:
  1. Set an API key:               export OPENAI_API_KEY=sk-...
  2. Get Garmin's converter:       download FitCSVTool.jar from the FIT SDK
                                   and place it at tools/FitCSVTool.jar
  3. Drop plan PDFs into data/raw/ (or use `plan2fit ingest <pdf|url>`)
  4. Run:                          plan2fit run
"#;

/// Convert PDF running-training plans into Garmin .fit workout files.
#[derive(Parser, Debug)]
#[command(
    name = "plan2fit",
    version,
    about = "Convert PDF running plans into Garmin .fit workout files",
    long_about = "Convert PDF running-training plans into Garmin .fit workout files. \
An LLM interprets the extracted plan text into structured workouts, which are \
rendered as FIT CSV and converted to binary .fit via Garmin's FitCSVTool.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML settings file describing the plan directory layout.
    #[arg(long, env = "PLAN2FIT_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    /// Base directory for all stage artifacts (raw/, processed/, structured/).
    #[arg(long, env = "PLAN2FIT_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4o).
    #[arg(long, env = "EDGEQUAKE_MODEL", global = true)]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER", global = true)]
    provider: Option<String>,

    /// Weeks to interpret: all, 3, or 3-4.
    #[arg(long, env = "PLAN2FIT_WEEKS", default_value = "all", global = true)]
    weeks: String,

    /// Keyword of the week headings in the plan (e.g. semana).
    #[arg(long, env = "PLAN2FIT_WEEK_KEYWORD", global = true)]
    week_keyword: Option<String>,

    /// Path to FitCSVTool.jar.
    #[arg(long, env = "PLAN2FIT_FIT_TOOL", global = true)]
    fit_tool: Option<PathBuf>,

    /// Java executable used to run the converter.
    #[arg(long, env = "PLAN2FIT_JAVA_BIN", global = true)]
    java_bin: Option<String>,

    /// Max LLM output tokens for the interpretation call.
    #[arg(long, env = "PLAN2FIT_MAX_TOKENS", global = true)]
    max_tokens: Option<usize>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PLAN2FIT_TEMPERATURE", global = true)]
    temperature: Option<f32>,

    /// Retries on a transient LLM failure.
    #[arg(long, env = "PLAN2FIT_MAX_RETRIES", global = true)]
    max_retries: Option<u32>,

    /// Per-LLM-call timeout in seconds.
    #[arg(long, env = "PLAN2FIT_API_TIMEOUT", global = true)]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PLAN2FIT_DOWNLOAD_TIMEOUT", global = true)]
    download_timeout: Option<u64>,

    /// Concurrent FitCSVTool processes.
    #[arg(short, long, env = "PLAN2FIT_CONCURRENCY", global = true)]
    concurrency: Option<usize>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PLAN2FIT_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PLAN2FIT_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline: extract, interpret, export, convert.
    Run,
    /// Copy a plan PDF (local path or URL) into the raw directory.
    Ingest {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
    },
    /// Extract text from every PDF in the raw directory.
    Extract,
    /// Interpret extracted text into workouts.json via the LLM.
    Interpret,
    /// Export workouts.json as one FIT CSV per workout.
    Export,
    /// Convert every CSV to a binary .fit via FitCSVTool.
    Convert,
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
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    match cli.command {
        Command::Run => {
            let spinner = spinner(&cli, "Running pipeline…");
            let summary = plan2fit::run(&config).await;
            finish(spinner);
            let summary = summary.context("Pipeline failed")?;

            if !cli.quiet {
                eprintln!(
                    "{} {} plan(s) extracted, {} workout(s) interpreted",
                    green("✔"),
                    bold(&summary.extracted.markdown_files.len().to_string()),
                    bold(&summary.workouts.to_string()),
                );
            }
            report_conversions(&cli, &summary.converted);
            exit_on_failures(&summary.converted);
        }
        Command::Ingest { input } => {
            let dest = plan2fit::ingest(&config, &input)
                .await
                .context("Ingest failed")?;
            if !cli.quiet {
                eprintln!("{} {}", green("✔"), bold(&dest.display().to_string()));
            }
        }
        Command::Extract => {
            let summary = plan2fit::extract_stage(&config)
                .await
                .context("Extraction failed")?;
            if !cli.quiet {
                for md in &summary.markdown_files {
                    eprintln!("  {} {}", green("✓"), md.display());
                }
                eprintln!(
                    "{} {} plan(s) extracted",
                    green("✔"),
                    bold(&summary.markdown_files.len().to_string())
                );
            }
        }
        Command::Interpret => {
            let spinner = spinner(&cli, "Interpreting plan…");
            let workouts = plan2fit::interpret_stage(&config).await;
            finish(spinner);
            let workouts = workouts.context("Interpretation failed")?;

            if !cli.quiet {
                for w in &workouts {
                    eprintln!(
                        "  {} {}  {}",
                        green("✓"),
                        w.wkt_name,
                        dim(&format!("{} steps", w.steps.len()))
                    );
                }
                eprintln!(
                    "{} {} workout(s) interpreted",
                    green("✔"),
                    bold(&workouts.len().to_string())
                );
            }
        }
        Command::Export => {
            let summary = plan2fit::export_stage(&config).context("Export failed")?;
            if !cli.quiet {
                for csv in &summary.csv_files {
                    eprintln!("  {} {}", green("✓"), csv.display());
                }
                eprintln!(
                    "{} {} CSV artifact(s) exported",
                    green("✔"),
                    bold(&summary.csv_files.len().to_string())
                );
            }
        }
        Command::Convert => {
            let spinner = spinner(&cli, "Converting…");
            let report = plan2fit::convert_stage(&config).await;
            finish(spinner);
            let report = report.context("Conversion failed")?;

            report_conversions(&cli, &report);
            exit_on_failures(&report);
        }
    }

    Ok(())
}

/// Map CLI args (and an optional settings file) to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder();

    if let Some(ref path) = cli.settings {
        let settings = Settings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        builder = builder.settings(&settings);
    }

    if let Some(ref dir) = cli.data_dir {
        builder = builder.paths(plan2fit::PipelinePaths::under(dir));
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref kw) = cli.week_keyword {
        builder = builder.week_keyword(kw);
    }
    if let Some(ref tool) = cli.fit_tool {
        builder = builder.fit_tool(tool);
    }
    if let Some(ref bin) = cli.java_bin {
        builder = builder.java_bin(bin);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_retries {
        builder = builder.max_retries(n);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(secs) = cli.download_timeout {
        builder = builder.download_timeout_secs(secs);
    }
    if let Some(n) = cli.concurrency {
        builder = builder.convert_concurrency(n);
    }

    builder = builder.weeks(parse_weeks(&cli.weeks)?);

    builder.build().context("Invalid configuration")
}

/// Parse `--weeks` into `WeekSelection`: "all", "3", or "3-4".
fn parse_weeks(s: &str) -> Result<WeekSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(WeekSelection::All);
    }

    if let Some((start, end)) = s.split_once('-') {
        let start: u32 = start.trim().parse().context("Invalid start week in range")?;
        let end: u32 = end.trim().parse().context("Invalid end week in range")?;
        if start > end {
            anyhow::bail!("Invalid week range '{start}-{end}': start must be <= end");
        }
        return Ok(WeekSelection::Range(start, end));
    }

    let week: u32 = s.parse().context("Invalid week number")?;
    Ok(WeekSelection::Single(week))
}

/// Spinner for the long-running stages; `None` in quiet mode.
fn spinner(cli: &Cli, msg: &str) -> Option<ProgressBar> {
    if cli.quiet {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

fn finish(bar: Option<ProgressBar>) {
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

fn report_conversions(cli: &Cli, report: &plan2fit::ConvertReport) {
    if cli.quiet {
        return;
    }
    for fit in &report.succeeded {
        eprintln!("  {} {}", green("✓"), fit.display());
    }
    for (csv, detail) in &report.failed {
        eprintln!("  {} {}  {}", red("✗"), csv.display(), red(detail));
    }

    let total = report.succeeded.len() + report.failed.len();
    if report.failed.is_empty() {
        eprintln!(
            "{} {} file(s) converted",
            green("✔"),
            bold(&report.succeeded.len().to_string())
        );
    } else {
        eprintln!(
            "{} {}/{} files converted  ({} failed)",
            if report.succeeded.is_empty() {
                red("✘")
            } else {
                cyan("⚠")
            },
            bold(&report.succeeded.len().to_string()),
            total,
            red(&report.failed.len().to_string()),
        );
    }
}

/// A partially failed batch exits non-zero without aborting the report.
fn exit_on_failures(report: &plan2fit::ConvertReport) {
    if !report.all_ok() {
        std::process::exit(1);
    }
}
