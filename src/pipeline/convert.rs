//! Binary conversion: run Garmin's FitCSVTool over each exported CSV.
//!
//! The tool ships as a Java jar, so this stage shells out to
//! `java -jar FitCSVTool.jar -c <in.csv> <out.fit>` once per artifact. A
//! failing conversion is recorded and the batch continues; only a missing
//! jar aborts before any work starts, because then every file would fail
//! the same way.
//!
//! Conversions are independent, so they run as a bounded parallel map —
//! JVM startup dominates each invocation and overlapping it pays off even
//! on small batches.

use crate::config::PipelineConfig;
use crate::error::Plan2FitError;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Outcome of one conversion batch.
///
/// Per-file failures are data, not errors: the caller decides whether a
/// partially converted batch is acceptable.
#[derive(Debug, Default)]
pub struct ConvertReport {
    /// Paths of the `.fit` files written.
    pub succeeded: Vec<PathBuf>,
    /// CSVs that failed, with the converter's diagnostic.
    pub failed: Vec<(PathBuf, String)>,
}

impl ConvertReport {
    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Convert every `.csv` in `csv_dir` to a `.fit` in `fit_dir`.
///
/// Returns `FitToolNotFound` if the jar is missing, otherwise a report;
/// an empty input directory yields an empty report.
pub async fn convert_all(config: &PipelineConfig) -> Result<ConvertReport, Plan2FitError> {
    if !config.fit_tool.exists() {
        return Err(Plan2FitError::FitToolNotFound {
            path: config.fit_tool.clone(),
        });
    }

    let fit_dir = &config.paths.fit_dir;
    std::fs::create_dir_all(fit_dir).map_err(|e| Plan2FitError::OutputWriteFailed {
        path: fit_dir.clone(),
        source: e,
    })?;

    let csvs = list_csvs(&config.paths.csv_dir);
    if csvs.is_empty() {
        warn!(
            "No CSV files in {}, nothing to convert",
            config.paths.csv_dir.display()
        );
        return Ok(ConvertReport::default());
    }

    info!(
        "Converting {} CSV file(s) with {} worker(s)",
        csvs.len(),
        config.convert_concurrency
    );

    let results: Vec<(PathBuf, Result<PathBuf, String>)> = stream::iter(csvs)
        .map(|csv| async move {
            let outcome = convert_one(config, &csv).await;
            (csv, outcome)
        })
        .buffer_unordered(config.convert_concurrency)
        .collect()
        .await;

    let mut report = ConvertReport::default();
    for (csv, outcome) in results {
        match outcome {
            Ok(fit) => report.succeeded.push(fit),
            Err(detail) => {
                warn!("Conversion failed for {}: {}", csv.display(), detail);
                report.failed.push((csv, detail));
            }
        }
    }
    report.succeeded.sort();

    info!(
        "Conversion finished: {} ok, {} failed",
        report.succeeded.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Run the converter for one CSV. Errors are returned as strings because
/// they end up in the report, not in the error chain.
async fn convert_one(config: &PipelineConfig, csv: &Path) -> Result<PathBuf, String> {
    let stem = csv
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| format!("invalid file name: {}", csv.display()))?;
    let fit_path = config.paths.fit_dir.join(format!("{stem}.fit"));

    debug!("{} -> {}", csv.display(), fit_path.display());

    let output = Command::new(&config.java_bin)
        .arg("-jar")
        .arg(&config.fit_tool)
        .arg("-c")
        .arg(csv)
        .arg(&fit_path)
        .output()
        .await
        .map_err(|e| format!("failed to spawn {}: {e}", config.java_bin))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        // FitCSVTool writes its diagnostics to stdout.
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(format!("converter exited with {}: {detail}", output.status));
    }

    if !fit_path.exists() {
        return Err(format!(
            "converter reported success but {} was not created",
            fit_path.display()
        ));
    }

    Ok(fit_path)
}

fn list_csvs(csv_dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(csv_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read CSV directory {}: {}", csv_dir.display(), e);
            return Vec::new();
        }
    };

    let mut csvs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();

    csvs.sort();
    csvs
}
