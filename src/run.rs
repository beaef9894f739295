//! Stage orchestration: the library entry points the CLI drives.
//!
//! Each stage function reads its input directory and writes its output
//! directory, nothing else — running a stage twice is idempotent and a stage
//! can be re-run in isolation after fixing its inputs (the usual workflow
//! when a model response needs a prompt tweak). [`run`] chains all stages.
//!
//! Output files are written atomically (temp file + rename in the target
//! directory) so a crash mid-write never leaves a truncated artifact for the
//! next stage to trip over.

use crate::config::PipelineConfig;
use crate::error::Plan2FitError;
use crate::pipeline::convert::{self, ConvertReport};
use crate::pipeline::export::export_workout;
use crate::pipeline::extract::{extract_text, list_plan_pdfs};
use crate::pipeline::input::{resolve_input, ResolvedInput};
use crate::pipeline::interpret::{interpret, resolve_provider};
use crate::workout::Workout;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Name of the structured-workout artifact in `json_dir`.
pub const WORKOUTS_FILE: &str = "workouts.json";

/// Outcome of the extraction stage.
#[derive(Debug, Default)]
pub struct ExtractSummary {
    /// Markdown files written to `processed_dir`, one per source PDF.
    pub markdown_files: Vec<PathBuf>,
}

/// Outcome of the export stage.
#[derive(Debug, Default)]
pub struct ExportSummary {
    /// CSV artifacts written to `csv_dir`.
    pub csv_files: Vec<PathBuf>,
}

/// Outcome of a full pipeline run.
#[derive(Debug)]
pub struct RunSummary {
    pub extracted: ExtractSummary,
    pub workouts: usize,
    pub exported: ExportSummary,
    pub converted: ConvertReport,
}

/// Copy a plan into `raw_dir`, downloading it first if `input` is a URL.
///
/// Returns the path of the PDF inside `raw_dir`.
pub async fn ingest(config: &PipelineConfig, input: &str) -> Result<PathBuf, Plan2FitError> {
    let resolved = resolve_input(input, config.download_timeout_secs).await?;

    let file_name = resolved
        .path()
        .file_name()
        .map(|n| n.to_os_string())
        .ok_or_else(|| Plan2FitError::InvalidInput {
            input: input.to_string(),
        })?;

    ensure_dir(&config.paths.raw_dir)?;
    let dest = config.paths.raw_dir.join(file_name);

    // A local file already inside raw_dir needs no copy. Compare resolved
    // identities, not spellings: copying a file onto itself truncates it
    // before the read, and `./x`, `a/../x` and an absolute path all name
    // the same inode without being string-equal.
    if let ResolvedInput::Local(ref src) = resolved {
        let src_canon = std::fs::canonicalize(src)
            .map_err(|e| Plan2FitError::Internal(format!("resolving {}: {e}", src.display())))?;
        let raw_canon = std::fs::canonicalize(&config.paths.raw_dir).map_err(|e| {
            Plan2FitError::Internal(format!(
                "resolving {}: {e}",
                config.paths.raw_dir.display()
            ))
        })?;
        if src_canon.parent() == Some(raw_canon.as_path()) {
            return Ok(dest);
        }
    }

    std::fs::copy(resolved.path(), &dest).map_err(|e| Plan2FitError::OutputWriteFailed {
        path: dest.clone(),
        source: e,
    })?;
    info!("Ingested plan into {}", dest.display());
    Ok(dest)
}

/// Extraction stage: every PDF in `raw_dir` becomes a `.md` in
/// `processed_dir`.
///
/// Unreadable PDFs still produce an (empty) artifact so the batch layout
/// stays predictable; the interpreter is where empty text becomes an error.
pub async fn extract_stage(config: &PipelineConfig) -> Result<ExtractSummary, Plan2FitError> {
    ensure_dir(&config.paths.processed_dir)?;

    let pdfs = list_plan_pdfs(&config.paths.raw_dir);
    if pdfs.is_empty() {
        warn!("No PDFs in {}", config.paths.raw_dir.display());
        return Ok(ExtractSummary::default());
    }

    let mut summary = ExtractSummary::default();
    for pdf in pdfs {
        let text = extract_text(&pdf).await;
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plan".to_string());
        let md_path = config.paths.processed_dir.join(format!("{stem}.md"));
        write_atomic(&md_path, text.as_bytes())?;
        summary.markdown_files.push(md_path);
    }

    info!("Extracted {} plan(s)", summary.markdown_files.len());
    Ok(summary)
}

/// Interpretation stage: all `.md` files in `processed_dir` become one
/// `workouts.json` in `json_dir`.
///
/// Multiple plan files are concatenated in name order before the single
/// model call, so one plan split across PDFs still interprets as a whole.
pub async fn interpret_stage(config: &PipelineConfig) -> Result<Vec<Workout>, Plan2FitError> {
    let plan_text = read_processed_text(&config.paths.processed_dir)?;
    if plan_text.trim().is_empty() {
        return Err(Plan2FitError::InvalidInput {
            input: format!(
                "no extracted plan text in {}",
                config.paths.processed_dir.display()
            ),
        });
    }

    let provider = resolve_provider(config)?;
    let interpreted = interpret(&provider, &plan_text, config).await?;

    ensure_dir(&config.paths.json_dir)?;
    let json_path = config.paths.json_dir.join(WORKOUTS_FILE);
    let body = serde_json::to_string_pretty(&interpreted.workouts)
        .map_err(|e| Plan2FitError::Internal(format!("serialising workouts: {e}")))?;
    write_atomic(&json_path, body.as_bytes())?;

    info!(
        "Wrote {} workout(s) to {}",
        interpreted.workouts.len(),
        json_path.display()
    );
    Ok(interpreted.workouts)
}

/// Export stage: `workouts.json` becomes one FIT CSV per workout in
/// `csv_dir`.
///
/// The JSON is re-validated on load; the stage may be fed a hand-edited
/// file and broken invariants must fail here, not inside the converter.
pub fn export_stage(config: &PipelineConfig) -> Result<ExportSummary, Plan2FitError> {
    let json_path = config.paths.json_dir.join(WORKOUTS_FILE);
    let body = std::fs::read_to_string(&json_path)
        .map_err(|_| Plan2FitError::FileNotFound { path: json_path.clone() })?;
    let workouts: Vec<Workout> = serde_json::from_str(&body).map_err(|e| {
        Plan2FitError::SchemaViolation {
            workout: json_path.display().to_string(),
            detail: e.to_string(),
        }
    })?;

    for workout in &workouts {
        workout.validate()?;
    }

    ensure_dir(&config.paths.csv_dir)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut summary = ExportSummary::default();
    for workout in &workouts {
        let artifact = export_workout(workout);
        if !seen.insert(artifact.file_name.clone()) {
            warn!(
                "Duplicate workout name '{}', overwriting earlier export",
                workout.wkt_name
            );
        }
        let csv_path = config.paths.csv_dir.join(&artifact.file_name);
        write_atomic(&csv_path, artifact.content.as_bytes())?;
        summary.csv_files.push(csv_path);
    }

    info!("Exported {} CSV artifact(s)", summary.csv_files.len());
    Ok(summary)
}

/// Conversion stage: every CSV in `csv_dir` becomes a `.fit` in `fit_dir`.
pub async fn convert_stage(config: &PipelineConfig) -> Result<ConvertReport, Plan2FitError> {
    convert::convert_all(config).await
}

/// Run the whole pipeline: extract, interpret, export, convert.
pub async fn run(config: &PipelineConfig) -> Result<RunSummary, Plan2FitError> {
    let extracted = extract_stage(config).await?;
    let workouts = interpret_stage(config).await?;
    let exported = export_stage(config)?;
    let converted = convert_stage(config).await?;

    Ok(RunSummary {
        extracted,
        workouts: workouts.len(),
        exported,
        converted,
    })
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn ensure_dir(dir: &Path) -> Result<(), Plan2FitError> {
    std::fs::create_dir_all(dir).map_err(|e| Plan2FitError::OutputWriteFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}

/// Concatenate the `.md` files of `processed_dir` in name order.
fn read_processed_text(processed_dir: &Path) -> Result<String, Plan2FitError> {
    let entries = std::fs::read_dir(processed_dir).map_err(|_| Plan2FitError::FileNotFound {
        path: processed_dir.to_path_buf(),
    })?;

    let mut mds: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("md"))
                .unwrap_or(false)
        })
        .collect();
    mds.sort();

    let mut text = String::new();
    for md in mds {
        let chunk = std::fs::read_to_string(&md).map_err(|_| Plan2FitError::FileNotFound {
            path: md.clone(),
        })?;
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(&chunk);
    }
    Ok(text)
}

/// Write atomically: temp file in the target directory, then rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Plan2FitError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        Plan2FitError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })?;
    std::io::Write::write_all(&mut tmp, bytes).map_err(|e| Plan2FitError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    tmp.persist(path)
        .map_err(|e| Plan2FitError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelinePaths;
    use crate::workout::{DurationType, Intensity, Step, TargetType, TimedStep};

    fn config_under(dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths = PipelinePaths::under(dir);
        config
    }

    fn sample_workouts() -> Vec<Workout> {
        vec![Workout {
            wkt_name: "S3T1".into(),
            sport: 1,
            sub_sport: 0,
            steps: vec![Step::Timed(TimedStep {
                index: 0,
                intensity: Intensity::Warmup,
                duration_type: DurationType::Time,
                duration_value: 600.0,
                target_type: TargetType::HeartRate,
                target_value: 2,
                custom_target_low: 0,
                custom_target_high: 0,
            })],
        }]
    }

    #[test]
    fn export_stage_writes_one_csv_per_workout() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_under(dir.path());

        std::fs::create_dir_all(&config.paths.json_dir).unwrap();
        let body = serde_json::to_string(&sample_workouts()).unwrap();
        std::fs::write(config.paths.json_dir.join(WORKOUTS_FILE), body).unwrap();

        let summary = export_stage(&config).unwrap();
        assert_eq!(summary.csv_files.len(), 1);
        assert!(config.paths.csv_dir.join("S3T1.csv").exists());
    }

    #[test]
    fn export_stage_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_under(dir.path());

        std::fs::create_dir_all(&config.paths.json_dir).unwrap();
        std::fs::write(config.paths.json_dir.join(WORKOUTS_FILE), "not json").unwrap();

        let err = export_stage(&config).unwrap_err();
        assert!(matches!(err, Plan2FitError::SchemaViolation { .. }));
    }

    #[test]
    fn export_stage_rejects_broken_invariants() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_under(dir.path());

        // Hand-edited file with a gap in the step indices.
        let body = r#"[{"wkt_name":"S3T1","sport":1,"sub_sport":0,"steps":[
            {"index":1,"intensity":0,"duration_type":0,"duration_value":60,
             "target_type":1,"target_value":3}]}]"#;
        std::fs::create_dir_all(&config.paths.json_dir).unwrap();
        std::fs::write(config.paths.json_dir.join(WORKOUTS_FILE), body).unwrap();

        let err = export_stage(&config).unwrap_err();
        assert!(matches!(err, Plan2FitError::SchemaViolation { .. }));
        // Nothing exported.
        assert!(!config.paths.csv_dir.join("S3T1.csv").exists());
    }

    #[tokio::test]
    async fn ingest_of_a_file_already_in_raw_dir_keeps_it_intact() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_under(dir.path());
        std::fs::create_dir_all(&config.paths.raw_dir).unwrap();

        let pdf = config.paths.raw_dir.join("plan.pdf");
        std::fs::write(&pdf, b"%PDF-1.4 plan body").unwrap();

        // Same file, spelled through a parent-dir component.
        let aliased = config.paths.raw_dir.join("../raw/plan.pdf");
        let dest = ingest(&config, aliased.to_str().unwrap()).await.unwrap();

        assert_eq!(dest, pdf);
        assert_eq!(std::fs::read(&pdf).unwrap(), b"%PDF-1.4 plan body");
    }

    #[tokio::test]
    async fn ingest_copies_an_outside_file_into_raw_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_under(dir.path());

        let src = dir.path().join("plan.pdf");
        std::fs::write(&src, b"%PDF-1.4 plan body").unwrap();

        let dest = ingest(&config, src.to_str().unwrap()).await.unwrap();
        assert_eq!(dest, config.paths.raw_dir.join("plan.pdf"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4 plan body");
        // Source untouched.
        assert_eq!(std::fs::read(&src).unwrap(), b"%PDF-1.4 plan body");
    }

    #[tokio::test]
    async fn interpret_stage_fails_on_empty_processed_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_under(dir.path());
        std::fs::create_dir_all(&config.paths.processed_dir).unwrap();

        let err = interpret_stage(&config).await.unwrap_err();
        assert!(matches!(err, Plan2FitError::InvalidInput { .. }));
    }

    #[test]
    fn write_atomic_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn processed_text_concatenates_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "second").unwrap();
        std::fs::write(dir.path().join("a.md"), "first").unwrap();
        std::fs::write(dir.path().join("skip.txt"), "nope").unwrap();

        let text = read_processed_text(dir.path()).unwrap();
        assert_eq!(text, "first\n\nsecond");
    }
}
