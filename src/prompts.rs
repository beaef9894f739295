//! Prompts for LLM-based workout interpretation.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — tightening the schema instructions or the
//!    mapping rules requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the assembled prompt directly
//!    without spinning up a real LLM, making prompt regressions easy to catch.
//!
//! The two auxiliary specification documents are embedded at compile time so
//! the binary works without a checkout; [`crate::config::PipelineConfig`]
//! can override either with an on-disk file.

use crate::config::WeekSelection;

/// System prompt for the interpretation call.
pub const SYSTEM_PROMPT: &str =
    "You are an assistant specialised in converting running training plans \
     into structured JSON workout files for Garmin devices.";

/// Technical description of the FIT workout CSV layout the exporter emits.
pub const FORMAT_SPEC: &str = include_str!("../docs/specs/fit_workout_format.md");

/// Guide mapping plan language (intensities, durations, heart-rate zones)
/// onto FIT codes.
pub const MAPPING_GUIDE: &str = include_str!("../docs/specs/fit_csv_mapping_guide.md");

/// Describe the week scope for the prompt ("the workouts of weeks 3 to 4", …).
fn scope_clause(weeks: WeekSelection) -> String {
    match weeks {
        WeekSelection::All => "every workout in the plan".to_string(),
        WeekSelection::Single(w) => format!("only the workouts of week {w}"),
        WeekSelection::Range(first, last) => {
            format!("only the workouts of weeks {first} to {last}")
        }
    }
}

/// Build the single user message for the interpretation call.
///
/// The message stacks, in order: the two reference documents, the extraction
/// scope, the JSON schema with its hard constraints, and the plan text. The
/// schema block mirrors [`crate::workout::RawStep`] exactly — if one changes,
/// the other must follow.
pub fn build_extraction_prompt(
    format_spec: &str,
    mapping_guide: &str,
    plan_text: &str,
    weeks: WeekSelection,
) -> String {
    format!(
        r#"Below are two reference documents you must follow.

1. Technical format of the workout files (.csv for .fit):
{format_spec}

2. Mapping guide for intensity, duration and heart-rate interpretation:
{mapping_guide}

From the training plan in Markdown below, extract {scope} as a JSON array.

Each workout must contain:
- `wkt_name`: string, `S<week>T<ordinal>` (e.g. "S3T1" for week 3, session 1)
- `sport`: number (use 1 for running)
- `sub_sport`: number (use 0)
- `steps`: array of objects with:
    - `index`: sequential step number starting at 0
    - `intensity`: 0=run, 1=walk/recovery, 2=warm-up, 3=cool-down
    - `duration_type`: number (0 for time, 1 for distance, 6 for repeat)
    - `duration_value`: number (seconds or centimetres)
    - `target_type`: number (use 1 for heart rate)
    - `target_value`: heart-rate zone (1 to 5)
    - `duration_step`: (repeat steps only) index where the repetition starts
    - `repeat_steps`: (repeat steps only) number of repetitions

Hard constraints:
- ALWAYS include `target_value` with a heart-rate zone (required for the
  workout to function on the device).
- ALWAYS encode repetitions as separate steps with `duration_type = 6`.
- Name the workouts `S3T1`, `S3T2`, `S4T1`, ... by week and session order.
- Output a pure JSON array: `[{{...}}, {{...}}]` — no comments, no prose.

Training plan:
{plan_text}
"#,
        format_spec = format_spec,
        mapping_guide = mapping_guide,
        scope = scope_clause(weeks),
        plan_text = plan_text,
    )
}
