//! FIT CSV export: encode one workout as a fixed-grid tabular artifact.
//!
//! The downstream FitCSVTool parses by column position, not by header name,
//! so every row carries the same cell count: `Type`, `Local Number`,
//! `Message`, then exactly [`FIELD_TRIPLES`] `(field, value, unit)` triples,
//! empty but present when unused. A repeat step therefore emits its four
//! meaningful triples followed by four empty ones — trimming them would shift
//! every later column and silently corrupt the binary conversion.
//!
//! The `file_id` values are placeholders: Garmin Connect assigns the real
//! manufacturer, product, serial number and creation time at import, but the
//! tool refuses files without the message, so we emit fixed sentinels.

use crate::workout::{Step, Workout};
use tracing::debug;

/// Triples per row; the widest message (`workout_step`) needs all eight.
pub const FIELD_TRIPLES: usize = 8;

// file_id sentinels. type=5 marks a workout file; the rest are dummies the
// device replaces at import.
const FILE_ID_TYPE: u32 = 5;
const FILE_ID_MANUFACTURER: u32 = 255;
const FILE_ID_PRODUCT: u32 = 0;
const FILE_ID_SERIAL: u32 = 960_241_704;
const FILE_ID_TIME_CREATED: u32 = 960_241_704;

/// FIT string fields carry their byte size in the definition row.
const WKT_NAME_FIELD_SIZE: u32 = 13;

/// Row tag in the first CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Header,
    Definition,
    Data,
}

/// One physical row of the tabular artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRow {
    pub kind: RowKind,
    /// FIT message name (`file_id`, `workout`, `workout_step`); empty for the
    /// header row.
    pub message: String,
    /// `(field, value, unit)` triples, padded to [`FIELD_TRIPLES`].
    pub triples: Vec<(String, String, String)>,
}

impl TabularRow {
    /// The column-header row, identical for every artifact.
    pub fn header() -> Self {
        let triples = (1..=FIELD_TRIPLES)
            .map(|i| {
                (
                    format!("Field {i}"),
                    format!("Value {i}"),
                    format!("Units {i}"),
                )
            })
            .collect();
        Self {
            kind: RowKind::Header,
            message: String::new(),
            triples,
        }
    }

    /// A definition row listing field names with their sizes.
    pub fn definition(message: &str, fields: &[(&str, u32)]) -> Self {
        let triples = fields
            .iter()
            .map(|(name, size)| (name.to_string(), size.to_string(), String::new()))
            .collect();
        Self {
            kind: RowKind::Definition,
            message: message.to_string(),
            triples,
        }
        .padded()
    }

    /// A data row; values are double-quoted on encode.
    pub fn data(message: &str, triples: Vec<(String, String, String)>) -> Self {
        Self {
            kind: RowKind::Data,
            message: message.to_string(),
            triples,
        }
        .padded()
    }

    fn padded(mut self) -> Self {
        while self.triples.len() < FIELD_TRIPLES {
            self.triples
                .push((String::new(), String::new(), String::new()));
        }
        self
    }

    /// Look up a value by field name (decode direction, used by tests and
    /// round-trip checks).
    pub fn value_of(&self, field: &str) -> Option<&str> {
        self.triples
            .iter()
            .find(|(name, _, _)| name == field)
            .map(|(_, value, _)| value.as_str())
    }

    /// Encode as one physical CSV line (no trailing newline).
    pub fn to_csv(&self) -> String {
        let mut cells: Vec<String> = Vec::with_capacity(3 + FIELD_TRIPLES * 3);
        match self.kind {
            RowKind::Header => {
                cells.push("Type".into());
                cells.push("Local Number".into());
                cells.push("Message".into());
                for (f, v, u) in &self.triples {
                    cells.push(f.clone());
                    cells.push(v.clone());
                    cells.push(u.clone());
                }
            }
            RowKind::Definition | RowKind::Data => {
                cells.push(
                    if self.kind == RowKind::Definition {
                        "Definition"
                    } else {
                        "Data"
                    }
                    .into(),
                );
                cells.push("0".into());
                cells.push(self.message.clone());
                for (f, v, u) in &self.triples {
                    cells.push(f.clone());
                    // Data values are quoted; definition sizes are not.
                    if self.kind == RowKind::Data && !v.is_empty() {
                        cells.push(format!("\"{v}\""));
                    } else {
                        cells.push(v.clone());
                    }
                    cells.push(u.clone());
                }
            }
        }
        // The tool expects a trailing comma on every row.
        let mut line = cells.join(",");
        line.push(',');
        line
    }
}

/// One exported artifact: file name plus CSV content.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvArtifact {
    /// `<wkt_name>.csv`; a later workout with the same name overwrites.
    pub file_name: String,
    pub content: String,
}

/// Build the full row sequence for one workout.
pub fn workout_rows(workout: &Workout) -> Vec<TabularRow> {
    let mut rows = Vec::with_capacity(6 + workout.steps.len());

    rows.push(TabularRow::header());

    rows.push(TabularRow::definition(
        "file_id",
        &[
            ("type", 1),
            ("manufacturer", 1),
            ("product", 1),
            ("serial_number", 1),
            ("time_created", 1),
        ],
    ));
    rows.push(TabularRow::data(
        "file_id",
        vec![
            triple("type", FILE_ID_TYPE),
            triple("manufacturer", FILE_ID_MANUFACTURER),
            triple("product", FILE_ID_PRODUCT),
            triple("serial_number", FILE_ID_SERIAL),
            triple("time_created", FILE_ID_TIME_CREATED),
        ],
    ));

    rows.push(TabularRow::definition(
        "workout",
        &[
            ("wkt_name", WKT_NAME_FIELD_SIZE),
            ("sport", 1),
            ("sub_sport", 1),
            ("num_valid_steps", 1),
        ],
    ));
    rows.push(TabularRow::data(
        "workout",
        vec![
            (
                "wkt_name".into(),
                workout.wkt_name.clone(),
                String::new(),
            ),
            triple("sport", workout.sport),
            triple("sub_sport", workout.sub_sport),
            triple("num_valid_steps", workout.steps.len()),
        ],
    ));

    rows.push(TabularRow::definition(
        "workout_step",
        &[
            ("message_index", 1),
            ("intensity", 1),
            ("duration_type", 1),
            ("duration_value", 1),
            ("target_type", 1),
            ("target_value", 1),
            ("custom_target_value_low", 1),
            ("custom_target_value_high", 1),
        ],
    ));

    for step in &workout.steps {
        rows.push(step_row(step));
    }

    rows
}

/// Build the data row for one step.
fn step_row(step: &Step) -> TabularRow {
    match step {
        Step::Timed(s) => {
            let duration_field = match s.duration_type {
                crate::workout::DurationType::Time => "duration_time",
                crate::workout::DurationType::Distance => "duration_distance",
                crate::workout::DurationType::Open => "duration_value",
            };
            TabularRow::data(
                "workout_step",
                vec![
                    triple("message_index", s.index),
                    triple("intensity", s.intensity.code()),
                    triple("duration_type", s.duration_type.code()),
                    (
                        duration_field.into(),
                        format!("{:.1}", s.duration_value),
                        s.duration_type.unit().into(),
                    ),
                    triple("target_type", s.target_type.code()),
                    triple("target_value", s.target_value),
                    triple("custom_target_value_low", s.custom_target_low),
                    triple("custom_target_value_high", s.custom_target_high),
                ],
            )
        }
        Step::Repeat(s) => TabularRow::data(
            "workout_step",
            vec![
                triple("message_index", s.index),
                triple("duration_type", crate::workout::REPEAT_DURATION_TYPE),
                triple("duration_step", s.duration_step),
                triple("repeat_steps", s.repeat_steps),
            ],
        ),
    }
}

fn triple(field: &str, value: impl ToString) -> (String, String, String) {
    (field.into(), value.to_string(), String::new())
}

/// Encode one workout as a CSV artifact named after its `wkt_name`.
pub fn export_workout(workout: &Workout) -> CsvArtifact {
    let content = workout_rows(workout)
        .iter()
        .map(TabularRow::to_csv)
        .collect::<Vec<_>>()
        .join("\n");

    let file_name = format!("{}.csv", workout.wkt_name);
    debug!(
        "Exported {} ({} steps, {} bytes)",
        file_name,
        workout.steps.len(),
        content.len()
    );

    CsvArtifact { file_name, content }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workout::{DurationType, Intensity, RepeatStep, TargetType, TimedStep};

    fn sample_workout() -> Workout {
        Workout {
            wkt_name: "S3T1".into(),
            sport: 1,
            sub_sport: 0,
            steps: vec![
                Step::Timed(TimedStep {
                    index: 0,
                    intensity: Intensity::Warmup,
                    duration_type: DurationType::Time,
                    duration_value: 600.0,
                    target_type: TargetType::HeartRate,
                    target_value: 2,
                    custom_target_low: 0,
                    custom_target_high: 0,
                }),
                Step::Timed(TimedStep {
                    index: 1,
                    intensity: Intensity::Run,
                    duration_type: DurationType::Time,
                    duration_value: 180.0,
                    target_type: TargetType::HeartRate,
                    target_value: 4,
                    custom_target_low: 0,
                    custom_target_high: 0,
                }),
                Step::Repeat(RepeatStep {
                    index: 2,
                    duration_step: 1,
                    repeat_steps: 3,
                }),
            ],
        }
    }

    #[test]
    fn every_row_has_uniform_cell_count() {
        let artifact = export_workout(&sample_workout());
        let counts: Vec<usize> = artifact
            .content
            .lines()
            .map(|l| l.split(',').count())
            .collect();
        assert!(!counts.is_empty());
        // 3 leading cells + 8 triples + trailing comma = 28 splits.
        assert!(
            counts.iter().all(|&c| c == counts[0]),
            "ragged rows: {counts:?}"
        );
        assert_eq!(counts[0], 3 + FIELD_TRIPLES * 3 + 1);
    }

    #[test]
    fn step_data_row_count_equals_step_count() {
        let w = sample_workout();
        let rows = workout_rows(&w);
        let step_data_rows = rows
            .iter()
            .filter(|r| r.kind == RowKind::Data && r.message == "workout_step")
            .count();
        assert_eq!(step_data_rows, w.steps.len());
    }

    #[test]
    fn workout_data_row_round_trips() {
        let w = sample_workout();
        let rows = workout_rows(&w);
        let data = rows
            .iter()
            .find(|r| r.kind == RowKind::Data && r.message == "workout")
            .unwrap();

        assert_eq!(data.value_of("wkt_name"), Some("S3T1"));
        assert_eq!(data.value_of("sport"), Some("1"));
        assert_eq!(data.value_of("sub_sport"), Some("0"));
        assert_eq!(data.value_of("num_valid_steps"), Some("3"));
    }

    #[test]
    fn timed_step_renders_seconds_with_one_decimal() {
        let w = sample_workout();
        let rows = workout_rows(&w);
        let first_step = rows
            .iter()
            .find(|r| r.kind == RowKind::Data && r.message == "workout_step")
            .unwrap();

        let (field, value, unit) = first_step
            .triples
            .iter()
            .find(|(f, _, _)| f == "duration_time")
            .unwrap();
        assert_eq!(field, "duration_time");
        assert_eq!(value, "600.0");
        assert_eq!(unit, "s");
    }

    #[test]
    fn repeat_step_row_leaves_target_columns_empty() {
        let w = sample_workout();
        let rows = workout_rows(&w);
        let repeat = rows
            .iter()
            .filter(|r| r.kind == RowKind::Data && r.message == "workout_step")
            .nth(2)
            .unwrap();

        assert_eq!(repeat.value_of("duration_type"), Some("6"));
        assert_eq!(repeat.value_of("duration_step"), Some("1"));
        assert_eq!(repeat.value_of("repeat_steps"), Some("3"));
        assert_eq!(repeat.value_of("target_value"), None);
        // Padding keeps the grid rectangular.
        assert_eq!(repeat.triples.len(), FIELD_TRIPLES);
        assert!(repeat.triples[4..]
            .iter()
            .all(|(f, v, u)| f.is_empty() && v.is_empty() && u.is_empty()));
    }

    #[test]
    fn data_values_are_quoted_in_csv() {
        let artifact = export_workout(&sample_workout());
        let workout_line = artifact
            .content
            .lines()
            .find(|l| l.starts_with("Data,0,workout,"))
            .unwrap();
        assert!(workout_line.contains("wkt_name,\"S3T1\","));
        assert!(workout_line.contains("num_valid_steps,\"3\","));
    }

    #[test]
    fn artifact_is_named_after_the_workout() {
        let artifact = export_workout(&sample_workout());
        assert_eq!(artifact.file_name, "S3T1.csv");
    }

    #[test]
    fn header_row_lists_eight_triples() {
        let header = TabularRow::header();
        assert_eq!(header.triples.len(), FIELD_TRIPLES);
        let line = header.to_csv();
        assert!(line.starts_with("Type,Local Number,Message,Field 1,"));
        assert!(line.contains("Units 8"));
    }
}
