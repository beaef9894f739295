//! Workout domain model and the JSON wire schema.
//!
//! The interpreter stage asks the LLM for a flat JSON array in which timed
//! steps and repeat steps share one object shape, distinguished by the
//! `duration_type == 6` sentinel. That is the contract the FIT CSV tooling
//! grew up with and it must be preserved on the wire. In memory, however, the
//! two kinds of step have disjoint required fields, so we deserialise through
//! a permissive [`RawStep`] and immediately convert into the tagged [`Step`]
//! variant — missing fields become parse errors instead of runtime branches
//! on a sentinel value.

use serde::{Deserialize, Serialize};

use crate::error::Plan2FitError;

/// Wire code marking a repeat step in `duration_type`.
pub const REPEAT_DURATION_TYPE: u8 = 6;

/// Step intensity, as understood by Garmin Connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intensity {
    /// Active running (code 0).
    Run,
    /// Walking / recovery (code 1).
    Recover,
    /// Warm-up (code 2).
    Warmup,
    /// Cool-down (code 3).
    Cooldown,
}

impl Intensity {
    pub fn code(self) -> u8 {
        match self {
            Intensity::Run => 0,
            Intensity::Recover => 1,
            Intensity::Warmup => 2,
            Intensity::Cooldown => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Intensity::Run),
            1 => Some(Intensity::Recover),
            2 => Some(Intensity::Warmup),
            3 => Some(Intensity::Cooldown),
            _ => None,
        }
    }
}

/// How a timed step ends.
///
/// Repeat steps are not represented here — they are a separate [`Step`]
/// variant carrying [`REPEAT_DURATION_TYPE`] on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationType {
    /// Elapsed time in seconds (code 0).
    Time,
    /// Distance in centimetres (code 1).
    Distance,
    /// No end condition; the athlete presses lap (code 4).
    Open,
}

impl DurationType {
    pub fn code(self) -> u8 {
        match self {
            DurationType::Time => 0,
            DurationType::Distance => 1,
            DurationType::Open => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DurationType::Time),
            1 => Some(DurationType::Distance),
            4 => Some(DurationType::Open),
            _ => None,
        }
    }

    /// Unit tag emitted in the CSV `Units` column for the duration value.
    pub fn unit(self) -> &'static str {
        match self {
            DurationType::Time => "s",
            DurationType::Distance => "m",
            DurationType::Open => "",
        }
    }
}

/// What a timed step targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    /// Pace / speed band (code 0).
    Speed,
    /// Heart-rate zone 1–5 (code 1). The only target the interpreter asks for.
    HeartRate,
    /// No target (code 2).
    Open,
}

impl TargetType {
    pub fn code(self) -> u8 {
        match self {
            TargetType::Speed => 0,
            TargetType::HeartRate => 1,
            TargetType::Open => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TargetType::Speed),
            1 => Some(TargetType::HeartRate),
            2 => Some(TargetType::Open),
            _ => None,
        }
    }
}

/// A step the athlete executes for a duration, at an intensity, with a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedStep {
    /// Zero-based position within the parent workout.
    pub index: u32,
    pub intensity: Intensity,
    pub duration_type: DurationType,
    /// Seconds for [`DurationType::Time`], centimetres for
    /// [`DurationType::Distance`], ignored for [`DurationType::Open`].
    pub duration_value: f64,
    pub target_type: TargetType,
    /// Heart-rate zone 1–5. Garmin Connect silently produces a non-functional
    /// workout when this is missing, so the field is required at the type level.
    pub target_value: u8,
    /// Custom target bounds; 0 unless the plan specifies explicit BPM bounds.
    pub custom_target_low: u32,
    pub custom_target_high: u32,
}

/// A step encoding "repeat steps `duration_step..index`, `repeat_steps` times".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatStep {
    /// Zero-based position within the parent workout.
    pub index: u32,
    /// Index of the step that begins the repeated block. Must reference a
    /// valid preceding step.
    pub duration_step: u32,
    /// Number of repetitions, ≥ 1.
    pub repeat_steps: u32,
}

/// One workout step — either executed or a repeat marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStep", into = "RawStep")]
pub enum Step {
    Timed(TimedStep),
    Repeat(RepeatStep),
}

impl Step {
    /// Zero-based position within the parent workout.
    pub fn index(&self) -> u32 {
        match self {
            Step::Timed(s) => s.index,
            Step::Repeat(s) => s.index,
        }
    }
}

/// Flat wire form shared by both step kinds.
///
/// Every field the LLM may emit is optional except `index` and
/// `duration_type`; [`TryFrom`] enforces the per-kind requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawStep {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<u8>,
    pub duration_type: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_value: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_target_low: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_target_high: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_step: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_steps: Option<u32>,
}

impl TryFrom<RawStep> for Step {
    type Error = String;

    fn try_from(raw: RawStep) -> Result<Self, Self::Error> {
        let at = |field: &str| format!("step {}: missing `{}`", raw.index, field);

        if raw.duration_type == REPEAT_DURATION_TYPE {
            return Ok(Step::Repeat(RepeatStep {
                index: raw.index,
                duration_step: raw.duration_step.ok_or_else(|| at("duration_step"))?,
                repeat_steps: raw.repeat_steps.ok_or_else(|| at("repeat_steps"))?,
            }));
        }

        let intensity_code = raw.intensity.ok_or_else(|| at("intensity"))?;
        let target_code = raw.target_type.ok_or_else(|| at("target_type"))?;

        Ok(Step::Timed(TimedStep {
            index: raw.index,
            intensity: Intensity::from_code(intensity_code).ok_or_else(|| {
                format!("step {}: unknown intensity code {}", raw.index, intensity_code)
            })?,
            duration_type: DurationType::from_code(raw.duration_type).ok_or_else(|| {
                format!(
                    "step {}: unknown duration_type code {}",
                    raw.index, raw.duration_type
                )
            })?,
            duration_value: raw.duration_value.ok_or_else(|| at("duration_value"))?,
            target_type: TargetType::from_code(target_code).ok_or_else(|| {
                format!("step {}: unknown target_type code {}", raw.index, target_code)
            })?,
            target_value: raw.target_value.ok_or_else(|| at("target_value"))?,
            custom_target_low: raw.custom_target_low.unwrap_or(0),
            custom_target_high: raw.custom_target_high.unwrap_or(0),
        }))
    }
}

impl From<Step> for RawStep {
    fn from(step: Step) -> Self {
        match step {
            Step::Timed(s) => RawStep {
                index: s.index,
                intensity: Some(s.intensity.code()),
                duration_type: s.duration_type.code(),
                duration_value: Some(s.duration_value),
                target_type: Some(s.target_type.code()),
                target_value: Some(s.target_value),
                custom_target_low: Some(s.custom_target_low),
                custom_target_high: Some(s.custom_target_high),
                duration_step: None,
                repeat_steps: None,
            },
            Step::Repeat(s) => RawStep {
                index: s.index,
                intensity: None,
                duration_type: REPEAT_DURATION_TYPE,
                duration_value: None,
                target_type: None,
                target_value: None,
                custom_target_low: None,
                custom_target_high: None,
                duration_step: Some(s.duration_step),
                repeat_steps: Some(s.repeat_steps),
            },
        }
    }
}

/// One structured workout, the unit the exporter turns into a CSV artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    /// Batch-unique identifier, e.g. `"S3T1"` for week 3, session 1.
    pub wkt_name: String,
    /// Sport code; 1 = running.
    pub sport: u8,
    /// Sub-sport code; 0 = generic.
    pub sub_sport: u8,
    /// Execution-ordered steps.
    pub steps: Vec<Step>,
}

impl Workout {
    /// Check the invariants the exporter and the FIT converter depend on.
    ///
    /// * step indices are `0..n`, contiguous
    /// * a repeat step references a valid preceding index
    /// * `repeat_steps ≥ 1`
    /// * heart-rate targets stay in zone 1–5
    pub fn validate(&self) -> Result<(), Plan2FitError> {
        let violation = |detail: String| Plan2FitError::SchemaViolation {
            workout: self.wkt_name.clone(),
            detail,
        };

        if self.steps.is_empty() {
            return Err(violation("workout has no steps".into()));
        }

        for (i, step) in self.steps.iter().enumerate() {
            let expected = i as u32;
            if step.index() != expected {
                return Err(violation(format!(
                    "step indices must be contiguous from 0: position {} has index {}",
                    i,
                    step.index()
                )));
            }

            match step {
                Step::Repeat(r) => {
                    if r.duration_step >= r.index {
                        return Err(violation(format!(
                            "repeat step {} references step {} which does not precede it",
                            r.index, r.duration_step
                        )));
                    }
                    if r.repeat_steps < 1 {
                        return Err(violation(format!(
                            "repeat step {} has repeat_steps = 0",
                            r.index
                        )));
                    }
                }
                Step::Timed(t) => {
                    if t.target_type == TargetType::HeartRate
                        && !(1..=5).contains(&t.target_value)
                    {
                        return Err(violation(format!(
                            "step {} heart-rate zone {} outside 1–5",
                            t.index, t.target_value
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(index: u32) -> Step {
        Step::Timed(TimedStep {
            index,
            intensity: Intensity::Run,
            duration_type: DurationType::Time,
            duration_value: 600.0,
            target_type: TargetType::HeartRate,
            target_value: 3,
            custom_target_low: 0,
            custom_target_high: 0,
        })
    }

    fn workout(steps: Vec<Step>) -> Workout {
        Workout {
            wkt_name: "S3T1".into(),
            sport: 1,
            sub_sport: 0,
            steps,
        }
    }

    #[test]
    fn timed_step_round_trips_through_wire_form() {
        let step = timed(0);
        let json = serde_json::to_string(&step).unwrap();
        let back: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(step, back);
    }

    #[test]
    fn repeat_step_detected_by_sentinel() {
        let json = r#"{"index":3,"duration_type":6,"duration_step":1,"repeat_steps":4}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        assert_eq!(
            step,
            Step::Repeat(RepeatStep {
                index: 3,
                duration_step: 1,
                repeat_steps: 4
            })
        );
    }

    #[test]
    fn timed_step_without_target_value_is_rejected() {
        let json = r#"{"index":0,"intensity":0,"duration_type":0,"duration_value":600,"target_type":1}"#;
        let err = serde_json::from_str::<Step>(json).unwrap_err().to_string();
        assert!(err.contains("target_value"), "got: {err}");
    }

    #[test]
    fn custom_targets_default_to_zero() {
        let json = r#"{"index":0,"intensity":2,"duration_type":0,"duration_value":300,"target_type":1,"target_value":2}"#;
        let step: Step = serde_json::from_str(json).unwrap();
        match step {
            Step::Timed(t) => {
                assert_eq!(t.custom_target_low, 0);
                assert_eq!(t.custom_target_high, 0);
            }
            other => panic!("expected timed step, got {other:?}"),
        }
    }

    #[test]
    fn validate_accepts_contiguous_indices() {
        let w = workout(vec![
            timed(0),
            timed(1),
            Step::Repeat(RepeatStep {
                index: 2,
                duration_step: 0,
                repeat_steps: 3,
            }),
        ]);
        assert!(w.validate().is_ok());
    }

    #[test]
    fn validate_rejects_gap_in_indices() {
        let w = workout(vec![timed(0), timed(2)]);
        let err = w.validate().unwrap_err().to_string();
        assert!(err.contains("contiguous"), "got: {err}");
        assert!(err.contains("S3T1"), "violation must name the workout");
    }

    #[test]
    fn validate_rejects_forward_repeat_reference() {
        let w = workout(vec![
            timed(0),
            Step::Repeat(RepeatStep {
                index: 1,
                duration_step: 1,
                repeat_steps: 2,
            }),
        ]);
        let err = w.validate().unwrap_err().to_string();
        assert!(err.contains("precede"), "got: {err}");
    }

    #[test]
    fn validate_rejects_zone_out_of_range() {
        let mut w = workout(vec![timed(0)]);
        if let Step::Timed(ref mut t) = w.steps[0] {
            t.target_value = 6;
        }
        assert!(w.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_workout() {
        assert!(workout(vec![]).validate().is_err());
    }
}
