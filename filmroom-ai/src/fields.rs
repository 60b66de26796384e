//! Override targets within a DetailedRecord
//!
//! Verification proposals name their target with a dotted path. Only the
//! paths listed in [`RecordField`] can be written; anything else (including
//! `play_id`, `start` and `end`) is rejected instead of being created.

use crate::types::{DetailedRecord, QUARTER_MAX, QUARTER_MIN};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Why a proposed value could not be written
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("unknown field path '{0}'")]
    UnknownPath(String),

    #[error("value {value} is not a valid {expected} for '{field}'")]
    InvalidValue {
        field: RecordField,
        expected: &'static str,
        value: Value,
    },
}

macro_rules! record_fields {
    ($( $variant:ident => $path:literal, $section:ident . $name:ident : $kind:ident ;)*) => {
        /// Closed set of mutable record fields
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum RecordField {
            $( $variant, )*
        }

        impl RecordField {
            pub const ALL: &'static [RecordField] = &[ $( RecordField::$variant, )* ];

            /// Dotted path, e.g. `result.outcome`
            pub fn path(self) -> &'static str {
                match self {
                    $( RecordField::$variant => $path, )*
                }
            }

            /// Current value as JSON (`null` when unset)
            pub fn get(self, record: &DetailedRecord) -> Value {
                match self {
                    $( RecordField::$variant => {
                        serde_json::to_value(&record.$section.$name).unwrap_or(Value::Null)
                    } )*
                }
            }

            /// Write `value` into the record; JSON `null` clears the field.
            pub fn set(self, record: &mut DetailedRecord, value: &Value) -> Result<(), FieldError> {
                match self {
                    $( RecordField::$variant => {
                        record.$section.$name = coerce::$kind(self, value)?;
                    } )*
                }
                Ok(())
            }
        }
    };
}

record_fields! {
    Quarter => "context.quarter", context.quarter: quarter;
    GameClock => "context.game_clock", context.game_clock: text;
    Offense => "context.offense", context.offense: text;
    Defense => "context.defense", context.defense: text;
    Down => "situation.down", situation.down: down;
    Distance => "situation.distance", situation.distance: unsigned;
    YardLine => "situation.yard_line", situation.yard_line: text;
    OffensiveFormation => "pre_snap.offensive_formation", pre_snap.offensive_formation: text;
    Personnel => "pre_snap.personnel", pre_snap.personnel: text;
    DefensiveFront => "pre_snap.defensive_front", pre_snap.defensive_front: text;
    CoverageShell => "pre_snap.coverage_shell", pre_snap.coverage_shell: text;
    Motion => "pre_snap.motion", pre_snap.motion: flag;
    PlayType => "classification.play_type", classification.play_type: text;
    Concept => "classification.concept", classification.concept: text;
    Direction => "classification.direction", classification.direction: text;
    Outcome => "result.outcome", result.outcome: text;
    YardsGained => "result.yards_gained", result.yards_gained: signed;
    ScoringPlay => "result.scoring_play", result.scoring_play: flag;
    Turnover => "result.turnover", result.turnover: flag;
    Penalty => "result.penalty", result.penalty: text;
}

impl FromStr for RecordField {
    type Err = FieldError;

    /// Accepts the dotted path, tolerating surrounding whitespace and a
    /// leading `record.` prefix
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let path = trimmed.strip_prefix("record.").unwrap_or(trimmed);
        RecordField::ALL
            .iter()
            .copied()
            .find(|f| f.path() == path)
            .ok_or_else(|| FieldError::UnknownPath(s.to_string()))
    }
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Value coercions per field kind. `null` always clears.
mod coerce {
    use super::{FieldError, RecordField, QUARTER_MAX, QUARTER_MIN};
    use serde_json::Value;

    fn invalid(field: RecordField, expected: &'static str, value: &Value) -> FieldError {
        FieldError::InvalidValue {
            field,
            expected,
            value: value.clone(),
        }
    }

    fn integer(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn text(field: RecordField, value: &Value) -> Result<Option<String>, FieldError> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
            Value::Number(n) => Ok(Some(n.to_string())),
            _ => Err(invalid(field, "string", value)),
        }
    }

    pub fn flag(field: RecordField, value: &Value) -> Result<Option<bool>, FieldError> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(Some(true)),
                "false" | "no" => Ok(Some(false)),
                _ => Err(invalid(field, "boolean", value)),
            },
            _ => Err(invalid(field, "boolean", value)),
        }
    }

    pub fn signed(field: RecordField, value: &Value) -> Result<Option<i32>, FieldError> {
        if value.is_null() {
            return Ok(None);
        }
        integer(value)
            .and_then(|i| i32::try_from(i).ok())
            .map(Some)
            .ok_or_else(|| invalid(field, "integer", value))
    }

    pub fn unsigned(field: RecordField, value: &Value) -> Result<Option<u32>, FieldError> {
        if value.is_null() {
            return Ok(None);
        }
        integer(value)
            .and_then(|i| u32::try_from(i).ok())
            .map(Some)
            .ok_or_else(|| invalid(field, "non-negative integer", value))
    }

    pub fn quarter(field: RecordField, value: &Value) -> Result<Option<u8>, FieldError> {
        if value.is_null() {
            return Ok(None);
        }
        integer(value)
            .filter(|q| (QUARTER_MIN as i64..=QUARTER_MAX as i64).contains(q))
            .map(|q| Some(q as u8))
            .ok_or_else(|| invalid(field, "quarter (1-5)", value))
    }

    pub fn down(field: RecordField, value: &Value) -> Result<Option<u8>, FieldError> {
        if value.is_null() {
            return Ok(None);
        }
        integer(value)
            .filter(|d| (1..=4).contains(d))
            .map(|d| Some(d as u8))
            .ok_or_else(|| invalid(field, "down (1-4)", value))
    }
}
