//! Timecode conversion between `H:MM:SS` text and whole seconds
//!
//! Every temporal comparison in the pipeline goes through this module, so
//! parsing never fails: malformed or empty text reads as zero seconds.
//!
//! Accepted input forms:
//! - `H:MM:SS` (hours unbounded, e.g. `1:02:03`, `00:00:10`)
//! - `MM:SS` (minutes unbounded, e.g. `75:30`)
//! - bare seconds (`42`)
//!
//! The seconds field may carry a fractional part (`0:12.7`), which is floored.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;

/// Parse timecode text into whole seconds, reporting malformed input as `None`.
///
/// # Examples
///
/// ```
/// use filmroom_common::timecode::try_to_seconds;
///
/// assert_eq!(try_to_seconds("1:02:03"), Some(3723));
/// assert_eq!(try_to_seconds("02:03"), Some(123));
/// assert_eq!(try_to_seconds("45"), Some(45));
/// assert_eq!(try_to_seconds("0:12.7"), Some(12));
/// assert_eq!(try_to_seconds(""), None);
/// assert_eq!(try_to_seconds("bad"), None);
/// ```
pub fn try_to_seconds(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    // Only the trailing (seconds) field may be fractional
    let (leading, last) = parts.split_at(parts.len() - 1);
    let seconds = parse_fractional_field(last[0])?;

    let mut total = seconds;
    let multipliers: &[u64] = match leading.len() {
        0 => &[],
        1 => &[SECONDS_PER_MINUTE],
        _ => &[SECONDS_PER_HOUR, SECONDS_PER_MINUTE],
    };
    for (field, multiplier) in leading.iter().zip(multipliers) {
        let value = parse_whole_field(field)?;
        total = total.checked_add(value.checked_mul(*multiplier)?)?;
    }

    Some(total)
}

/// Parse timecode text into whole seconds; malformed or empty input yields 0.
pub fn to_seconds(text: &str) -> u64 {
    try_to_seconds(text).unwrap_or(0)
}

/// Format seconds as zero-padded `HH:MM:SS`.
///
/// Negative and non-finite input clamps to zero; fractional input is floored.
///
/// # Examples
///
/// ```
/// use filmroom_common::timecode::to_text;
///
/// assert_eq!(to_text(0.0), "00:00:00");
/// assert_eq!(to_text(3723.9), "01:02:03");
/// assert_eq!(to_text(-5.0), "00:00:00");
/// assert_eq!(to_text(f64::NAN), "00:00:00");
/// ```
pub fn to_text(seconds: f64) -> String {
    format_seconds(clamp_seconds(seconds))
}

/// Floor a float second count into whole seconds, clamping negative and
/// non-finite values to zero.
pub fn clamp_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        // `as` saturates at u64::MAX for out-of-range floats
        seconds.floor() as u64
    } else {
        0
    }
}

/// Format whole seconds as zero-padded `HH:MM:SS`.
pub fn format_seconds(seconds: u64) -> String {
    let hours = seconds / SECONDS_PER_HOUR;
    let mins = (seconds % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let secs = seconds % SECONDS_PER_MINUTE;
    format!("{:02}:{:02}:{:02}", hours, mins, secs)
}

fn parse_whole_field(field: &str) -> Option<u64> {
    let field = field.trim();
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

fn parse_fractional_field(field: &str) -> Option<u64> {
    let field = field.trim();
    match field.split_once('.') {
        Some((whole, frac)) => {
            if !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            // ".5" reads as zero seconds
            if whole.is_empty() && !frac.is_empty() {
                return Some(0);
            }
            parse_whole_field(whole)
        }
        None => parse_whole_field(field),
    }
}

/// A point in the source recording, in whole seconds.
///
/// Serializes as `HH:MM:SS` text. Deserializes from text or a JSON number,
/// going through the same tolerant codec (malformed input becomes zero).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timecode(u64);

impl Timecode {
    pub const ZERO: Timecode = Timecode(0);

    pub fn from_seconds(seconds: u64) -> Self {
        Self(seconds)
    }

    /// Tolerant parse; see [`to_seconds`].
    pub fn parse(text: &str) -> Self {
        Self(to_seconds(text))
    }

    pub fn seconds(self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, seconds: u64) -> Self {
        Self(self.0.saturating_add(seconds))
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_seconds(self.0))
    }
}

impl From<u64> for Timecode {
    fn from(seconds: u64) -> Self {
        Self(seconds)
    }
}

impl Serialize for Timecode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_seconds(self.0))
    }
}

impl<'de> Deserialize<'de> for Timecode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimecodeVisitor;

        impl<'de> Visitor<'de> for TimecodeVisitor {
            type Value = Timecode;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a timecode string or a number of seconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Timecode, E> {
                Ok(Timecode::parse(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Timecode, E> {
                Ok(Timecode(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Timecode, E> {
                Ok(Timecode(v.max(0) as u64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Timecode, E> {
                Ok(Timecode(clamp_seconds(v)))
            }

            fn visit_unit<E: de::Error>(self) -> Result<Timecode, E> {
                Ok(Timecode::ZERO)
            }
        }

        deserializer.deserialize_any(TimecodeVisitor)
    }
}
