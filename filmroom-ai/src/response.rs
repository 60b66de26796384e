//! Parse boundary for provider responses
//!
//! Provider text is untrusted: it may be empty, wrapped in markdown fences,
//! or carry fields of the wrong type. Everything past this module works on
//! typed values only; a mistyped field reads as absent.

use serde_json::{Map, Value};

/// Parse response text as JSON, retrying after stripping markdown fences and
/// then after trimming to the outermost bracket pair.
///
/// Returns `None` when no interpretation parses.
pub fn parse_lenient(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let unfenced = strip_fences(trimmed);
    if let Ok(value) = serde_json::from_str(unfenced) {
        return Some(value);
    }

    json_spans(unfenced)
        .into_iter()
        .find_map(|span| serde_json::from_str(span).ok())
}

/// Remove a leading ```` ``` ```` / ```` ```json ```` line and a trailing fence
pub fn strip_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        // Drop the info string (e.g. "json") up to the first newline
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        };
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Candidate spans from the first `[` and the first `{` to the last matching
/// closer, earliest opener first
fn json_spans(text: &str) -> Vec<&str> {
    let mut spans: Vec<(usize, &str)> = [('[', ']'), ('{', '}')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = text.find(open)?;
            let end = text.rfind(close)?;
            (end > start).then(|| (start, &text[start..=end]))
        })
        .collect();
    spans.sort_by_key(|(start, _)| *start);
    spans.into_iter().map(|(_, span)| span).collect()
}

/// First non-null value among `keys`
pub fn field<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let map = obj.as_object()?;
    keys.iter().filter_map(|k| map.get(*k)).find(|v| !v.is_null())
}

/// Non-empty, trimmed string
pub fn get_str(obj: &Value, keys: &[&str]) -> Option<String> {
    field(obj, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// String, or a number rendered as text (timecodes arrive both ways)
pub fn get_text(obj: &Value, keys: &[&str]) -> Option<String> {
    match field(obj, keys)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        _ => None,
    }
}

/// Finite number
pub fn get_f64(obj: &Value, keys: &[&str]) -> Option<f64> {
    field(obj, keys)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

/// Integral number (`3` or `3.0`)
pub fn get_i64(obj: &Value, keys: &[&str]) -> Option<i64> {
    let value = field(obj, keys)?;
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    value
        .as_f64()
        .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

pub fn get_bool(obj: &Value, keys: &[&str]) -> Option<bool> {
    field(obj, keys).and_then(Value::as_bool)
}

/// Nested object
pub fn get_object<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Map<String, Value>> {
    field(obj, keys).and_then(Value::as_object)
}

/// Array of non-empty strings; non-string elements are dropped
pub fn get_str_list(obj: &Value, keys: &[&str]) -> Vec<String> {
    field(obj, keys)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
