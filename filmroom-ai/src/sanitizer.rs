// Marker Sanitizer
//
// Turns the segmentation pass's raw markers into a well-formed unit sequence.
//
// Algorithm:
// 1. Coerce start/end through the timecode codec; a missing or unparseable
//    end becomes start + min_segment_secs
// 2. Stable sort by start second
// 3. Walk in order: a start before the previous end is shifted forward to
//    that end; an end at or before its start is extended to start + min
// 4. Keep supplied ids, synthesize `play_NNN` otherwise, suffix duplicates
// 5. Clamp quarter and confidence, drop blank optional strings
//
// Output contract: strictly increasing starts, no overlap, unique ids,
// end > start for every unit. Nothing in here can fail.

use crate::types::{AnalysisUnit, RawMarker, MIN_SEGMENT_SECS, QUARTER_MAX, QUARTER_MIN};
use filmroom_common::timecode::{to_seconds, try_to_seconds};
use filmroom_common::Timecode;
use std::collections::HashSet;

/// Upper bound for any coerced second value (~136 years), keeps arithmetic
/// below overflow
const MAX_SECONDS: u64 = u32::MAX as u64;

/// Marker sanitizer
pub struct MarkerSanitizer {
    /// Minimum length given to units whose end is missing or not after start
    min_segment_secs: u64,
}

impl Default for MarkerSanitizer {
    fn default() -> Self {
        Self {
            min_segment_secs: MIN_SEGMENT_SECS,
        }
    }
}

struct Coerced<'a> {
    start: u64,
    end: u64,
    raw: &'a RawMarker,
}

impl MarkerSanitizer {
    /// Create a sanitizer with a custom minimum segment length (0 is raised to 1)
    pub fn new(min_segment_secs: u64) -> Self {
        Self {
            min_segment_secs: min_segment_secs.clamp(1, MAX_SECONDS),
        }
    }

    pub fn min_segment_secs(&self) -> u64 {
        self.min_segment_secs
    }

    /// Sanitize raw markers into ordered, non-overlapping, uniquely
    /// identified units.
    pub fn sanitize(&self, raw: &[RawMarker]) -> Vec<AnalysisUnit> {
        let mut coerced: Vec<Coerced> = raw
            .iter()
            .map(|marker| {
                let start = marker
                    .start_time
                    .as_deref()
                    .map(to_seconds)
                    .unwrap_or(0)
                    .min(MAX_SECONDS);
                let end = marker
                    .end_time
                    .as_deref()
                    .and_then(try_to_seconds)
                    .map(|e| e.min(MAX_SECONDS))
                    .unwrap_or(start + self.min_segment_secs);
                Coerced { start, end, raw: marker }
            })
            .collect();

        // Stable: markers with equal starts keep their input order
        coerced.sort_by_key(|c| c.start);

        let mut units = Vec::with_capacity(coerced.len());
        let mut used_ids: HashSet<String> = HashSet::with_capacity(coerced.len());
        let mut previous_end: u64 = 0;
        let mut shifted = 0usize;

        for (position, mut item) in coerced.into_iter().enumerate() {
            if item.start < previous_end {
                item.start = previous_end;
                shifted += 1;
            }
            if item.end <= item.start {
                item.end = item.start + self.min_segment_secs;
            }
            previous_end = item.end;

            let id = unique_id(
                item.raw
                    .id
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("play_{:03}", position + 1)),
                &mut used_ids,
            );

            units.push(AnalysisUnit {
                id,
                start: Timecode::from_seconds(item.start),
                end: Timecode::from_seconds(item.end),
                quarter: item
                    .raw
                    .quarter
                    .map(|q| q.clamp(QUARTER_MIN as i64, QUARTER_MAX as i64) as u8),
                game_clock: non_blank(&item.raw.game_clock),
                offense: non_blank(&item.raw.offense),
                defense: non_blank(&item.raw.defense),
                confidence: item
                    .raw
                    .confidence
                    .filter(|c| c.is_finite())
                    .map(|c| c.clamp(0.0, 1.0)),
            });
        }

        tracing::debug!(
            input = raw.len(),
            output = units.len(),
            shifted,
            "Markers sanitized"
        );

        units
    }
}

/// Return `base`, or `base_2`, `base_3`, ... whichever is not yet used
fn unique_id(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut suffix = 2usize;
    loop {
        let candidate = format!("{}_{}", base, suffix);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: Option<&str>, start: Option<&str>, end: Option<&str>) -> RawMarker {
        RawMarker {
            id: id.map(str::to_string),
            start_time: start.map(str::to_string),
            end_time: end.map(str::to_string),
            ..Default::default()
        }
    }

    fn assert_well_formed(units: &[AnalysisUnit]) {
        let mut ids = HashSet::new();
        for unit in units {
            assert!(unit.end > unit.start, "unit {} has end <= start", unit.id);
            assert!(ids.insert(unit.id.clone()), "duplicate id {}", unit.id);
        }
        for pair in units.windows(2) {
            assert!(pair[0].start < pair[1].start, "starts not strictly increasing");
            assert!(pair[0].end <= pair[1].start, "units overlap");
        }
    }

    #[test]
    fn test_overlap_shifts_forward() {
        let sanitizer = MarkerSanitizer::default();
        let units = sanitizer.sanitize(&[
            marker(Some("a"), Some("00:00:10"), Some("00:00:20")),
            marker(Some("b"), Some("00:00:15"), Some("00:00:25")),
        ]);

        assert_eq!(units.len(), 2);
        assert_eq!((units[0].start.seconds(), units[0].end.seconds()), (10, 20));
        assert_eq!(units[1].start.seconds(), 20);
        assert!(units[1].end.seconds() >= 25);
        assert_well_formed(&units);
    }

    #[test]
    fn test_sorts_by_start() {
        let units = MarkerSanitizer::default().sanitize(&[
            marker(Some("late"), Some("1:00"), Some("1:10")),
            marker(Some("early"), Some("0:05"), Some("0:09")),
        ]);
        assert_eq!(units[0].id, "early");
        assert_eq!(units[1].id, "late");
    }

    #[test]
    fn test_missing_or_invalid_end_uses_min_length() {
        let units = MarkerSanitizer::default().sanitize(&[
            marker(Some("a"), Some("0:10"), None),
            marker(Some("b"), Some("0:30"), Some("later")),
        ]);
        assert_eq!(units[0].end.seconds(), 12);
        assert_eq!(units[1].end.seconds(), 32);
    }

    #[test]
    fn test_inverted_range_is_extended() {
        let units = MarkerSanitizer::default().sanitize(&[marker(Some("a"), Some("0:40"), Some("0:35"))]);
        assert_eq!((units[0].start.seconds(), units[0].end.seconds()), (40, 42));
    }

    #[test]
    fn test_contained_marker_is_pushed_past_previous() {
        let units = MarkerSanitizer::default().sanitize(&[
            marker(Some("outer"), Some("0:10"), Some("0:50")),
            marker(Some("inner"), Some("0:20"), Some("0:30")),
        ]);
        assert_eq!(units[1].start.seconds(), 50);
        assert_eq!(units[1].end.seconds(), 52);
        assert_well_formed(&units);
    }

    #[test]
    fn test_identical_starts_keep_input_order() {
        let units = MarkerSanitizer::default().sanitize(&[
            marker(Some("first"), Some("0:10"), Some("0:15")),
            marker(Some("second"), Some("0:10"), Some("0:15")),
        ]);
        assert_eq!(units[0].id, "first");
        assert_eq!(units[1].id, "second");
        assert_eq!(units[1].start.seconds(), 15);
        assert_well_formed(&units);
    }

    #[test]
    fn test_id_fallback_and_dedup() {
        let units = MarkerSanitizer::default().sanitize(&[
            marker(None, Some("0:01"), Some("0:02")),
            marker(Some("dup"), Some("0:03"), Some("0:04")),
            marker(Some("dup"), Some("0:05"), Some("0:06")),
            marker(Some("   "), Some("0:07"), Some("0:08")),
            marker(Some("dup"), Some("0:09"), Some("0:10")),
        ]);
        let ids: Vec<&str> = units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["play_001", "dup", "dup_2", "play_004", "dup_3"]);
    }

    #[test]
    fn test_fallback_id_collision_with_supplied_id() {
        let units = MarkerSanitizer::default().sanitize(&[
            marker(Some("play_002"), Some("0:01"), Some("0:02")),
            marker(None, Some("0:03"), Some("0:04")),
        ]);
        assert_eq!(units[0].id, "play_002");
        assert_eq!(units[1].id, "play_002_2");
    }

    #[test]
    fn test_optional_fields_cleaned() {
        let raw = RawMarker {
            id: Some("a".to_string()),
            start_time: Some("0:01".to_string()),
            end_time: Some("0:09".to_string()),
            quarter: Some(9),
            game_clock: Some("  ".to_string()),
            offense: Some(" Home ".to_string()),
            defense: None,
            confidence: Some(1.7),
        };
        let low = RawMarker {
            quarter: Some(-3),
            confidence: Some(f64::NAN),
            start_time: Some("0:10".to_string()),
            ..Default::default()
        };
        let units = MarkerSanitizer::default().sanitize(&[raw, low]);
        assert_eq!(units[0].quarter, Some(QUARTER_MAX));
        assert_eq!(units[0].game_clock, None);
        assert_eq!(units[0].offense.as_deref(), Some("Home"));
        assert_eq!(units[0].confidence, Some(1.0));
        assert_eq!(units[1].quarter, Some(QUARTER_MIN));
        assert_eq!(units[1].confidence, None);
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(MarkerSanitizer::default().sanitize(&[]).is_empty());

        let units = MarkerSanitizer::default().sanitize(&[
            RawMarker::default(),
            RawMarker::default(),
            marker(None, Some("garbage"), Some("garbage")),
        ]);
        assert_eq!(units.len(), 3);
        assert_well_formed(&units);
        assert_eq!(units[0].start.seconds(), 0);
    }

    #[test]
    fn test_huge_values_stay_well_formed() {
        let units = MarkerSanitizer::default().sanitize(&[
            marker(None, Some("99999999999:00:00"), None),
            marker(None, Some("18446744073709551615"), Some("18446744073709551615")),
        ]);
        assert_well_formed(&units);
    }

    #[test]
    fn test_adversarial_sequence_is_well_formed() {
        // Deterministic pseudo-random markers, including overlaps, inversions
        // and duplicates
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        for _ in 0..50 {
            let count = (next() % 40) as usize;
            let raw: Vec<RawMarker> = (0..count)
                .map(|_| {
                    let start = next() % 600;
                    let end = next() % 620;
                    let id = match next() % 3 {
                        0 => None,
                        1 => Some("same".to_string()),
                        _ => Some(format!("p{}", next() % 5)),
                    };
                    RawMarker {
                        id,
                        start_time: Some(start.to_string()),
                        end_time: if next() % 4 == 0 { None } else { Some(end.to_string()) },
                        ..Default::default()
                    }
                })
                .collect();

            let units = MarkerSanitizer::default().sanitize(&raw);
            assert_eq!(units.len(), raw.len());
            assert_well_formed(&units);
        }
    }

    #[test]
    fn test_custom_min_segment() {
        let sanitizer = MarkerSanitizer::new(5);
        let units = sanitizer.sanitize(&[marker(Some("a"), Some("0:10"), None)]);
        assert_eq!(units[0].end.seconds(), 15);
        assert_eq!(MarkerSanitizer::new(0).min_segment_secs(), 1);
    }
}
