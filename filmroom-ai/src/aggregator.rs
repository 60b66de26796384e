// Aggregator
//
// Concept: Merge Stage 2 base records with Stage 3 change proposals into the
// final canonical dataset
//
// Algorithm:
// 1. Re-stamp each record's time range from its originating unit (by id)
// 2. Apply every proposal in the record's report whose confidence meets the
//    override threshold, in listed order (last write wins per field)
// 3. Drop duplicates (same id or identical time range), keeping the first
//    in Stage 2 order
// 4. Sort by (start, end, play_id)
//
// Pure function of its inputs: no I/O, no provider calls.

use crate::fields::{FieldError, RecordField};
use crate::types::{
    AggregatedRecord, AnalysisUnit, ChangeProposal, FieldConfidence, Provenance, Stage2Entry,
    VerificationReport,
};
use filmroom_common::Timecode;
use std::collections::{HashMap, HashSet};

/// Default minimum confidence for applying a proposal
pub const DEFAULT_OVERRIDE_THRESHOLD: f64 = 0.7;

/// Aggregation result with proposal accounting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationOutcome {
    /// Sorted, de-duplicated final records
    pub records: Vec<AggregatedRecord>,
    /// Proposals written into a record
    pub applied: usize,
    /// Proposals discarded for confidence below the threshold
    pub below_threshold: usize,
    /// Proposals above the threshold that named an unknown field or carried
    /// an invalid value, or whose report matched no record
    pub rejected: usize,
    /// Records dropped as duplicates
    pub duplicates_removed: usize,
}

/// Confidence-gated merge engine
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    override_threshold: f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            override_threshold: DEFAULT_OVERRIDE_THRESHOLD,
        }
    }
}

impl Aggregator {
    /// Threshold is clamped into [0, 1]; NaN falls back to the default
    pub fn new(override_threshold: f64) -> Self {
        let override_threshold = if override_threshold.is_nan() {
            DEFAULT_OVERRIDE_THRESHOLD
        } else {
            override_threshold.clamp(0.0, 1.0)
        };
        Self { override_threshold }
    }

    pub fn override_threshold(&self) -> f64 {
        self.override_threshold
    }

    /// Merge Stage 2 entries with Stage 3 reports
    ///
    /// # Arguments
    /// * `units` - Sanitized Stage 1 units (time-range source of truth)
    /// * `entries` - Stage 2 entries, in checkpoint order
    /// * `reports` - Stage 3 reports; several reports for one id are merged
    ///   in listed order
    ///
    /// # Returns
    /// AggregationOutcome with records sorted by start time
    pub fn aggregate(
        &self,
        units: &[AnalysisUnit],
        entries: &[Stage2Entry],
        reports: &[VerificationReport],
    ) -> AggregationOutcome {
        let units_by_id: HashMap<&str, &AnalysisUnit> =
            units.iter().map(|u| (u.id.as_str(), u)).collect();

        let mut reports_by_id: HashMap<&str, Vec<&VerificationReport>> = HashMap::new();
        for report in reports {
            reports_by_id.entry(report.play_id.as_str()).or_default().push(report);
        }

        let mut outcome = AggregationOutcome::default();
        let mut seen_ids: HashSet<&str> = HashSet::new();
        let mut seen_ranges: HashSet<(Timecode, Timecode)> = HashSet::new();
        let mut matched_reports: HashSet<&str> = HashSet::new();

        for entry in entries {
            let mut aggregated = AggregatedRecord {
                record: entry.record.clone(),
                field_confidences: entry.field_confidences.clone(),
                issues: Vec::new(),
                applied_changes: Vec::new(),
            };
            aggregated.record.play_id = entry.id.clone();

            match units_by_id.get(entry.id.as_str()) {
                Some(unit) => {
                    aggregated.record.start = unit.start;
                    aggregated.record.end = unit.end;
                }
                None => tracing::warn!(
                    play_id = %entry.id,
                    "No originating unit for record, keeping its own time range"
                ),
            }

            let range = (aggregated.record.start, aggregated.record.end);
            if !seen_ids.insert(entry.id.as_str()) || !seen_ranges.insert(range) {
                tracing::warn!(
                    play_id = %entry.id,
                    start = %range.0,
                    end = %range.1,
                    "Dropping duplicate record"
                );
                outcome.duplicates_removed += 1;
                continue;
            }

            if let Some(found) = reports_by_id.get(entry.id.as_str()) {
                matched_reports.insert(entry.id.as_str());
                for report in found {
                    aggregated.issues.extend(report.issues.iter().cloned());
                    for proposal in &report.proposed_changes {
                        self.apply(&mut aggregated, proposal, &mut outcome);
                    }
                }
            }

            outcome.records.push(aggregated);
        }

        for (play_id, found) in &reports_by_id {
            if !matched_reports.contains(play_id) {
                let proposals: usize = found.iter().map(|r| r.proposed_changes.len()).sum();
                tracing::warn!(
                    play_id = %play_id,
                    proposals,
                    "Verification report matches no record, ignoring"
                );
                outcome.rejected += proposals;
            }
        }

        outcome.records.sort_by(|a, b| {
            (a.record.start, a.record.end, &a.record.play_id).cmp(&(
                b.record.start,
                b.record.end,
                &b.record.play_id,
            ))
        });

        tracing::info!(
            records = outcome.records.len(),
            applied = outcome.applied,
            below_threshold = outcome.below_threshold,
            rejected = outcome.rejected,
            duplicates_removed = outcome.duplicates_removed,
            threshold = self.override_threshold,
            "Aggregation complete"
        );

        outcome
    }

    fn apply(
        &self,
        aggregated: &mut AggregatedRecord,
        proposal: &ChangeProposal,
        outcome: &mut AggregationOutcome,
    ) {
        if proposal.confidence < self.override_threshold {
            tracing::debug!(
                play_id = %aggregated.record.play_id,
                field = %proposal.field,
                confidence = proposal.confidence,
                "Proposal below override threshold, discarded"
            );
            outcome.below_threshold += 1;
            return;
        }

        let result = proposal
            .field
            .parse::<RecordField>()
            .and_then(|field| field.set(&mut aggregated.record, &proposal.new_value).map(|_| field));

        match result {
            Ok(field) => {
                aggregated.field_confidences.push(FieldConfidence {
                    path: field.path().to_string(),
                    value: proposal.new_value.clone(),
                    confidence: proposal.confidence,
                    provenance: Provenance::Verification,
                });
                aggregated.applied_changes.push(proposal.clone());
                outcome.applied += 1;
            }
            Err(e) => {
                let reason = match &e {
                    FieldError::UnknownPath(_) => "unknown field",
                    FieldError::InvalidValue { .. } => "invalid value",
                };
                tracing::warn!(
                    play_id = %aggregated.record.play_id,
                    field = %proposal.field,
                    reason,
                    error = %e,
                    "Proposal rejected"
                );
                outcome.rejected += 1;
            }
        }
    }
}
