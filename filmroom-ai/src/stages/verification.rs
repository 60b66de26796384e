// Stage 3: Verification
//
// A single request over a compact projection of every Stage 2 record. The
// provider answers with per-play reports: free-text issues plus proposed
// field changes. Nothing here applies a proposal; that is the aggregator's
// decision.

use crate::error::{PipelineError, PipelineResult};
use crate::prompts;
use crate::provider::{AnalysisProvider, ProviderRequest};
use crate::response::{self, get_f64, get_str, get_str_list, get_text};
use crate::retry::{with_backoff, RetryPolicy};
use crate::types::{ChangeProposal, Stage, Stage2Entry, VerificationReport};
use serde_json::{json, Value};

/// Verification stage
#[derive(Default)]
pub struct Verifier {
    retry: RetryPolicy,
}

impl Verifier {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Cross-check all records in one request.
    ///
    /// With no entries there is nothing to verify and no request is made.
    pub async fn run(
        &self,
        provider: &dyn AnalysisProvider,
        source_uri: &str,
        entries: &[Stage2Entry],
    ) -> PipelineResult<Vec<VerificationReport>> {
        if entries.is_empty() {
            tracing::info!("No records to verify, skipping verification request");
            return Ok(Vec::new());
        }

        let compact = compact_projection(entries);
        let request = ProviderRequest {
            label: "verification".to_string(),
            source_uri: source_uri.to_string(),
            prompt: prompts::verification_prompt(&compact.to_string()),
            clip: None,
            response_schema: None,
        };

        let text = with_backoff(&request.label, &self.retry, || provider.generate(&request))
            .await
            .map_err(|e| PipelineError::provider(Stage::Verification, &request.label, e))?;

        let reports = parse_verification_response(&text);
        tracing::info!(
            records = entries.len(),
            reports = reports.len(),
            proposals = reports.iter().map(|r| r.proposed_changes.len()).sum::<usize>(),
            "Verification complete"
        );
        Ok(reports)
    }
}

/// Reduced view of each record sent for verification
pub fn compact_projection(entries: &[Stage2Entry]) -> Value {
    Value::Array(
        entries
            .iter()
            .map(|entry| {
                let r = &entry.record;
                json!({
                    "id": entry.id,
                    "start": r.start,
                    "end": r.end,
                    "context": r.context,
                    "classification": r.classification,
                    "outcome": r.result.outcome,
                    "scoring_play": r.result.scoring_play,
                    "turnover": r.result.turnover,
                })
            })
            .collect(),
    )
}

/// Parse verification response text.
///
/// Anything other than an array of report objects is treated as "no
/// reports". Reports without a play id and proposals without a target field
/// or new value are dropped.
pub fn parse_verification_response(text: &str) -> Vec<VerificationReport> {
    let items = match response::parse_lenient(text) {
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => match map.get("reports") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        _ => {
            tracing::warn!(
                response_len = text.len(),
                "Verification response unparseable, treating as no reports"
            );
            return Vec::new();
        }
    };

    items.iter().filter_map(parse_report).collect()
}

fn parse_report(item: &Value) -> Option<VerificationReport> {
    let play_id = get_text(item, &["play_id", "id"])?;
    let proposed_changes = response::field(item, &["proposed_changes", "changes"])
        .and_then(Value::as_array)
        .map(|changes| changes.iter().filter_map(parse_proposal).collect())
        .unwrap_or_default();

    Some(VerificationReport {
        play_id,
        issues: get_str_list(item, &["issues"]),
        proposed_changes,
    })
}

fn parse_proposal(item: &Value) -> Option<ChangeProposal> {
    let map = item.as_object()?;
    let field = get_str(item, &["field", "path"])?;
    // null is a legitimate new value (clears the field); absence is not
    let new_value = map.get("new_value")?.clone();

    Some(ChangeProposal {
        field,
        old_value: map.get("old_value").cloned().unwrap_or(Value::Null),
        new_value,
        rationale: get_str(item, &["rationale", "reason"]).unwrap_or_default(),
        confidence: get_f64(item, &["confidence"])
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(0.0),
    })
}
