// Stage 2: Deep Analysis
//
// One request per AnalysisUnit, issued strictly one at a time in unit order
// with a fixed delay between consecutive requests. Each unit moves through
// Pending -> InFlight -> Checkpointed, or Pending -> Skipped when its range
// is degenerate. After every success the whole list of entries so far is
// written to the Stage 2 checkpoint; a failed write is logged and the run
// continues.

use crate::checkpoint::{self, CheckpointStore};
use crate::error::{PipelineError, PipelineResult};
use crate::events::EventEmitter;
use crate::fields::RecordField;
use crate::prompts;
use crate::provider::{AnalysisProvider, ClipRange, ProviderRequest};
use crate::response::{self, get_bool, get_f64, get_i64, get_object, get_str};
use crate::retry::{with_backoff, RetryPolicy};
use crate::types::{
    AnalysisUnit, DetailedRecord, FieldConfidence, PipelineEvent, PlayClassification,
    PlayContext, PlayResult, PreSnap, Provenance, Situation, Stage, Stage2Entry, QUARTER_MAX,
    QUARTER_MIN,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Duration;

/// Default pause between consecutive Stage 2 requests
pub const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_millis(3000);

/// Lifecycle of one unit within Stage 2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitPhase {
    Pending,
    InFlight,
    /// Entry produced; `persisted` is false if the checkpoint write failed
    Checkpointed { persisted: bool },
    /// Degenerate range, never sent to the provider
    Skipped,
}

/// Stage 2 result
#[derive(Debug, Clone, Default)]
pub struct DeepAnalysisOutcome {
    /// One entry per non-skipped unit, in unit order
    pub entries: Vec<Stage2Entry>,
    /// Final phase per unit, parallel to the input units
    pub phases: Vec<UnitPhase>,
    /// Units analyzed by a provider call in this run
    pub analyzed: usize,
    /// Units taken from a previous Stage 2 checkpoint
    pub reused: usize,
    /// Ids of skipped units
    pub skipped: Vec<String>,
    pub checkpoint_failures: usize,
}

/// Deep analysis stage
pub struct DeepAnalyzer {
    retry: RetryPolicy,
    inter_request_delay: Duration,
}

impl Default for DeepAnalyzer {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), DEFAULT_INTER_REQUEST_DELAY)
    }
}

impl DeepAnalyzer {
    pub fn new(retry: RetryPolicy, inter_request_delay: Duration) -> Self {
        Self {
            retry,
            inter_request_delay,
        }
    }

    /// Analyze every unit in order.
    ///
    /// # Arguments
    /// * `units` - Sanitized Stage 1 output
    /// * `prior` - Entries from an earlier Stage 2 checkpoint; an entry is
    ///   reused when its id and time range match a unit
    ///
    /// # Returns
    /// The outcome, or the first fatal provider error. Entries completed
    /// before the failure are already in the checkpoint.
    pub async fn run(
        &self,
        provider: &dyn AnalysisProvider,
        store: &dyn CheckpointStore,
        source_uri: &str,
        units: &[AnalysisUnit],
        prior: Vec<Stage2Entry>,
        events: &EventEmitter,
    ) -> PipelineResult<DeepAnalysisOutcome> {
        let mut prior: HashMap<String, Stage2Entry> =
            prior.into_iter().map(|e| (e.id.clone(), e)).collect();
        let total = units.len();
        let schema = prompts::deep_analysis_schema();

        let mut outcome = DeepAnalysisOutcome {
            phases: vec![UnitPhase::Pending; total],
            ..Default::default()
        };
        let mut issued = 0usize;

        for (index, unit) in units.iter().enumerate() {
            if unit.is_degenerate() {
                tracing::warn!(
                    unit_id = %unit.id,
                    start = %unit.start,
                    end = %unit.end,
                    "Skipping unit with empty time range"
                );
                outcome.phases[index] = UnitPhase::Skipped;
                outcome.skipped.push(unit.id.clone());
                events.emit(|run_id| PipelineEvent::UnitSkipped {
                    run_id,
                    unit_id: unit.id.clone(),
                    reason: "end does not follow start".to_string(),
                });
                continue;
            }

            if let Some(entry) = prior.remove(&unit.id).filter(|e| covers_unit(e, unit)) {
                tracing::debug!(unit_id = %unit.id, "Reusing checkpointed analysis");
                outcome.entries.push(entry);
                outcome.phases[index] = UnitPhase::Checkpointed { persisted: true };
                outcome.reused += 1;
                continue;
            }

            if issued > 0 && !self.inter_request_delay.is_zero() {
                tokio::time::sleep(self.inter_request_delay).await;
            }
            issued += 1;

            outcome.phases[index] = UnitPhase::InFlight;
            let request = ProviderRequest {
                label: unit.id.clone(),
                source_uri: source_uri.to_string(),
                prompt: prompts::deep_analysis_prompt(unit),
                clip: Some(ClipRange {
                    start: unit.start,
                    end: unit.end,
                }),
                response_schema: Some(schema.clone()),
            };

            let text = with_backoff(&unit.id, &self.retry, || provider.generate(&request))
                .await
                .map_err(|e| PipelineError::provider(Stage::DeepAnalysis, &unit.id, e))?;

            outcome.entries.push(parse_detailed_record(&text, unit));
            outcome.analyzed += 1;

            let persisted = match checkpoint::save_stage2(store, &outcome.entries).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        unit_id = %unit.id,
                        error = %e,
                        "Stage 2 checkpoint write failed, continuing"
                    );
                    outcome.checkpoint_failures += 1;
                    events.emit(|run_id| PipelineEvent::CheckpointFailed {
                        run_id,
                        stage: Stage::DeepAnalysis,
                        error: e.to_string(),
                    });
                    false
                }
            };
            outcome.phases[index] = UnitPhase::Checkpointed { persisted };

            tracing::info!(
                unit_id = %unit.id,
                "Unit analyzed ({}/{})",
                index + 1,
                total
            );
            events.emit(|run_id| PipelineEvent::UnitAnalyzed {
                run_id,
                unit_id: unit.id.clone(),
                index,
                total,
            });
        }

        Ok(outcome)
    }
}

fn covers_unit(entry: &Stage2Entry, unit: &AnalysisUnit) -> bool {
    entry.record.play_id == unit.id && entry.record.start == unit.start && entry.record.end == unit.end
}

/// Build a Stage 2 entry from provider text.
///
/// Identity and time range always come from `unit`. Context fields the
/// response leaves out fall back to the unit's Stage 1 values. A response
/// that does not parse as an object yields a record with only those
/// fallbacks filled.
pub fn parse_detailed_record(text: &str, unit: &AnalysisUnit) -> Stage2Entry {
    let body = match response::parse_lenient(text) {
        Some(value @ Value::Object(_)) => value,
        Some(Value::Array(mut items)) if items.len() == 1 && items[0].is_object() => items.remove(0),
        _ => {
            tracing::warn!(
                unit_id = %unit.id,
                response_len = text.len(),
                "Deep analysis response unparseable, keeping Stage 1 context only"
            );
            json!({})
        }
    };

    let section = |keys: &[&str]| -> Value {
        get_object(&body, keys)
            .cloned()
            .map(Value::Object)
            .unwrap_or_else(|| Value::Object(Map::new()))
    };
    let context = section(&["context", "play_context"]);
    let situation = section(&["situation"]);
    let pre_snap = section(&["pre_snap", "presnap"]);
    let classification = section(&["classification", "play_classification"]);
    let result = section(&["result", "play_result"]);

    let mut field_confidences = parse_field_confidences(&body);

    let mut record = DetailedRecord {
        play_id: unit.id.clone(),
        start: unit.start,
        end: unit.end,
        context: PlayContext {
            quarter: get_i64(&context, &["quarter"])
                .filter(|q| (QUARTER_MIN as i64..=QUARTER_MAX as i64).contains(q))
                .map(|q| q as u8),
            game_clock: get_str(&context, &["game_clock", "clock"]),
            offense: get_str(&context, &["offense"]),
            defense: get_str(&context, &["defense"]),
        },
        situation: Situation {
            down: get_i64(&situation, &["down"])
                .filter(|d| (1..=4).contains(d))
                .map(|d| d as u8),
            distance: get_i64(&situation, &["distance"]).and_then(|d| u32::try_from(d).ok()),
            yard_line: get_str(&situation, &["yard_line"]),
        },
        pre_snap: PreSnap {
            offensive_formation: get_str(&pre_snap, &["offensive_formation", "formation"]),
            personnel: get_str(&pre_snap, &["personnel"]),
            defensive_front: get_str(&pre_snap, &["defensive_front"]),
            coverage_shell: get_str(&pre_snap, &["coverage_shell", "coverage"]),
            motion: get_bool(&pre_snap, &["motion"]),
        },
        classification: PlayClassification {
            play_type: get_str(&classification, &["play_type", "type"]),
            concept: get_str(&classification, &["concept"]),
            direction: get_str(&classification, &["direction"]),
        },
        result: PlayResult {
            outcome: get_str(&result, &["outcome"]),
            yards_gained: get_i64(&result, &["yards_gained", "yards"])
                .and_then(|y| i32::try_from(y).ok()),
            scoring_play: get_bool(&result, &["scoring_play"]),
            turnover: get_bool(&result, &["turnover"]),
            penalty: get_str(&result, &["penalty"]),
        },
    };

    fill_context_from_unit(&mut record.context, unit, &mut field_confidences);

    Stage2Entry {
        id: unit.id.clone(),
        record,
        field_confidences,
    }
}

fn fill_context_from_unit(
    context: &mut PlayContext,
    unit: &AnalysisUnit,
    confidences: &mut Vec<FieldConfidence>,
) {
    let mut fallback = |path: &str, value: Value| {
        if let Some(confidence) = unit.confidence {
            confidences.push(FieldConfidence {
                path: path.to_string(),
                value,
                confidence,
                provenance: Provenance::Segmentation,
            });
        }
    };

    if context.quarter.is_none() {
        if let Some(quarter) = unit.quarter {
            context.quarter = Some(quarter);
            fallback("context.quarter", json!(quarter));
        }
    }
    if context.game_clock.is_none() {
        if let Some(clock) = &unit.game_clock {
            context.game_clock = Some(clock.clone());
            fallback("context.game_clock", json!(clock));
        }
    }
    if context.offense.is_none() {
        if let Some(offense) = &unit.offense {
            context.offense = Some(offense.clone());
            fallback("context.offense", json!(offense));
        }
    }
    if context.defense.is_none() {
        if let Some(defense) = &unit.defense {
            context.defense = Some(defense.clone());
            fallback("context.defense", json!(defense));
        }
    }
}

fn parse_field_confidences(body: &Value) -> Vec<FieldConfidence> {
    let Some(items) = response::field(body, &["field_confidences", "fieldConfidences"])
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let path = get_str(item, &["path", "field"])?;
            let confidence = get_f64(item, &["confidence"])?.clamp(0.0, 1.0);
            let value = response::field(item, &["value"]).cloned().unwrap_or(Value::Null);
            Some(FieldConfidence {
                value: typed_value(&path, value),
                path,
                confidence,
                provenance: Provenance::DeepAnalysis,
            })
        })
        .collect()
}

/// Values arrive as text under the response schema; coerce them to the
/// type of the named record field. Unknown paths and values that do not
/// coerce are kept as sent.
fn typed_value(path: &str, value: Value) -> Value {
    let Ok(field) = path.parse::<RecordField>() else {
        return value;
    };
    let mut scratch = DetailedRecord::default();
    match field.set(&mut scratch, &value) {
        Ok(()) => field.get(&scratch),
        Err(_) => value,
    }
}
