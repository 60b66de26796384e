// Shared Types and Data Contracts
//
// Every artifact handed from one stage to the next is defined here:
// Stage 1 produces AnalysisUnits, Stage 2 produces Stage2Entries,
// Stage 3 produces VerificationReports, and the Aggregator derives
// AggregatedRecords from the last two.

use filmroom_common::Timecode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Shortest segment a unit may span (seconds)
pub const MIN_SEGMENT_SECS: u64 = 2;

/// Valid quarter numbers (5 = overtime)
pub const QUARTER_MIN: u8 = 1;
pub const QUARTER_MAX: u8 = 5;

// ============================================================================
// Stages and Provenance
// ============================================================================

/// One of the sequential pipeline passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Segmentation,
    DeepAnalysis,
    Verification,
    Aggregation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Segmentation => "segmentation",
            Stage::DeepAnalysis => "deep analysis",
            Stage::Verification => "verification",
            Stage::Aggregation => "aggregation",
        };
        f.write_str(name)
    }
}

/// Which stage produced a field value (for provenance tracking)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Segmentation,
    DeepAnalysis,
    Verification,
}

// ============================================================================
// Stage 1: Markers
// ============================================================================

/// Marker-like entry as returned by the segmentation pass, before sanitizing.
///
/// Every field is optional; the sanitizer decides what a missing value means.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMarker {
    pub id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub quarter: Option<i64>,
    pub game_clock: Option<String>,
    pub offense: Option<String>,
    pub defense: Option<String>,
    pub confidence: Option<f64>,
}

/// One discrete, time-bounded segment of the source (a play).
///
/// Contract: within a sanitized sequence units are strictly time-ordered,
/// non-overlapping, uniquely identified, and `end > start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisUnit {
    pub id: String,
    pub start: Timecode,
    pub end: Timecode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_clock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offense: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl AnalysisUnit {
    pub fn new(id: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            id: id.into(),
            start: Timecode::from_seconds(start),
            end: Timecode::from_seconds(end),
            quarter: None,
            game_clock: None,
            offense: None,
            defense: None,
            confidence: None,
        }
    }

    /// A unit whose range cannot be submitted for analysis
    pub fn is_degenerate(&self) -> bool {
        self.end <= self.start
    }
}

/// `stage1.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1Checkpoint {
    pub units: Vec<AnalysisUnit>,
    pub source_id: String,
}

// ============================================================================
// Stage 2: Detailed Records
// ============================================================================

/// Coarse game context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayContext {
    pub quarter: Option<u8>,
    pub game_clock: Option<String>,
    pub offense: Option<String>,
    pub defense: Option<String>,
}

/// Down-and-distance state before the snap
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Situation {
    pub down: Option<u8>,
    pub distance: Option<u32>,
    pub yard_line: Option<String>,
}

/// Pre-snap configuration of both units
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreSnap {
    pub offensive_formation: Option<String>,
    pub personnel: Option<String>,
    pub defensive_front: Option<String>,
    pub coverage_shell: Option<String>,
    pub motion: Option<bool>,
}

/// What kind of play was run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayClassification {
    pub play_type: Option<String>,
    pub concept: Option<String>,
    pub direction: Option<String>,
}

/// How the play ended
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayResult {
    pub outcome: Option<String>,
    pub yards_gained: Option<i32>,
    pub scoring_play: Option<bool>,
    pub turnover: Option<bool>,
    pub penalty: Option<String>,
}

/// Deep annotation of one unit.
///
/// Contract: `play_id` equals the originating unit's id and the time range
/// is copied from that unit, never from the provider's restatement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailedRecord {
    pub play_id: String,
    pub start: Timecode,
    pub end: Timecode,
    pub context: PlayContext,
    pub situation: Situation,
    pub pre_snap: PreSnap,
    pub classification: PlayClassification,
    pub result: PlayResult,
}

/// Confidence attached to one field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConfidence {
    /// Dotted path into the record, e.g. `result.outcome`
    pub path: String,
    pub value: Value,
    pub confidence: f64,
    pub provenance: Provenance,
}

/// One element of `stage2.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage2Entry {
    pub id: String,
    pub record: DetailedRecord,
    #[serde(rename = "fieldConfidences", default)]
    pub field_confidences: Vec<FieldConfidence>,
}

// ============================================================================
// Stage 3: Verification
// ============================================================================

/// A suggested override of one record field. Never applied by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeProposal {
    /// Dotted target path, e.g. `result.outcome`
    pub field: String,
    #[serde(default)]
    pub old_value: Value,
    pub new_value: Value,
    #[serde(default)]
    pub rationale: String,
    pub confidence: f64,
}

/// Verification findings for one unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub play_id: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub proposed_changes: Vec<ChangeProposal>,
}

// ============================================================================
// Final Output
// ============================================================================

/// Canonical record: a DetailedRecord with accepted proposals applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    #[serde(flatten)]
    pub record: DetailedRecord,
    #[serde(default)]
    pub field_confidences: Vec<FieldConfidence>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub applied_changes: Vec<ChangeProposal>,
}

// ============================================================================
// Progress Events
// ============================================================================

/// Progress events broadcast while a run executes
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    RunStarted {
        run_id: uuid::Uuid,
        source_id: String,
    },
    StageStarted {
        run_id: uuid::Uuid,
        stage: Stage,
    },
    UnitsDiscovered {
        run_id: uuid::Uuid,
        count: usize,
    },
    UnitAnalyzed {
        run_id: uuid::Uuid,
        unit_id: String,
        index: usize,
        total: usize,
    },
    UnitSkipped {
        run_id: uuid::Uuid,
        unit_id: String,
        reason: String,
    },
    CheckpointFailed {
        run_id: uuid::Uuid,
        stage: Stage,
        error: String,
    },
    StageCompleted {
        run_id: uuid::Uuid,
        stage: Stage,
        duration_ms: u64,
    },
    RunCompleted {
        run_id: uuid::Uuid,
        records: usize,
        duration_ms: u64,
    },
    RunFailed {
        run_id: uuid::Uuid,
        error: String,
    },
}
