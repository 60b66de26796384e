//! Request shaping for the three provider passes
//!
//! Prompts state the expected JSON shape explicitly; the parse boundary
//! still treats whatever comes back as untrusted.

use crate::types::AnalysisUnit;
use serde_json::{json, Value};

/// Stage 1: list every play in the recording
pub fn segmentation_prompt(source_id: &str) -> String {
    format!(
        "You are analyzing the full recording of a football game (source: {source_id}).\n\
         List every discrete play from snap to whistle, in chronological order.\n\
         Respond with a JSON array only. Each element:\n\
         {{\"id\": string, \"start_time\": \"H:MM:SS\", \"end_time\": \"H:MM:SS\", \
         \"quarter\": integer 1-5, \"game_clock\": \"MM:SS\", \
         \"offense\": team name, \"defense\": team name, \
         \"confidence\": number 0-1}}\n\
         Omit replays, commercials and dead time between plays."
    )
}

/// Stage 2: deep annotation of one unit
pub fn deep_analysis_prompt(unit: &AnalysisUnit) -> String {
    let mut context = Vec::new();
    if let Some(quarter) = unit.quarter {
        context.push(format!("quarter {}", quarter));
    }
    if let Some(clock) = &unit.game_clock {
        context.push(format!("game clock {}", clock));
    }
    if let (Some(offense), Some(defense)) = (&unit.offense, &unit.defense) {
        context.push(format!("{} on offense against {}", offense, defense));
    }
    let context = if context.is_empty() {
        String::new()
    } else {
        format!("Known context: {}.\n", context.join(", "))
    };

    format!(
        "Analyze only the play between {start} and {end} (play id {id}).\n\
         {context}\
         Describe the situation before the snap, both teams' pre-snap alignment, \
         the play classification and the result.\n\
         For every field you fill, add an entry to field_confidences with the \
         dotted field path, the value and your confidence (0-1).\n\
         Leave a field null rather than guessing.",
        start = unit.start,
        end = unit.end,
        id = unit.id,
    )
}

/// Stage 2 structured output schema
pub fn deep_analysis_schema() -> Value {
    let text = json!({"type": "string", "nullable": true});
    let integer = json!({"type": "integer", "nullable": true});
    let boolean = json!({"type": "boolean", "nullable": true});

    json!({
        "type": "object",
        "properties": {
            "context": {
                "type": "object",
                "properties": {
                    "quarter": integer,
                    "game_clock": text,
                    "offense": text,
                    "defense": text
                }
            },
            "situation": {
                "type": "object",
                "properties": {
                    "down": integer,
                    "distance": integer,
                    "yard_line": text
                }
            },
            "pre_snap": {
                "type": "object",
                "properties": {
                    "offensive_formation": text,
                    "personnel": text,
                    "defensive_front": text,
                    "coverage_shell": text,
                    "motion": boolean
                }
            },
            "classification": {
                "type": "object",
                "properties": {
                    "play_type": text,
                    "concept": text,
                    "direction": text
                }
            },
            "result": {
                "type": "object",
                "properties": {
                    "outcome": text,
                    "yards_gained": integer,
                    "scoring_play": boolean,
                    "turnover": boolean,
                    "penalty": text
                }
            },
            "field_confidences": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "path": {"type": "string"},
                        "value": {"type": "string", "description": "field value as text"},
                        "confidence": {"type": "number"}
                    },
                    "required": ["path", "confidence"]
                }
            }
        },
        "required": ["classification", "result"]
    })
}

/// Stage 3: cross-play verification over the compact projection
pub fn verification_prompt(compact_records_json: &str) -> String {
    format!(
        "Below are per-play annotations of one game, in chronological order.\n\
         Check them against each other and the recording: score progression, \
         down and distance continuity, possession changes after turnovers and \
         scores, clock and quarter ordering.\n\
         Respond with a JSON array only. One element per play that needs attention:\n\
         {{\"play_id\": string, \"issues\": [string], \"proposed_changes\": \
         [{{\"field\": dotted path such as \"result.outcome\", \"old_value\": any, \
         \"new_value\": any, \"rationale\": string, \"confidence\": number 0-1}}]}}\n\
         Return [] if everything is consistent.\n\n\
         {compact_records_json}"
    )
}
