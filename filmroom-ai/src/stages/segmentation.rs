// Stage 1: Segmentation
//
// One provider request over the entire source asking for an ordered list of
// plays. The response goes through the lenient parser; anything that still
// does not parse is an empty list, never an error. Output is sanitized
// before it leaves the stage.

use crate::error::{PipelineError, PipelineResult};
use crate::prompts;
use crate::provider::{AnalysisProvider, ProviderRequest};
use crate::response::{self, get_f64, get_i64, get_str, get_text};
use crate::retry::{with_backoff, RetryPolicy};
use crate::sanitizer::MarkerSanitizer;
use crate::types::{AnalysisUnit, RawMarker, Stage};
use serde_json::Value;

/// Keys under which a wrapped response may carry the marker list
const LIST_KEYS: [&str; 3] = ["plays", "units", "markers"];

/// Segmentation stage
#[derive(Default)]
pub struct Segmenter {
    retry: RetryPolicy,
    sanitizer: MarkerSanitizer,
}

impl Segmenter {
    pub fn new(retry: RetryPolicy, sanitizer: MarkerSanitizer) -> Self {
        Self { retry, sanitizer }
    }

    /// Request, parse and sanitize the unit list for one source
    pub async fn run(
        &self,
        provider: &dyn AnalysisProvider,
        source_uri: &str,
        source_id: &str,
    ) -> PipelineResult<Vec<AnalysisUnit>> {
        let request = ProviderRequest {
            label: "segmentation".to_string(),
            source_uri: source_uri.to_string(),
            prompt: prompts::segmentation_prompt(source_id),
            clip: None,
            response_schema: None,
        };

        let text = with_backoff(&request.label, &self.retry, || provider.generate(&request))
            .await
            .map_err(|e| PipelineError::provider(Stage::Segmentation, &request.label, e))?;

        let raw = parse_segmentation_response(&text);
        let units = self.sanitizer.sanitize(&raw);

        tracing::info!(
            provider = provider.name(),
            raw_markers = raw.len(),
            units = units.len(),
            "Segmentation complete"
        );

        Ok(units)
    }
}

/// Parse segmentation response text into raw markers.
///
/// Accepts a bare array or an object wrapping one under `plays`/`units`/
/// `markers`. Non-object elements are dropped; unparseable text yields an
/// empty list.
pub fn parse_segmentation_response(text: &str) -> Vec<RawMarker> {
    let Some(value) = response::parse_lenient(text) else {
        tracing::warn!(
            response_len = text.len(),
            "Segmentation response unparseable, treating as empty unit list"
        );
        return Vec::new();
    };

    let items = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => LIST_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    if items.is_empty() {
        tracing::warn!("Segmentation response contained no marker list");
    }

    items
        .iter()
        .filter(|item| item.is_object())
        .map(raw_marker_from_value)
        .collect()
}

fn raw_marker_from_value(item: &Value) -> RawMarker {
    RawMarker {
        id: get_text(item, &["id", "play_id"]),
        start_time: get_text(item, &["start_time", "start"]),
        end_time: get_text(item, &["end_time", "end"]),
        quarter: get_i64(item, &["quarter", "period"]),
        game_clock: get_str(item, &["game_clock", "clock"]),
        offense: get_str(item, &["offense", "offense_team"]),
        defense: get_str(item, &["defense", "defense_team"]),
        confidence: get_f64(item, &["confidence"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedProvider {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnalysisProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn fast_segmenter() -> Segmenter {
        Segmenter::new(
            RetryPolicy {
                base_delay: Duration::from_millis(1),
                jitter: Duration::ZERO,
                max_retries: 2,
            },
            MarkerSanitizer::default(),
        )
    }

    #[test]
    fn test_parse_array() {
        let markers = parse_segmentation_response(
            r#"[{"id": "a", "start_time": "0:10", "end_time": "0:20", "quarter": 1,
                 "offense": "Home", "defense": "Away", "confidence": 0.9}]"#,
        );
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id.as_deref(), Some("a"));
        assert_eq!(markers[0].start_time.as_deref(), Some("0:10"));
        assert_eq!(markers[0].quarter, Some(1));
        assert_eq!(markers[0].confidence, Some(0.9));
    }

    #[test]
    fn test_parse_wrapped_and_fenced() {
        let markers = parse_segmentation_response(
            "```json\n{\"plays\": [{\"start\": 5, \"end\": 9}, 42, \"x\"]}\n```",
        );
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].start_time.as_deref(), Some("5"));
        assert_eq!(markers[0].end_time.as_deref(), Some("9"));
    }

    #[test]
    fn test_parse_after_prose_with_braces() {
        let markers = parse_segmentation_response(
            "Each play uses the shape {id, start_time, end_time}:\n\
             [{\"id\": \"a\", \"start_time\": \"0:10\", \"end_time\": \"0:20\"}]",
        );
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id.as_deref(), Some("a"));
    }

    #[test]
    fn test_mistyped_fields_are_absent() {
        let markers = parse_segmentation_response(
            r#"[{"id": 7, "start_time": "0:10", "quarter": "second", "confidence": "high"}]"#,
        );
        assert_eq!(markers[0].id.as_deref(), Some("7"));
        assert_eq!(markers[0].quarter, None);
        assert_eq!(markers[0].confidence, None);
    }

    #[test]
    fn test_unparseable_is_empty() {
        assert!(parse_segmentation_response("").is_empty());
        assert!(parse_segmentation_response("I could not watch the video.").is_empty());
        assert!(parse_segmentation_response("{\"note\": \"no plays\"}").is_empty());
        assert!(parse_segmentation_response("42").is_empty());
    }

    #[tokio::test]
    async fn test_run_sanitizes_output() {
        let provider = ScriptedProvider::new(vec![Ok(r#"[
            {"id": "b", "start_time": "0:15", "end_time": "0:25"},
            {"id": "a", "start_time": "0:10", "end_time": "0:20"}
        ]"#
        .to_string())]);

        let units = fast_segmenter()
            .run(&provider, "https://example.test/game", "game-1")
            .await
            .unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, "a");
        assert_eq!(units[1].start.seconds(), 20);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].source_uri, "https://example.test/game");
        assert!(requests[0].clip.is_none());
    }

    #[tokio::test]
    async fn test_run_retries_then_succeeds() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited("429".to_string())),
            Ok("[]".to_string()),
        ]);
        let units = fast_segmenter().run(&provider, "uri", "id").await.unwrap();
        assert!(units.is_empty());
        assert_eq!(provider.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_fatal_error_propagates() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Other("bad key".to_string()))]);
        let err = fast_segmenter().run(&provider, "uri", "id").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Provider {
                stage: Stage::Segmentation,
                ..
            }
        ));
    }
}
