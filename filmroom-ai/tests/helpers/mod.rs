//! Shared test helpers for filmroom-ai integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use filmroom_ai::checkpoint::{ArtifactKind, CheckpointStore, MemoryCheckpointStore};
use filmroom_ai::config::PipelineSettings;
use filmroom_ai::provider::{AnalysisProvider, ProviderError, ProviderRequest};
use filmroom_ai::RetryPolicy;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Provider answering by request label ("segmentation", "verification" or a
/// unit id). Queued failures for a label are returned before its reply.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    always_fail: Mutex<HashMap<String, ProviderError>>,
    log: Mutex<Vec<(String, Instant)>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, label: &str, text: impl Into<String>) -> Self {
        self.replies.lock().unwrap().insert(label.to_string(), text.into());
        self
    }

    pub fn fail_first(self, label: &str, errors: Vec<ProviderError>) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(label.to_string(), errors.into());
        self
    }

    pub fn fail_always(self, label: &str, error: ProviderError) -> Self {
        self.always_fail.lock().unwrap().insert(label.to_string(), error);
        self
    }

    /// Labels in issuance order
    pub fn labels(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn calls_for(&self, label: &str) -> usize {
        self.log.lock().unwrap().iter().filter(|(l, _)| l == label).count()
    }

    pub fn timestamps(&self) -> Vec<(String, Instant)> {
        self.log.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        self.log
            .lock()
            .unwrap()
            .push((request.label.clone(), Instant::now()));
        self.requests.lock().unwrap().push(request.clone());

        if let Some(error) = self.always_fail.lock().unwrap().get(&request.label) {
            return Err(error.clone());
        }
        if let Some(queue) = self.failures.lock().unwrap().get_mut(&request.label) {
            if let Some(error) = queue.pop_front() {
                return Err(error);
            }
        }
        Ok(self
            .replies
            .lock()
            .unwrap()
            .get(&request.label)
            .cloned()
            .unwrap_or_else(|| "{}".to_string()))
    }
}

/// Memory store whose writes fail for selected artifacts
pub struct SelectiveFailStore {
    inner: MemoryCheckpointStore,
    failing: HashSet<ArtifactKind>,
}

impl SelectiveFailStore {
    pub fn new(failing: &[ArtifactKind]) -> Self {
        Self {
            inner: MemoryCheckpointStore::new(),
            failing: failing.iter().copied().collect(),
        }
    }

    pub fn document(&self, kind: ArtifactKind) -> Option<Value> {
        self.inner.document(kind)
    }
}

#[async_trait]
impl CheckpointStore for SelectiveFailStore {
    async fn write(&self, kind: ArtifactKind, document: &Value) -> filmroom_common::Result<()> {
        if self.failing.contains(&kind) {
            return Err(filmroom_common::Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only output folder",
            )));
        }
        self.inner.write(kind, document).await
    }

    async fn read(&self, kind: ArtifactKind) -> filmroom_common::Result<Option<Value>> {
        self.inner.read(kind).await
    }
}

/// Settings with no waiting between requests and near-zero backoff
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        retry: RetryPolicy {
            base_delay: Duration::from_millis(1),
            jitter: Duration::ZERO,
            max_retries: 2,
        },
        inter_request_delay: Duration::ZERO,
        ..PipelineSettings::default()
    }
}

/// Segmentation reply: unordered, overlapping, one duplicate id
pub const SEGMENTATION_REPLY: &str = r#"```json
[
  {"id": "play_002", "start_time": "0:00:15", "end_time": "0:00:25", "quarter": 1,
   "offense": "Home", "defense": "Away", "confidence": 0.9},
  {"id": "play_001", "start_time": "0:00:10", "end_time": "0:00:20", "quarter": 1,
   "offense": "Home", "defense": "Away", "confidence": 0.95},
  {"id": "play_003", "start_time": "0:01:00", "end_time": "0:01:12", "quarter": 1,
   "offense": "Away", "defense": "Home"}
]
```"#;

pub fn deep_reply(outcome: &str, yards: i64) -> String {
    serde_json::json!({
        "situation": {"down": 1, "distance": 10, "yard_line": "OWN 25"},
        "classification": {"play_type": "run", "direction": "left"},
        "result": {"outcome": outcome, "yards_gained": yards, "scoring_play": false},
        "field_confidences": [
            {"path": "result.outcome", "value": outcome, "confidence": 0.8}
        ]
    })
    .to_string()
}
