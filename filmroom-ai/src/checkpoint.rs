//! Checkpoint storage for stage artifacts
//!
//! Each stage owns one artifact and replaces it whole on every write. The
//! file store writes through a temp file and rename, so a reader never sees
//! a partial document. The memory store is for tests and dry runs.

use crate::types::{AggregatedRecord, Stage1Checkpoint, Stage2Entry, VerificationReport};
use async_trait::async_trait;
use filmroom_common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Artifacts persisted during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// `{units, source_id}`
    Stage1,
    /// Array of `{id, record, fieldConfidences}`, rewritten after every unit
    Stage2,
    /// Array of VerificationReport
    Stage3,
    /// Final array of AggregatedRecord
    Aggregated,
}

impl ArtifactKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Stage1 => "stage1.json",
            ArtifactKind::Stage2 => "stage2.json",
            ArtifactKind::Stage3 => "stage3.json",
            ArtifactKind::Aggregated => "aggregated.json",
        }
    }
}

/// Durable artifact storage, injected into the pipeline
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Replace the stored document for `kind`
    async fn write(&self, kind: ArtifactKind, document: &Value) -> Result<()>;

    /// Current document for `kind`, if any
    async fn read(&self, kind: ArtifactKind) -> Result<Option<Value>>;
}

/// Serialize and store a typed artifact
pub async fn save<T: Serialize + ?Sized + Sync>(
    store: &dyn CheckpointStore,
    kind: ArtifactKind,
    artifact: &T,
) -> Result<()> {
    let document = serde_json::to_value(artifact)?;
    store.write(kind, &document).await
}

/// Load and decode a typed artifact
pub async fn load<T: DeserializeOwned>(
    store: &dyn CheckpointStore,
    kind: ArtifactKind,
) -> Result<Option<T>> {
    match store.read(kind).await? {
        Some(document) => Ok(Some(serde_json::from_value(document)?)),
        None => Ok(None),
    }
}

pub async fn save_stage1(store: &dyn CheckpointStore, checkpoint: &Stage1Checkpoint) -> Result<()> {
    save(store, ArtifactKind::Stage1, checkpoint).await
}

pub async fn save_stage2(store: &dyn CheckpointStore, entries: &[Stage2Entry]) -> Result<()> {
    save(store, ArtifactKind::Stage2, entries).await
}

pub async fn save_stage3(store: &dyn CheckpointStore, reports: &[VerificationReport]) -> Result<()> {
    save(store, ArtifactKind::Stage3, reports).await
}

pub async fn save_aggregated(store: &dyn CheckpointStore, records: &[AggregatedRecord]) -> Result<()> {
    save(store, ArtifactKind::Aggregated, records).await
}

/// One JSON file per artifact inside a directory
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn write(&self, kind: ArtifactKind, document: &Value) -> Result<()> {
        let path = self.path_for(kind);
        let (target, document) = (path.clone(), document.clone());
        tokio::task::spawn_blocking(move || {
            filmroom_common::fs::write_json_atomic(&target, &document)
        })
        .await
        .map_err(join_error)??;
        tracing::debug!(path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn read(&self, kind: ArtifactKind) -> Result<Option<Value>> {
        let path = self.path_for(kind);
        tokio::task::spawn_blocking(move || filmroom_common::fs::read_json(&path))
            .await
            .map_err(join_error)?
    }
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("Checkpoint I/O task failed: {}", e),
    ))
}

/// In-memory store with write counting and failure injection
#[derive(Default)]
pub struct MemoryCheckpointStore {
    documents: Mutex<HashMap<ArtifactKind, Value>>,
    writes: Mutex<HashMap<ArtifactKind, usize>>,
    fail_writes: bool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every write fails with an I/O error
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Pre-populate a document (e.g. to exercise resume)
    pub fn insert(&self, kind: ArtifactKind, document: Value) {
        lock(&self.documents).insert(kind, document);
    }

    pub fn document(&self, kind: ArtifactKind) -> Option<Value> {
        lock(&self.documents).get(&kind).cloned()
    }

    /// Number of successful writes for `kind`
    pub fn write_count(&self, kind: ArtifactKind) -> usize {
        lock(&self.writes).get(&kind).copied().unwrap_or(0)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn write(&self, kind: ArtifactKind, document: &Value) -> Result<()> {
        if self.fail_writes {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("simulated write failure for {}", kind.file_name()),
            )));
        }
        lock(&self.documents).insert(kind, document.clone());
        *lock(&self.writes).entry(kind).or_insert(0) += 1;
        Ok(())
    }

    async fn read(&self, kind: ArtifactKind) -> Result<Option<Value>> {
        Ok(self.document(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisUnit, DetailedRecord};

    fn sample_entries(n: usize) -> Vec<Stage2Entry> {
        (0..n)
            .map(|i| Stage2Entry {
                id: format!("p{}", i),
                record: DetailedRecord {
                    play_id: format!("p{}", i),
                    ..Default::default()
                },
                field_confidences: Vec::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        let checkpoint = Stage1Checkpoint {
            units: vec![AnalysisUnit::new("p1", 10, 20)],
            source_id: "game-1".to_string(),
        };
        save_stage1(&store, &checkpoint).await.unwrap();

        assert!(dir.path().join("stage1.json").exists());
        let loaded: Option<Stage1Checkpoint> = load(&store, ArtifactKind::Stage1).await.unwrap();
        assert_eq!(loaded, Some(checkpoint));
    }

    #[tokio::test]
    async fn test_file_store_rewrites_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());

        save_stage2(&store, &sample_entries(1)).await.unwrap();
        save_stage2(&store, &sample_entries(3)).await.unwrap();

        let loaded: Vec<Stage2Entry> = load(&store, ArtifactKind::Stage2).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(!dir.path().join("stage2.json.tmp").exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_file_store_on_single_threaded_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("nested"));

        save_stage3(&store, &[]).await.unwrap();
        let loaded: Option<Vec<VerificationReport>> =
            load(&store, ArtifactKind::Stage3).await.unwrap();
        assert_eq!(loaded, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_file_store_write_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let store = FileCheckpointStore::new(&blocker);

        let result = save_stage3(&store, &[]).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_file_store_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let loaded: Option<Vec<VerificationReport>> =
            load(&store, ArtifactKind::Stage3).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_memory_store_counts_writes() {
        let store = MemoryCheckpointStore::new();
        save_stage2(&store, &sample_entries(1)).await.unwrap();
        save_stage2(&store, &sample_entries(2)).await.unwrap();

        assert_eq!(store.write_count(ArtifactKind::Stage2), 2);
        assert_eq!(store.write_count(ArtifactKind::Stage3), 0);
        let doc = store.document(ArtifactKind::Stage2).unwrap();
        assert_eq!(doc.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemoryCheckpointStore::failing();
        let result = save_stage3(&store, &[]).await;
        assert!(matches!(result, Err(Error::Io(_))));
        assert!(store.document(ArtifactKind::Stage3).is_none());
    }
}
