//! Resume-from-checkpoint tests
//!
//! With `resume` enabled, a run picks up Stage 1 units and completed Stage 2
//! entries left in the store by an interrupted run.

mod helpers;

use filmroom_ai::checkpoint::{self, ArtifactKind, MemoryCheckpointStore};
use filmroom_ai::stages::deep_analysis::parse_detailed_record;
use filmroom_ai::types::{AnalysisUnit, Stage1Checkpoint, Stage2Entry};
use filmroom_ai::{Pipeline, ProviderError, SourceSpec};
use helpers::{deep_reply, fast_settings, ScriptedProvider, SEGMENTATION_REPLY};
use std::sync::Arc;

fn source() -> SourceSpec {
    SourceSpec {
        uri: "files/game-week-3".to_string(),
        source_id: "week-3".to_string(),
    }
}

fn provider() -> ScriptedProvider {
    ScriptedProvider::new()
        .reply("segmentation", SEGMENTATION_REPLY)
        .reply("play_001", deep_reply("gain", 4))
        .reply("play_002", deep_reply("gain", 6))
        .reply("play_003", deep_reply("incomplete", 0))
        .reply("verification", "[]")
}

fn units() -> Vec<AnalysisUnit> {
    vec![
        AnalysisUnit::new("play_001", 10, 20),
        AnalysisUnit::new("play_002", 20, 25),
        AnalysisUnit::new("play_003", 60, 72),
    ]
}

async fn seeded_store(source_id: &str, completed: usize) -> Arc<MemoryCheckpointStore> {
    let store = Arc::new(MemoryCheckpointStore::new());
    let units = units();
    checkpoint::save_stage1(
        store.as_ref(),
        &Stage1Checkpoint {
            units: units.clone(),
            source_id: source_id.to_string(),
        },
    )
    .await
    .unwrap();

    let entries: Vec<Stage2Entry> = units[..completed]
        .iter()
        .map(|u| parse_detailed_record(&deep_reply("from checkpoint", 1), u))
        .collect();
    checkpoint::save_stage2(store.as_ref(), &entries).await.unwrap();
    store
}

#[tokio::test]
async fn test_interrupted_run_resumes_after_last_checkpoint() {
    // First run dies on the third unit
    let failing = Arc::new(provider().fail_always(
        "play_003",
        ProviderError::Status {
            status: 400,
            message: "video too long".to_string(),
        },
    ));
    let store = Arc::new(MemoryCheckpointStore::new());
    let first = Pipeline::new(failing, store.clone(), fast_settings());
    assert!(first.run(&source()).await.is_err());

    // Second run continues from the checkpoints
    let retry = Arc::new(provider());
    let mut settings = fast_settings();
    settings.resume = true;
    let second = Pipeline::new(retry.clone(), store.clone(), settings);
    let report = second.run(&source()).await.unwrap();

    assert_eq!(retry.labels(), vec!["play_003", "verification"]);
    assert_eq!(report.summary.reused, 2);
    assert_eq!(report.summary.analyzed, 1);
    assert_eq!(report.records.len(), 3);

    let stage2 = store.document(ArtifactKind::Stage2).unwrap();
    assert_eq!(stage2.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_resume_reuses_matching_entries() {
    let store = seeded_store("week-3", 2).await;
    let provider = Arc::new(provider());
    let mut settings = fast_settings();
    settings.resume = true;

    let report = Pipeline::new(provider.clone(), store, settings)
        .run(&source())
        .await
        .unwrap();

    assert_eq!(provider.labels(), vec!["play_003", "verification"]);
    assert_eq!(
        report.records[0].record.result.outcome.as_deref(),
        Some("from checkpoint")
    );
    assert_eq!(report.records[2].record.result.outcome.as_deref(), Some("incomplete"));
}

#[tokio::test]
async fn test_resume_ignores_checkpoint_of_other_source() {
    let store = seeded_store("week-2", 2).await;
    let provider = Arc::new(provider());
    let mut settings = fast_settings();
    settings.resume = true;

    Pipeline::new(provider.clone(), store, settings)
        .run(&source())
        .await
        .unwrap();

    // Stage 1 reruns; Stage 2 entries still match ids and ranges
    assert_eq!(provider.labels(), vec!["segmentation", "play_003", "verification"]);
}

#[tokio::test]
async fn test_checkpoints_ignored_without_resume() {
    let store = seeded_store("week-3", 3).await;
    let provider = Arc::new(provider());

    let report = Pipeline::new(provider.clone(), store, fast_settings())
        .run(&source())
        .await
        .unwrap();

    assert_eq!(
        provider.labels(),
        vec!["segmentation", "play_001", "play_002", "play_003", "verification"]
    );
    assert_eq!(report.summary.reused, 0);
}

#[tokio::test]
async fn test_corrupt_checkpoint_is_ignored() {
    let store = Arc::new(MemoryCheckpointStore::new());
    store.insert(ArtifactKind::Stage1, serde_json::json!({"units": "nope"}));
    store.insert(ArtifactKind::Stage2, serde_json::json!(42));
    let provider = Arc::new(provider());
    let mut settings = fast_settings();
    settings.resume = true;

    let report = Pipeline::new(provider.clone(), store, settings)
        .run(&source())
        .await
        .unwrap();

    assert_eq!(provider.calls_for("segmentation"), 1);
    assert_eq!(report.records.len(), 3);
}
