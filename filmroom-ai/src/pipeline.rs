//! Pipeline orchestration
//!
//! Runs Stage 1 → Stage 2 → Stage 3 → aggregation for one source, strictly
//! sequentially. Provider and checkpoint store are injected, so tests drive
//! the whole run in-process.
//!
//! Failure model:
//! - Provider failures (fatal or retries exhausted) abort the run
//! - Stage checkpoint write failures are logged and the run continues
//! - Failure to write the final aggregated artifact aborts the run

use crate::aggregator::Aggregator;
use crate::checkpoint::{self, ArtifactKind, CheckpointStore};
use crate::config::PipelineSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::events::EventEmitter;
use crate::provider::AnalysisProvider;
use crate::sanitizer::MarkerSanitizer;
use crate::stages::{DeepAnalyzer, Segmenter, Verifier};
use crate::types::{
    AggregatedRecord, AnalysisUnit, PipelineEvent, Stage, Stage1Checkpoint, Stage2Entry,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use uuid::Uuid;

/// The recording to analyze
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    /// Opaque reference handed to the provider
    pub uri: String,
    /// Identifier stored in `stage1.json`
    pub source_id: String,
}

/// Counts and timing for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source_id: String,
    pub units: usize,
    pub analyzed: usize,
    pub reused: usize,
    pub skipped: usize,
    pub checkpoint_failures: usize,
    pub reports: usize,
    pub proposals_applied: usize,
    pub proposals_below_threshold: usize,
    pub proposals_rejected: usize,
    pub duplicates_removed: usize,
    pub records: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Successful run result
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub records: Vec<AggregatedRecord>,
}

/// Three-stage annotation pipeline
pub struct Pipeline {
    provider: Arc<dyn AnalysisProvider>,
    store: Arc<dyn CheckpointStore>,
    settings: PipelineSettings,
    events: Option<broadcast::Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn AnalysisProvider>,
        store: Arc<dyn CheckpointStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
            events: None,
        }
    }

    /// Publish progress events on `tx`
    pub fn with_events(mut self, tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Execute one complete run
    ///
    /// # Returns
    /// The aggregated records and run summary; `aggregated` has been written
    /// to the checkpoint store.
    ///
    /// # Errors
    /// The first fatal provider error, or a failed final write. Checkpoints
    /// written before the failure stay in the store.
    pub async fn run(&self, source: &SourceSpec) -> PipelineResult<RunReport> {
        let run_id = Uuid::new_v4();
        let events = EventEmitter::new(run_id, self.events.clone());

        tracing::info!(
            run_id = %run_id,
            source_id = %source.source_id,
            provider = self.provider.name(),
            "Starting annotation run"
        );
        events.emit(|run_id| PipelineEvent::RunStarted {
            run_id,
            source_id: source.source_id.clone(),
        });

        match self.run_stages(source, &events).await {
            Ok(report) => {
                tracing::info!(
                    run_id = %run_id,
                    records = report.summary.records,
                    "Annotation run complete"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Annotation run failed");
                events.emit(|run_id| PipelineEvent::RunFailed {
                    run_id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_stages(&self, source: &SourceSpec, events: &EventEmitter) -> PipelineResult<RunReport> {
        let started_at = Utc::now();
        let run_timer = Instant::now();
        let provider = self.provider.as_ref();
        let store = self.store.as_ref();
        let mut checkpoint_failures = 0usize;

        // Stage 1
        let timer = stage_started(events, Stage::Segmentation);
        let units = match self.resumable_units(&source.source_id).await {
            Some(units) => units,
            None => {
                let segmenter = Segmenter::new(
                    self.settings.retry,
                    MarkerSanitizer::new(self.settings.min_segment_secs),
                );
                let units = segmenter.run(provider, &source.uri, &source.source_id).await?;
                let artifact = Stage1Checkpoint {
                    units,
                    source_id: source.source_id.clone(),
                };
                if let Err(e) = checkpoint::save_stage1(store, &artifact).await {
                    checkpoint_failed(events, Stage::Segmentation, &e);
                    checkpoint_failures += 1;
                }
                artifact.units
            }
        };
        events.emit(|run_id| PipelineEvent::UnitsDiscovered {
            run_id,
            count: units.len(),
        });
        stage_completed(events, Stage::Segmentation, timer);

        // Stage 2
        let timer = stage_started(events, Stage::DeepAnalysis);
        let prior = self.resumable_entries().await;
        let analyzer = DeepAnalyzer::new(self.settings.retry, self.settings.inter_request_delay);
        let deep = analyzer
            .run(provider, store, &source.uri, &units, prior, events)
            .await?;
        checkpoint_failures += deep.checkpoint_failures;
        stage_completed(events, Stage::DeepAnalysis, timer);

        // Stage 3
        let timer = stage_started(events, Stage::Verification);
        let reports = Verifier::new(self.settings.retry)
            .run(provider, &source.uri, &deep.entries)
            .await?;
        if let Err(e) = checkpoint::save_stage3(store, &reports).await {
            checkpoint_failed(events, Stage::Verification, &e);
            checkpoint_failures += 1;
        }
        stage_completed(events, Stage::Verification, timer);

        // Aggregation
        let timer = stage_started(events, Stage::Aggregation);
        let aggregation =
            Aggregator::new(self.settings.override_threshold).aggregate(&units, &deep.entries, &reports);
        checkpoint::save_aggregated(store, &aggregation.records)
            .await
            .map_err(PipelineError::Artifact)?;
        stage_completed(events, Stage::Aggregation, timer);

        let summary = RunSummary {
            run_id: events.run_id(),
            source_id: source.source_id.clone(),
            units: units.len(),
            analyzed: deep.analyzed,
            reused: deep.reused,
            skipped: deep.skipped.len(),
            checkpoint_failures,
            reports: reports.len(),
            proposals_applied: aggregation.applied,
            proposals_below_threshold: aggregation.below_threshold,
            proposals_rejected: aggregation.rejected,
            duplicates_removed: aggregation.duplicates_removed,
            records: aggregation.records.len(),
            started_at,
            finished_at: Utc::now(),
        };

        events.emit(|run_id| PipelineEvent::RunCompleted {
            run_id,
            records: summary.records,
            duration_ms: run_timer.elapsed().as_millis() as u64,
        });

        Ok(RunReport {
            summary,
            records: aggregation.records,
        })
    }

    /// Units from an earlier Stage 1 checkpoint of the same source
    async fn resumable_units(&self, source_id: &str) -> Option<Vec<AnalysisUnit>> {
        if !self.settings.resume {
            return None;
        }
        match checkpoint::load::<Stage1Checkpoint>(self.store.as_ref(), ArtifactKind::Stage1).await {
            Ok(Some(artifact)) if artifact.source_id == source_id => {
                tracing::info!(units = artifact.units.len(), "Resuming from Stage 1 checkpoint");
                Some(artifact.units)
            }
            Ok(Some(artifact)) => {
                tracing::warn!(
                    checkpoint_source = %artifact.source_id,
                    "Stage 1 checkpoint belongs to another source, ignoring"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Stage 1 checkpoint unreadable, ignoring");
                None
            }
        }
    }

    /// Entries from an earlier Stage 2 checkpoint
    async fn resumable_entries(&self) -> Vec<Stage2Entry> {
        if !self.settings.resume {
            return Vec::new();
        }
        match checkpoint::load::<Vec<Stage2Entry>>(self.store.as_ref(), ArtifactKind::Stage2).await {
            Ok(Some(entries)) => {
                tracing::info!(entries = entries.len(), "Loaded Stage 2 checkpoint for resume");
                entries
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Stage 2 checkpoint unreadable, ignoring");
                Vec::new()
            }
        }
    }
}

fn stage_started(events: &EventEmitter, stage: Stage) -> Instant {
    tracing::info!(stage = %stage, "Stage started");
    events.emit(|run_id| PipelineEvent::StageStarted { run_id, stage });
    Instant::now()
}

fn stage_completed(events: &EventEmitter, stage: Stage, started: Instant) {
    let duration_ms = started.elapsed().as_millis() as u64;
    tracing::info!(stage = %stage, duration_ms, "Stage completed");
    events.emit(|run_id| PipelineEvent::StageCompleted {
        run_id,
        stage,
        duration_ms,
    });
}

fn checkpoint_failed(events: &EventEmitter, stage: Stage, error: &filmroom_common::Error) {
    tracing::warn!(stage = %stage, error = %error, "Checkpoint write failed, continuing");
    events.emit(|run_id| PipelineEvent::CheckpointFailed {
        run_id,
        stage,
        error: error.to_string(),
    });
}
