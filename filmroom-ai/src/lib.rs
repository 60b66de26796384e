//! filmroom-ai library
//!
//! Three-stage annotation pipeline for game recordings: segmentation into
//! plays, per-play deep analysis with incremental checkpoints, cross-play
//! verification, and a confidence-gated merge into the final dataset.

pub mod aggregator;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod events;
pub mod fields;
pub mod pipeline;
pub mod prompts;
pub mod provider;
pub mod response;
pub mod retry;
pub mod sanitizer;
pub mod stages;
pub mod types;

pub use aggregator::{AggregationOutcome, Aggregator};
pub use checkpoint::{ArtifactKind, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{Pipeline, RunReport, RunSummary, SourceSpec};
pub use provider::{AnalysisProvider, ProviderError, ProviderRequest};
pub use retry::{with_backoff, RetryPolicy};
pub use sanitizer::MarkerSanitizer;
