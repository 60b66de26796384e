//! Error types for filmroom-ai
//!
//! Parse failures, checkpoint I/O failures and degenerate units are handled
//! where they occur and never surface here. What remains is fatal for the
//! current run.

use crate::provider::ProviderError;
use crate::types::Stage;
use thiserror::Error;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Provider call failed fatally or exhausted its retries
    #[error("{stage} call '{label}' failed: {source}")]
    Provider {
        stage: Stage,
        label: String,
        #[source]
        source: ProviderError,
    },

    /// Final artifact could not be written
    #[error("Failed to write final artifact: {0}")]
    Artifact(#[source] filmroom_common::Error),
}

impl PipelineError {
    pub fn provider(stage: Stage, label: impl Into<String>, source: ProviderError) -> Self {
        Self::Provider {
            stage,
            label: label.into(),
            source,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
