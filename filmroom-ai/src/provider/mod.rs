//! External analysis provider contract
//!
//! The pipeline never talks to a model directly. Every stage builds a
//! [`ProviderRequest`] and hands it to an [`AnalysisProvider`] through the
//! retry controller (`crate::retry`). Responses come back as raw text and are
//! validated at the parse boundary (`crate::response`).

use async_trait::async_trait;
use filmroom_common::Timecode;
use serde_json::Value;
use thiserror::Error;

pub mod gemini;

/// HTTP status codes that signal rate limiting or transient unavailability
const RETRIABLE_STATUS: [u16; 4] = [429, 502, 503, 504];

/// Message fragments (lowercase) that signal a retriable failure
const RETRIABLE_PATTERNS: [&str; 10] = [
    "429",
    "rate limit",
    "rate-limit",
    "resource_exhausted",
    "resource exhausted",
    "quota",
    "503",
    "unavailable",
    "overloaded",
    "try again",
];

/// Time range a request is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRange {
    pub start: Timecode,
    pub end: Timecode,
}

/// One call to the provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    /// Diagnostic label (stage name or unit id)
    pub label: String,
    /// Opaque reference to the source recording
    pub source_uri: String,
    pub prompt: String,
    /// Stage 2 requests are scoped to one unit's range
    pub clip: Option<ClipRange>,
    /// Structured output schema, when the stage defines one
    pub response_schema: Option<Value>,
}

/// Provider failure, classified for the retry controller
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    /// Rate-limit and transient-unavailability failures are worth retrying,
    /// detected from the status code or a pattern in the message.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::RateLimited(_) | Self::Unavailable(_) => true,
            Self::Status { status, message } => {
                RETRIABLE_STATUS.contains(status) || message_is_retriable(message)
            }
            Self::Transport(message) | Self::Other(message) => message_is_retriable(message),
        }
    }
}

fn message_is_retriable(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    RETRIABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// The external analyzer
///
/// Implementations return the response text as-is; they must not retry or
/// sleep themselves.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Provider identifier for logs (e.g. "gemini")
    fn name(&self) -> &'static str;

    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError>;
}
