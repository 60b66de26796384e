// Gemini generateContent adapter
//
// Concept: Issue analysis requests against a video already uploaded to (or
// addressable by) the Gemini API, referenced by URI
// Rate limiting: token bucket of `requests_per_minute`, awaited before every
// call
//
// API Documentation: https://ai.google.dev/api/generate-content

use super::{AnalysisProvider, ProviderError, ProviderRequest};
use crate::config::ProviderConfig;
use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Gemini API client
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl GeminiProvider {
    /// Build a client from the `[provider]` config section
    ///
    /// # Arguments
    /// * `config` - Model, endpoint, timeout and rate settings
    /// * `api_key` - Resolved key (see `config::resolve_api_key`)
    ///
    /// # Errors
    /// `ProviderError::Other` if the HTTP client cannot be built
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Other(format!("Failed to build HTTP client: {}", e)))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            rate_limiter,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl AnalysisProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(label = %request.label, model = %self.model, "Sending generateContent request");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ProviderError::Unavailable(e.to_string())
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("Failed to read response body: {}", e)))?;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, &body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Other(format!("Malformed generateContent envelope: {}", e)))?;
        Ok(response_text(&parsed))
    }
}

/// generateContent request body for one provider request
pub fn build_request_body(request: &ProviderRequest) -> Value {
    let mut video = json!({
        "fileData": {
            "fileUri": request.source_uri,
            "mimeType": "video/*"
        }
    });
    if let Some(clip) = request.clip {
        video["videoMetadata"] = json!({
            "startOffset": format!("{}s", clip.start.seconds()),
            "endOffset": format!("{}s", clip.end.seconds()),
        });
    }

    let mut generation_config = json!({ "responseMimeType": "application/json" });
    if let Some(schema) = &request.response_schema {
        generation_config["responseSchema"] = schema.clone();
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [video, { "text": request.prompt }]
        }],
        "generationConfig": generation_config
    })
}

/// Map a non-success status (and its error body) to a ProviderError
pub fn classify_status(status: u16, body: &str) -> ProviderError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.status.is_empty() => envelope.error.message,
        Ok(envelope) => format!("{}: {}", envelope.error.status, envelope.error.message),
        Err(_) => body.chars().take(500).collect(),
    };

    match status {
        429 => ProviderError::RateLimited(message),
        503 => ProviderError::Unavailable(message),
        _ => ProviderError::Status { status, message },
    }
}

/// Concatenated text parts of the first candidate
fn response_text(response: &GenerateResponse) -> String {
    response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default()
}
