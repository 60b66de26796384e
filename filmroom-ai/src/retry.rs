//! Retry/backoff controller for provider calls
//!
//! Every provider call goes through [`with_backoff`]. Retriable failures
//! (see [`ProviderError::is_retriable`]) sleep `base * 2^attempt ± jitter`
//! before the next attempt; anything else propagates immediately.

use crate::provider::ProviderError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    /// Maximum random offset added to or subtracted from each delay
    pub jitter: Duration,
    /// Re-attempts after the first call; total attempts = max_retries + 1
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(2000),
            jitter: Duration::from_millis(1000),
            max_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before re-attempt number `attempt` (0-based), without jitter
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay.saturating_mul(factor)
    }

    /// Nominal delay shifted by a random offset in `[-jitter, +jitter]`,
    /// never below zero
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let jitter_ms = self.jitter.as_millis().min(i64::MAX as u128) as i64;
        if jitter_ms == 0 {
            return nominal;
        }

        let offset = rand::thread_rng().gen_range(-jitter_ms..=jitter_ms);
        if offset >= 0 {
            nominal.saturating_add(Duration::from_millis(offset as u64))
        } else {
            nominal.saturating_sub(Duration::from_millis(offset.unsigned_abs()))
        }
    }
}

/// Run `operation`, retrying retriable failures with exponential backoff.
///
/// # Arguments
/// * `label` - Name for logging (e.g. "segmentation", a unit id)
/// * `policy` - Delay and attempt limits
/// * `operation` - Async closure performing one provider call
///
/// # Returns
/// The first successful result, the first fatal error, or the last
/// retriable error once `policy.max_retries` re-attempts are exhausted.
pub async fn with_backoff<F, Fut, T>(
    label: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(label, attempts = attempt + 1, "Provider call succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retriable() {
                    tracing::error!(label, attempt = attempt + 1, error = %err, "Provider call failed (not retriable)");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::error!(
                        label,
                        attempts = attempt + 1,
                        error = %err,
                        "Provider call failed: retries exhausted"
                    );
                    return Err(err);
                }

                let delay = policy.backoff_delay(attempt);
                tracing::warn!(
                    label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retriable provider failure, backing off"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
