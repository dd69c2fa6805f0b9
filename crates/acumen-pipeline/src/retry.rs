//! Retry logic with configurable backoff policies for stage execution.

use std::time::Duration;

use acumen_types::{AcumenError, Result};
use uuid::Uuid;

use crate::events::{EventEmitter, QueryEvent};

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential { base: Duration, max: Duration },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let millis = base.as_millis() as u64 * 2u64.saturating_pow(attempt);
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Execute a stage closure with retry logic.
///
/// The closure `f` is called up to `max_attempts` times. A retry occurs only
/// when the error satisfies [`AcumenError::is_transient`]; permanent errors
/// are returned immediately. When a transient error survives the final
/// attempt, the result is [`AcumenError::RetriesExhausted`], except for a
/// final [`AcumenError::StageTimeout`], which is returned as-is so the caller
/// can mark the stage `TimedOut` rather than generically failed.
///
/// Between attempts the function sleeps for the duration dictated by `policy`
/// and emits a [`QueryEvent::StageRetrying`] event.
pub async fn execute_with_retry<F, Fut, T>(
    f: F,
    max_attempts: u32,
    policy: &BackoffPolicy,
    stage: &str,
    emitter: &EventEmitter,
    query_id: Uuid,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1u32;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for_attempt(attempt - 1);
                tracing::warn!(stage, attempt, delay_ms = %delay.as_millis(), error = %e, "Transient stage error, retrying");
                emitter.emit(QueryEvent::StageRetrying {
                    query_id,
                    stage: stage.to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(stage, attempts = attempt, error = %e, "Retries exhausted");
                if let AcumenError::StageTimeout { .. } = e {
                    return Err(e);
                }
                return Err(AcumenError::RetriesExhausted {
                    stage: stage.to_string(),
                    attempts: attempt,
                });
            }
            Err(e) => return Err(e),
        }
    }
}
