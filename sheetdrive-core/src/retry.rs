//! Retry policy for remote calls
//!
//! A failed call is either *retryable* (transport error code in the
//! configured set, HTTP 429/500/502/503/504, or, when no status is known, a
//! message mentioning one of those statuses) or *fatal*. Retryable failures
//! are retried with capped exponential backoff plus up to 10% jitter; a
//! server-provided `Retry-After` replaces the computed delay for that
//! attempt. Fatal failures surface after a single attempt.

use std::future::Future;
use std::time::Duration;

use crate::config::default_retryable_codes;
use crate::error::{Error, Result};
use crate::sheets::RemoteError;

/// HTTP statuses that indicate a transient condition.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Explicit retry configuration handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Transport error codes treated as transient
    pub retryable_codes: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30000),
            retryable_codes: default_retryable_codes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Fatal,
}

impl RetryPolicy {
    /// A policy that never waits, for tests and tight loops.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn classify(&self, error: &RemoteError) -> Classification {
        if let Some(status) = error.status {
            return if RETRYABLE_STATUSES.contains(&status) {
                Classification::Retryable
            } else {
                Classification::Fatal
            };
        }

        if let Some(code) = &error.code {
            if self.retryable_codes.iter().any(|c| c.eq_ignore_ascii_case(code)) {
                return Classification::Retryable;
            }
        }

        let mentions_status = RETRYABLE_STATUSES
            .iter()
            .any(|status| error.message.contains(&status.to_string()));
        if mentions_status {
            Classification::Retryable
        } else {
            Classification::Fatal
        }
    }

    /// `min(max_delay, base_delay * 2^attempt)`, without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis();
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let max_ms = self.max_delay.as_millis().max(base_ms);
        let multiplier = 1u128 << attempt.min(20);
        let backoff_ms = base_ms.saturating_mul(multiplier).min(max_ms);
        Duration::from_millis(u64::try_from(backoff_ms).unwrap_or(u64::MAX))
    }

    /// Delay before retry number `attempt` (0-based) after `error`.
    pub fn delay_for(&self, attempt: u32, error: &RemoteError) -> Duration {
        if let Some(wait) = error.retry_after {
            return wait;
        }
        let backoff = self.backoff(attempt);
        backoff + backoff.mul_f64(rand::random::<f64>() * 0.1)
    }
}

/// Run `op`, retrying retryable failures according to `policy`.
///
/// `principal` names the identity the spreadsheet must be shared with; it
/// ends up in the hint of permission errors.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    principal: Option<&str>,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, RemoteError>>,
{
    let total = policy.max_attempts + 1;
    let mut attempt = 0u32;

    loop {
        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        attempt += 1;

        if policy.classify(&error) == Classification::Fatal {
            tracing::debug!(label, attempt, error = %error, "Fatal remote error");
            return Err(into_error(error, principal));
        }

        if attempt >= total {
            tracing::warn!(label, attempts = attempt, error = %error, "Retries exhausted");
            return Err(Error::Network {
                attempts: attempt,
                message: error.to_string(),
            });
        }

        let delay = policy.delay_for(attempt - 1, &error);
        tracing::warn!(
            label,
            attempt,
            max_attempts = total,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient error, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Map a fatal remote failure onto the crate taxonomy.
pub fn into_error(error: RemoteError, principal: Option<&str>) -> Error {
    match error.status {
        Some(401) => Error::Auth(error.message),
        Some(403) => Error::Permission {
            message: error.message,
            hint: Some(match principal {
                Some(email) => format!("share the spreadsheet with {} as an editor", email),
                None => "share the spreadsheet with the service account as an editor".to_string(),
            }),
        },
        Some(400) => Error::Validation {
            message: error.message,
            suggestion: Some("check the tab name and range".to_string()),
        },
        Some(404) => Error::Validation {
            message: error.message,
            suggestion: Some("check the spreadsheet id".to_string()),
        },
        Some(status) => Error::Remote {
            status,
            message: error.message,
        },
        None => Error::Remote {
            status: 0,
            message: error.to_string(),
        },
    }
}
