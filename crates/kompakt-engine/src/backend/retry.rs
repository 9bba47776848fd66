// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry policy with exponential backoff for remote compression calls.
//
// Errors are classified into Transient (retry) and Permanent (give up). Only
// transport-level failures and 5xx answers are transient; a bad payload will
// not get better by asking again.

use std::time::Duration;

use kompakt_core::config::BackendConfig;
use kompakt_core::error::KompaktError;
use kompakt_core::types::ErrorClass;
use tracing::{debug, info, warn};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&BackendConfig::default())
    }
}

impl From<&BackendConfig> for RetryConfig {
    fn from(config: &BackendConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry, the error is permanent.
    GiveUp,
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify an error for retry decisions.
pub fn classify_error(err: &KompaktError) -> ErrorClass {
    match err {
        KompaktError::Backend(detail) => classify_backend_detail(detail),
        KompaktError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::Interrupted => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        },
        _ => ErrorClass::Permanent,
    }
}

/// Classify a backend error detail string.
fn classify_backend_detail(detail: &str) -> ErrorClass {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("circuit open") || lower.contains("rejected payload") {
        return ErrorClass::Permanent;
    }

    if lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("connect error")
        || lower.contains("transport error")
        || lower.contains("broken pipe")
        || lower.contains("server-error")
    {
        return ErrorClass::Transient;
    }

    ErrorClass::Permanent
}

/// Decide whether to retry based on the error class and attempt count.
pub fn should_retry(err: &KompaktError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Permanent => {
            info!("permanent backend error, not retrying");
            RetryDecision::GiveUp
        }
        ErrorClass::Transient => {
            if attempt >= config.max_retries {
                warn!(attempt, max = config.max_retries, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                let delay = compute_delay(attempt, config);
                debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);
    Duration::from_millis(capped_ms)
}

/// Deterministic spread across [0, base) from the attempt number.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_transient() {
        let err = KompaktError::Backend("request timed out after 300s".into());
        assert_eq!(classify_error(&err), ErrorClass::Transient);
        let err = KompaktError::Backend("server-error 503 Service Unavailable".into());
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }

    #[test]
    fn rejected_payload_is_permanent() {
        let err = KompaktError::Backend("rejected payload: HTML error page".into());
        assert_eq!(classify_error(&err), ErrorClass::Permanent);
        let err = KompaktError::Backend("client-error 413 Payload Too Large".into());
        assert_eq!(classify_error(&err), ErrorClass::Permanent);
        assert_eq!(
            classify_error(&KompaktError::Validation("2 pages, expected 3".into())),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn retry_respects_max() {
        let config = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let err = KompaktError::Backend("connection refused".into());
        assert!(matches!(should_retry(&err, 0, &config), RetryDecision::RetryAfter(_)));
        assert!(matches!(should_retry(&err, 3, &config), RetryDecision::Exhausted));
    }

    #[test]
    fn permanent_error_never_retries() {
        let err = KompaktError::Backend("rejected payload: not a document".into());
        assert!(matches!(
            should_retry(&err, 0, &RetryConfig::default()),
            RetryDecision::GiveUp
        ));
    }

    #[test]
    fn delay_increases_and_is_capped() {
        let config = RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        };
        let d0 = compute_delay(0, &config);
        let d1 = compute_delay(1, &config);
        let d2 = compute_delay(2, &config);
        assert!(d1 > d0);
        assert!(d2 > d1);
        assert!(compute_delay(20, &config) <= Duration::from_secs(2));
    }
}
