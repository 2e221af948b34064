//! Pure helpers for sync orchestration: failure classification and backoff.

use serde::{Deserialize, Serialize};

/// Retry policy classification for delivery failures.
///
/// A transport-level failure (no response, timeout, connection reset) is
/// always retryable. A well-formed rejection from the server would fail
/// identically forever and is permanent until an operator intervenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    Retryable,
    Permanent,
}

/// Aggregate result of one drain attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub timestamp: Option<String>,
    pub sent: usize,
    pub failed: usize,
}

impl SyncOutcome {
    pub fn offline() -> Self {
        Self {
            success: false,
            timestamp: None,
            sent: 0,
            failed: 0,
        }
    }
}

/// Classify an HTTP status into retry behavior.
///
/// 409 (conflict) and 401/403 (authorization) are server-confirmed
/// rejections here, not retryable: there is no token-refresh loop in this
/// subsystem, so retrying them without operator action cannot succeed.
pub fn classify_http_status(status: u16) -> RetryClass {
    match status {
        408 | 425 | 429 => RetryClass::Retryable,
        500..=599 => RetryClass::Retryable,
        _ => RetryClass::Permanent,
    }
}

/// Exponential backoff in seconds with cap: `base * 2^n`, exponent clamped.
pub fn backoff_seconds(retry_count: i32) -> i64 {
    const MAX_EXPONENT: i32 = 8;
    const BASE_DELAY_SECONDS: i64 = 5;

    let capped = i64::from(retry_count.clamp(0, MAX_EXPONENT));
    2_i64.pow(capped as u32) * BASE_DELAY_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(500), RetryClass::Retryable);
        assert_eq!(classify_http_status(503), RetryClass::Retryable);
        assert_eq!(classify_http_status(429), RetryClass::Retryable);
        assert_eq!(classify_http_status(408), RetryClass::Retryable);
        assert_eq!(classify_http_status(400), RetryClass::Permanent);
        assert_eq!(classify_http_status(409), RetryClass::Permanent);
        assert_eq!(classify_http_status(401), RetryClass::Permanent);
        assert_eq!(classify_http_status(422), RetryClass::Permanent);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_seconds(0), 5);
        assert_eq!(backoff_seconds(1), 10);
        assert_eq!(backoff_seconds(2), 20);
        assert_eq!(backoff_seconds(9), backoff_seconds(8));
    }

    #[test]
    fn backoff_is_monotone_up_to_cap() {
        let mut previous = 0;
        for attempt in 0..12 {
            let delay = backoff_seconds(attempt);
            assert!(delay >= previous, "delay decreased at attempt {attempt}");
            previous = delay;
        }
    }
}
