//! Error-kind taxonomy shared across crate boundaries.
//!
//! Every failure that crosses the task runtime is classified into one
//! of these kinds. The runtime uses the classification to pick a retry
//! schedule; the API surfaces it as `error_code` on jobs and tasks.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Classified failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input from the caller. Never retried.
    Validation,
    /// Referenced artifact absent. Never retried.
    NotFound,
    /// Unique-constraint violation. Never retried.
    Conflict,
    /// Generic external-API failure. Retried on the base schedule.
    Provider,
    /// Rate-limit or quota exhaustion. Retried on the slow schedule.
    Quota,
    /// The provider refused the content. Permanently failed.
    ContentPolicy,
    /// Deadline exceeded. Retried on the base schedule.
    Timeout,
    /// Video assembly found missing upstream artifacts.
    IncompleteMaterials,
    /// The adapter could not parse provider output. Retried once.
    MalformedResponse,
    /// Cooperative cancellation. Never retried.
    Cancelled,
    /// Infrastructure failure (database, queue, blob store).
    Internal,
}

/// Retry schedule selected for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Never retry; the task fails terminally.
    Never,
    /// Exponential backoff, base 2 s, capped at 60 s.
    Base,
    /// Exponential backoff, base 2 s, capped at 300 s.
    Slow,
    /// Retried exactly once, then terminal.
    Once,
}

impl RetryClass {
    const BASE: Duration = Duration::from_secs(2);

    /// Backoff delay before the given retry attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        let cap = match self {
            RetryClass::Never => return None,
            RetryClass::Base | RetryClass::Once => Duration::from_secs(60),
            RetryClass::Slow => Duration::from_secs(300),
        };
        let exp = attempt.saturating_sub(1).min(16);
        Some(Self::BASE.saturating_mul(2u32.pow(exp)).min(cap))
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Provider => "provider_error",
            ErrorKind::Quota => "quota_error",
            ErrorKind::ContentPolicy => "content_policy_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::IncompleteMaterials => "incomplete_materials",
            ErrorKind::MalformedResponse => "malformed_response",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal_error",
        }
    }

    /// Retry schedule for this kind of failure.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ErrorKind::Provider | ErrorKind::Timeout | ErrorKind::Internal => RetryClass::Base,
            ErrorKind::Quota => RetryClass::Slow,
            ErrorKind::MalformedResponse => RetryClass::Once,
            ErrorKind::Validation
            | ErrorKind::NotFound
            | ErrorKind::Conflict
            | ErrorKind::ContentPolicy
            | ErrorKind::IncompleteMaterials
            | ErrorKind::Cancelled => RetryClass::Never,
        }
    }

    /// Whether the task runtime may re-attempt this failure at all.
    pub fn is_retryable(&self) -> bool {
        self.retry_class() != RetryClass::Never
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_policy_is_never_retried() {
        assert!(!ErrorKind::ContentPolicy.is_retryable());
        assert_eq!(ErrorKind::ContentPolicy.retry_class().delay(1), None);
    }

    #[test]
    fn base_backoff_doubles_and_caps() {
        let class = ErrorKind::Provider.retry_class();
        assert_eq!(class.delay(1), Some(Duration::from_secs(2)));
        assert_eq!(class.delay(2), Some(Duration::from_secs(4)));
        assert_eq!(class.delay(3), Some(Duration::from_secs(8)));
        assert_eq!(class.delay(10), Some(Duration::from_secs(60)));
    }

    #[test]
    fn quota_backoff_uses_slow_cap() {
        let class = ErrorKind::Quota.retry_class();
        assert_eq!(class.delay(8), Some(Duration::from_secs(256)));
        assert_eq!(class.delay(9), Some(Duration::from_secs(300)));
    }
}
