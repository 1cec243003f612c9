//! Provider error envelope.

use thiserror::Error;

use aicg_models::ErrorKind;

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Failures crossing the adapter boundary, pre-classified for the task
/// runtime's retry policy.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider quota exhausted: {0}")]
    Quota(String),

    #[error("Provider refused content: {0}")]
    ContentPolicy(String),

    #[error("Provider call timed out after {0} s")]
    Timeout(u64),

    #[error("Malformed provider response: {0}")]
    Malformed(String),

    #[error("Provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// Classify an HTTP status + body into the taxonomy.
    ///
    /// 429 is quota; 400 with a moderation marker is a content-policy
    /// refusal; everything else is a generic provider error.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 429 {
            return ProviderError::Quota(truncate(body));
        }
        let lower = body.to_ascii_lowercase();
        if status == 400
            && (lower.contains("content_policy")
                || lower.contains("content policy")
                || lower.contains("moderation")
                || lower.contains("safety"))
        {
            return ProviderError::ContentPolicy(truncate(body));
        }
        ProviderError::Api { status, message: truncate(body) }
    }

    /// Map into the shared error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Quota(_) => ErrorKind::Quota,
            ProviderError::ContentPolicy(_) => ErrorKind::ContentPolicy,
            ProviderError::Timeout(_) => ErrorKind::Timeout,
            ProviderError::Malformed(_) => ErrorKind::MalformedResponse,
            ProviderError::Api { .. } => ErrorKind::Provider,
            ProviderError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            ProviderError::Http(_) => ErrorKind::Provider,
            ProviderError::UnknownProvider(_) => ErrorKind::Validation,
        }
    }
}

fn truncate(s: &str) -> String {
    s.chars().take(512).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_quota() {
        let e = ProviderError::from_status(429, "rate limit exceeded");
        assert_eq!(e.kind(), ErrorKind::Quota);
    }

    #[test]
    fn moderation_refusal_is_content_policy() {
        let e = ProviderError::from_status(400, "{\"error\":{\"code\":\"content_policy_violation\"}}");
        assert_eq!(e.kind(), ErrorKind::ContentPolicy);
        assert!(!e.kind().is_retryable());
    }

    #[test]
    fn plain_400_is_provider_error() {
        // Unknown model names are passed through; a provider rejection
        // surfaces as a retryable provider error.
        let e = ProviderError::from_status(400, "{\"error\":\"model not found\"}");
        assert_eq!(e.kind(), ErrorKind::Provider);
        assert!(e.kind().is_retryable());
    }
}
