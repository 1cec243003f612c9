//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Enqueue failed: {reason}")]
    EnqueueFailed { reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl QueueError {
    pub fn enqueue_failed(reason: impl Into<String>) -> Self {
        Self::EnqueueFailed { reason: reason.into() }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
