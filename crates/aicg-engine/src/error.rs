//! Engine error types.

use thiserror::Error;

use aicg_models::ErrorKind;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Incomplete materials: missing {}", missing.join(", "))]
    IncompleteMaterials { missing: Vec<String> },

    #[error("Task cancelled")]
    Cancelled,

    #[error("Deadline exceeded after {0} s")]
    Deadline(u64),

    #[error("Provider error: {0}")]
    Provider(#[from] aicg_providers::ProviderError),

    #[error("Database error: {0}")]
    Db(aicg_db::DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] aicg_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] aicg_queue::QueueError),

    #[error("Media error: {0}")]
    Media(aicg_media::MediaError),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn incomplete_materials(missing: Vec<String>) -> Self {
        Self::IncompleteMaterials { missing }
    }

    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    /// Classify into the shared taxonomy; the runtime keys its retry
    /// decision off this.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::IncompleteMaterials { .. } => ErrorKind::IncompleteMaterials,
            EngineError::Cancelled => ErrorKind::Cancelled,
            EngineError::Deadline(_) => ErrorKind::Timeout,
            EngineError::Provider(e) => e.kind(),
            EngineError::Db(aicg_db::DbError::NotFound { .. }) => ErrorKind::NotFound,
            EngineError::Db(aicg_db::DbError::Conflict(_)) => ErrorKind::Conflict,
            EngineError::Db(_) => ErrorKind::Internal,
            EngineError::Storage(_) => ErrorKind::Internal,
            EngineError::Queue(_) => ErrorKind::Internal,
            EngineError::Media(aicg_media::MediaError::Cancelled) => ErrorKind::Cancelled,
            EngineError::Media(aicg_media::MediaError::Timeout(_)) => ErrorKind::Timeout,
            EngineError::Media(_) => ErrorKind::Internal,
            EngineError::Download(_) => ErrorKind::Provider,
            EngineError::Serde(_) => ErrorKind::MalformedResponse,
        }
    }
}

impl From<aicg_db::DbError> for EngineError {
    fn from(e: aicg_db::DbError) -> Self {
        EngineError::Db(e)
    }
}

impl From<aicg_media::MediaError> for EngineError {
    fn from(e: aicg_media::MediaError) -> Self {
        match e {
            aicg_media::MediaError::Cancelled => EngineError::Cancelled,
            other => EngineError::Media(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_materials_lists_gaps() {
        let e = EngineError::incomplete_materials(vec![
            "shot_2.keyframe".to_string(),
            "transition_1.video".to_string(),
        ]);
        assert_eq!(e.kind(), ErrorKind::IncompleteMaterials);
        assert!(e.to_string().contains("shot_2.keyframe"));
        assert!(!e.kind().is_retryable());
    }

    #[test]
    fn deadline_maps_to_timeout() {
        assert_eq!(EngineError::Deadline(120).kind(), ErrorKind::Timeout);
        assert!(EngineError::Deadline(120).kind().is_retryable());
    }
}
