//! Capability interfaces.

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::types::{
    ImageOutput, ImageRequest, TextCompletion, TextRequest, TtsOutput, TtsRequest,
    VideoPollOutcome, VideoSubmitRequest,
};

/// Text completion capability.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, req: TextRequest) -> ProviderResult<TextCompletion>;
}

/// Synchronous image generation capability.
#[async_trait]
pub trait ImageModel: Send + Sync {
    async fn generate(&self, req: ImageRequest) -> ProviderResult<ImageOutput>;
}

/// Speech synthesis capability.
#[async_trait]
pub trait TtsModel: Send + Sync {
    async fn synthesize(&self, req: TtsRequest) -> ProviderResult<TtsOutput>;
}

/// Long-running video generation capability.
///
/// Explicitly two-phase: `submit` returns an external task id and
/// releases the caller; the polling sweeper drives `poll` to
/// completion minutes later.
#[async_trait]
pub trait VideoModel: Send + Sync {
    async fn submit(&self, req: VideoSubmitRequest) -> ProviderResult<String>;
    async fn poll(&self, external_task_id: &str) -> ProviderResult<VideoPollOutcome>;
}
