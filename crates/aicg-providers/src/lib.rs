//! Uniform invocation surface over heterogeneous AI model endpoints.
//!
//! Four capability traits ([`TextModel`], [`ImageModel`], [`TtsModel`],
//! [`VideoModel`]) abstract concrete providers. Adapters shape
//! requests, normalize responses and classify failures into the shared
//! error taxonomy; they never retry; retry is the task runtime's
//! concern.

pub mod error;
pub mod openai;
pub mod registry;
pub mod traits;
pub mod types;
pub mod vectorengine;

pub use error::{ProviderError, ProviderResult};
pub use openai::OpenAiCompatible;
pub use registry::ProviderRegistry;
pub use traits::{ImageModel, TextModel, TtsModel, VideoModel};
pub use types::{
    ImageOutput, ImageRequest, TextCompletion, TextRequest, TokenUsage, TtsOutput, TtsRequest,
    VideoPollOutcome, VideoSubmitRequest,
};
pub use vectorengine::VectorEngine;
