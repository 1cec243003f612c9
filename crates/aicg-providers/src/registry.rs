//! Credential-to-adapter resolution.

use std::sync::Arc;

use aicg_models::ApiKey;

use crate::error::{ProviderError, ProviderResult};
use crate::openai::OpenAiCompatible;
use crate::traits::{ImageModel, TextModel, TtsModel, VideoModel};
use crate::vectorengine::VectorEngine;

/// Resolves a stored credential to concrete capability handles.
///
/// Dispatch is by exact-string match on the credential's `provider`
/// field. A provider that lacks a capability yields a validation-class
/// error rather than a silent fallback.
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Text completion handle for a credential.
    pub fn text(key: &ApiKey) -> ProviderResult<Arc<dyn TextModel>> {
        match key.provider.as_str() {
            "openai" | "openai-compatible" | "custom" => {
                Ok(Arc::new(OpenAiCompatible::new(key.secret(), &key.base_url)))
            }
            other => Err(ProviderError::UnknownProvider(format!(
                "no text adapter for provider '{other}'"
            ))),
        }
    }

    /// Image generation handle for a credential.
    pub fn image(key: &ApiKey) -> ProviderResult<Arc<dyn ImageModel>> {
        match key.provider.as_str() {
            "openai" | "openai-compatible" | "custom" => {
                Ok(Arc::new(OpenAiCompatible::new(key.secret(), &key.base_url)))
            }
            other => Err(ProviderError::UnknownProvider(format!(
                "no image adapter for provider '{other}'"
            ))),
        }
    }

    /// Speech synthesis handle for a credential.
    pub fn tts(key: &ApiKey) -> ProviderResult<Arc<dyn TtsModel>> {
        match key.provider.as_str() {
            "openai" | "openai-compatible" | "custom" => {
                Ok(Arc::new(OpenAiCompatible::new(key.secret(), &key.base_url)))
            }
            other => Err(ProviderError::UnknownProvider(format!(
                "no tts adapter for provider '{other}'"
            ))),
        }
    }

    /// Video generation handle for a credential.
    pub fn video(key: &ApiKey) -> ProviderResult<Arc<dyn VideoModel>> {
        match key.provider.as_str() {
            "vectorengine" => Ok(Arc::new(VectorEngine::new(key.secret(), &key.base_url))),
            other => Err(ProviderError::UnknownProvider(format!(
                "no video adapter for provider '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aicg_models::{ApiKeyId, ApiKeyStatus};
    use chrono::Utc;

    fn key(provider: &str) -> ApiKey {
        ApiKey {
            id: ApiKeyId::new(),
            user_id: "u".into(),
            provider: provider.into(),
            base_url: "https://api.example.com/v1".into(),
            secret: "sk".into(),
            status: ApiKeyStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn dispatch_is_exact_string() {
        assert!(ProviderRegistry::text(&key("openai")).is_ok());
        assert!(ProviderRegistry::text(&key("OpenAI")).is_err());
        assert!(ProviderRegistry::video(&key("vectorengine")).is_ok());
        assert!(ProviderRegistry::video(&key("openai")).is_err());
    }
}
