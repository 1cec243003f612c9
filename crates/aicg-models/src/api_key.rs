//! Stored provider credentials.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ApiKeyId;

/// Whether a credential may be used for new calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    #[default]
    Active,
    Disabled,
}

/// A per-user credential for a named provider.
///
/// The secret never leaves the provider adapter layer; `Debug` and the
/// serialized form redact it.
#[derive(Clone, Serialize, Deserialize, JsonSchema)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: String,
    /// Registered adapter name, matched exact-string (e.g. "openai",
    /// "vectorengine").
    pub provider: String,
    /// Endpoint base URL for the provider.
    pub base_url: String,
    #[serde(skip_serializing, default)]
    pub secret: String,
    pub status: ApiKeyStatus,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// The plaintext secret, only for the adapter layer.
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("secret", &"<redacted>")
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_redacted_in_debug_and_json() {
        let key = ApiKey {
            id: ApiKeyId::new(),
            user_id: "u1".into(),
            provider: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            secret: "sk-super-secret".into(),
            status: ApiKeyStatus::Active,
            created_at: Utc::now(),
        };
        assert!(!format!("{key:?}").contains("sk-super-secret"));
        assert!(!serde_json::to_string(&key).unwrap().contains("sk-super-secret"));
    }
}
