//! Repository for the `api_keys` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use aicg_models::{ApiKey, ApiKeyId, ApiKeyStatus};

use crate::error::{DbError, DbResult};

#[derive(sqlx::FromRow)]
struct ApiKeyRow {
    id: String,
    user_id: String,
    provider: String,
    base_url: String,
    secret: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<ApiKeyRow> for ApiKey {
    fn from(r: ApiKeyRow) -> Self {
        ApiKey {
            id: ApiKeyId::from_string(r.id),
            user_id: r.user_id,
            provider: r.provider,
            base_url: r.base_url,
            secret: r.secret,
            status: match r.status.as_str() {
                "disabled" => ApiKeyStatus::Disabled,
                _ => ApiKeyStatus::Active,
            },
            created_at: r.created_at,
        }
    }
}

/// Credential lookup for the provider adapter layer.
pub struct ApiKeyRepo;

impl ApiKeyRepo {
    pub async fn create(pool: &PgPool, key: &ApiKey) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO api_keys (id, user_id, provider, base_url, secret, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(key.id.as_str())
        .bind(&key.user_id)
        .bind(&key.provider)
        .bind(&key.base_url)
        .bind(&key.secret)
        .bind(match key.status {
            ApiKeyStatus::Active => "active",
            ApiKeyStatus::Disabled => "disabled",
        })
        .bind(key.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Resolve a credential record. Disabled keys resolve as not found.
    pub async fn get_active(pool: &PgPool, id: &ApiKeyId) -> DbResult<ApiKey> {
        let row: Option<ApiKeyRow> = sqlx::query_as(
            "SELECT id, user_id, provider, base_url, secret, status, created_at \
             FROM api_keys WHERE id = $1 AND status = 'active'",
        )
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;
        row.map(ApiKey::from)
            .ok_or_else(|| DbError::not_found("ApiKey", id.as_str()))
    }
}
