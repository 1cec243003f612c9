//! Generation history and the URL-rewrite contract.
//!
//! All `*_url` mutations funnel through [`record_url`] /
//! [`select_history`] so the invariant
//! `history_count = rewrites` holds for every artifact.

use chrono::{DateTime, Utc};
use metrics::counter;
use sqlx::PgPool;
use tracing::info;

use aicg_models::{ApiKeyId, GenerationHistory, HistoryId, ResourceType};

use crate::error::{DbError, DbResult};

/// Descriptor of an artifact table column that stores a generated URL.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UrlColumn {
    pub table: &'static str,
    pub column: &'static str,
    /// Companion prompt column updated together with the URL, if any.
    pub prompt_column: Option<&'static str>,
    pub resource_type: ResourceType,
}

/// Provenance recorded alongside a rewrite.
#[derive(Debug, Clone, Default)]
pub struct GenerationMeta {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub api_key_id: Option<String>,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: String,
    resource_type: String,
    resource_id: String,
    result_url: String,
    prompt: Option<String>,
    model: Option<String>,
    api_key_id: Option<String>,
    orphaned: bool,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for GenerationHistory {
    fn from(r: HistoryRow) -> Self {
        GenerationHistory {
            id: HistoryId::from_string(r.id),
            resource_type: ResourceType::from_str(&r.resource_type)
                .unwrap_or(ResourceType::SceneImage),
            resource_id: r.resource_id,
            result_url: r.result_url,
            prompt: r.prompt,
            model: r.model,
            api_key_id: r.api_key_id.map(ApiKeyId::from_string),
            orphaned: r.orphaned,
            created_at: r.created_at,
        }
    }
}

const COLUMNS: &str = "id, resource_type, resource_id, result_url, prompt, model, api_key_id, \
     orphaned, created_at";

/// Write a freshly generated URL onto an artifact row.
///
/// In one transaction: locks the row, pushes the prior URL (if any)
/// into history, then updates the URL/prompt and bumps the version.
/// Concurrent writers serialize on the row lock; the loser's result
/// still lands in history.
pub(crate) async fn record_url(
    pool: &PgPool,
    col: UrlColumn,
    artifact_id: &str,
    new_url: &str,
    meta: &GenerationMeta,
) -> DbResult<()> {
    let mut tx = pool.begin().await?;

    let select = format!(
        "SELECT {col} FROM {table} WHERE id = $1 FOR UPDATE",
        col = col.column,
        table = col.table
    );
    let prior: Option<Option<String>> = sqlx::query_scalar(&select)
        .bind(artifact_id)
        .fetch_optional(&mut *tx)
        .await?;
    let prior = prior.ok_or_else(|| DbError::NotFound {
        entity: "artifact",
        id: artifact_id.to_string(),
    })?;

    if let Some(prior_url) = prior {
        insert_history(&mut tx, col.resource_type, artifact_id, &prior_url, meta).await?;
    }

    let update = match col.prompt_column {
        Some(prompt_col) => format!(
            "UPDATE {table} SET {col} = $2, {prompt_col} = $3, version = version + 1, \
             updated_at = NOW() WHERE id = $1",
            table = col.table,
            col = col.column,
        ),
        None => format!(
            "UPDATE {table} SET {col} = $2, version = version + 1, updated_at = NOW() \
             WHERE id = $1",
            table = col.table,
            col = col.column,
        ),
    };

    let mut query = sqlx::query(&update).bind(artifact_id).bind(new_url);
    if col.prompt_column.is_some() {
        query = query.bind(meta.prompt.as_deref());
    }
    query.execute(&mut *tx).await?;

    tx.commit().await?;
    counter!("aicg_artifact_rewrites_total").increment(1);
    Ok(())
}

/// Repoint an artifact at a historical result.
///
/// The current live URL is pushed back as one more history row; the
/// selected row stays in history. Returns the URL now live.
pub(crate) async fn select_history(
    pool: &PgPool,
    col: UrlColumn,
    artifact_id: &str,
    history_id: &HistoryId,
) -> DbResult<String> {
    let mut tx = pool.begin().await?;

    let query = format!("SELECT {COLUMNS} FROM generation_history WHERE id = $1");
    let entry: Option<HistoryRow> = sqlx::query_as(&query)
        .bind(history_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
    let entry = entry.ok_or_else(|| DbError::not_found("GenerationHistory", history_id.as_str()))?;

    if entry.resource_type != col.resource_type.as_str() || entry.resource_id != artifact_id {
        return Err(DbError::invalid_state(
            "history entry does not belong to this artifact",
        ));
    }

    let select = format!(
        "SELECT {col} FROM {table} WHERE id = $1 FOR UPDATE",
        col = col.column,
        table = col.table
    );
    let current: Option<Option<String>> = sqlx::query_scalar(&select)
        .bind(artifact_id)
        .fetch_optional(&mut *tx)
        .await?;
    let current = current.ok_or_else(|| DbError::NotFound {
        entity: "artifact",
        id: artifact_id.to_string(),
    })?;

    if let Some(current_url) = current {
        if current_url != entry.result_url {
            let meta = GenerationMeta::default();
            insert_history(&mut tx, col.resource_type, artifact_id, &current_url, &meta).await?;
        }
    }

    let update = format!(
        "UPDATE {table} SET {col} = $2, version = version + 1, updated_at = NOW() WHERE id = $1",
        table = col.table,
        col = col.column,
    );
    sqlx::query(&update)
        .bind(artifact_id)
        .bind(&entry.result_url)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!(
        artifact_id,
        history_id = %history_id,
        resource_type = col.resource_type.as_str(),
        "Switched artifact to historical result"
    );
    Ok(entry.result_url)
}

async fn insert_history(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    resource_type: ResourceType,
    resource_id: &str,
    result_url: &str,
    meta: &GenerationMeta,
) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO generation_history \
             (id, resource_type, resource_id, result_url, prompt, model, api_key_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(HistoryId::new().as_str())
    .bind(resource_type.as_str())
    .bind(resource_id)
    .bind(result_url)
    .bind(meta.prompt.as_deref())
    .bind(meta.model.as_deref())
    .bind(meta.api_key_id.as_deref())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Queries over the history table itself.
pub struct HistoryRepo;

impl HistoryRepo {
    /// All prior results for an artifact, newest first.
    pub async fn list(
        pool: &PgPool,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DbResult<Vec<GenerationHistory>> {
        let query = format!(
            "SELECT {COLUMNS} FROM generation_history \
             WHERE resource_type = $1 AND resource_id = $2 \
             ORDER BY created_at DESC"
        );
        let rows: Vec<HistoryRow> = sqlx::query_as(&query)
            .bind(resource_type.as_str())
            .bind(resource_id)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(GenerationHistory::from).collect())
    }

    /// Number of prior results for an artifact.
    pub async fn count(
        pool: &PgPool,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM generation_history \
             WHERE resource_type = $1 AND resource_id = $2",
        )
        .bind(resource_type.as_str())
        .bind(resource_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Mark every history row of an artifact orphaned (parent deleted).
    pub async fn mark_orphaned(
        pool: &PgPool,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE generation_history SET orphaned = TRUE \
             WHERE resource_type = $1 AND resource_id = $2",
        )
        .bind(resource_type.as_str())
        .bind(resource_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Explicit user purge of an artifact's history.
    pub async fn purge(
        pool: &PgPool,
        resource_type: ResourceType,
        resource_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM generation_history WHERE resource_type = $1 AND resource_id = $2",
        )
        .bind(resource_type.as_str())
        .bind(resource_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
