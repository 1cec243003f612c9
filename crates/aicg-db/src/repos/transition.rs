//! Repository for the `transitions` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use aicg_models::{
    ApiKeyId, ChapterId, HistoryId, ResourceType, ScriptId, ShotId, Transition, TransitionId,
    TransitionStatus,
};

use crate::error::{DbError, DbResult};
use crate::repos::history::{record_url, select_history, GenerationMeta, UrlColumn};

const VIDEO_URL: UrlColumn = UrlColumn {
    table: "transitions",
    column: "video_url",
    prompt_column: None,
    resource_type: ResourceType::TransitionVideo,
};

/// First poll delay after a submit; doubles per poll up to the cap.
const POLL_BASE_SECS: i64 = 5;
const POLL_CAP_SECS: i64 = 60;

const COLUMNS: &str = "id, script_id, from_shot_id, to_shot_id, order_index, video_prompt, \
     video_url, status, external_task_id, api_key_id, error_message, next_poll_at, poll_count, \
     version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TransitionRow {
    id: String,
    script_id: String,
    from_shot_id: String,
    to_shot_id: String,
    order_index: i32,
    video_prompt: Option<String>,
    video_url: Option<String>,
    status: String,
    external_task_id: Option<String>,
    api_key_id: Option<String>,
    error_message: Option<String>,
    next_poll_at: Option<DateTime<Utc>>,
    poll_count: i32,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TransitionRow> for Transition {
    fn from(r: TransitionRow) -> Self {
        Transition {
            id: TransitionId::from_string(r.id),
            script_id: ScriptId::from_string(r.script_id),
            from_shot_id: ShotId::from_string(r.from_shot_id),
            to_shot_id: ShotId::from_string(r.to_shot_id),
            order_index: r.order_index,
            video_prompt: r.video_prompt,
            video_url: r.video_url,
            status: TransitionStatus::from_str(&r.status).unwrap_or(TransitionStatus::Pending),
            external_task_id: r.external_task_id,
            api_key_id: r.api_key_id.map(ApiKeyId::from_string),
            error_message: r.error_message,
            next_poll_at: r.next_poll_at,
            poll_count: r.poll_count,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// CRUD and lifecycle transitions for transition videos.
pub struct TransitionRepo;

impl TransitionRepo {
    /// Create a transition for a consecutive shot pair.
    ///
    /// The unique constraint on `(from_shot_id, to_shot_id)` enforces
    /// exactly one transition per pair; a duplicate create is a
    /// conflict.
    pub async fn create(pool: &PgPool, t: &Transition) -> DbResult<()> {
        let result = sqlx::query(
            "INSERT INTO transitions \
                 (id, script_id, from_shot_id, to_shot_id, order_index, video_prompt, status, \
                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (from_shot_id, to_shot_id) DO NOTHING",
        )
        .bind(t.id.as_str())
        .bind(t.script_id.as_str())
        .bind(t.from_shot_id.as_str())
        .bind(t.to_shot_id.as_str())
        .bind(t.order_index)
        .bind(t.video_prompt.as_deref())
        .bind(t.status.as_str())
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!(
                "transition {} -> {} already exists",
                t.from_shot_id, t.to_shot_id
            )));
        }
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &TransitionId) -> DbResult<Transition> {
        let query = format!("SELECT {COLUMNS} FROM transitions WHERE id = $1");
        let row: Option<TransitionRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.map(Transition::from)
            .ok_or_else(|| DbError::not_found("Transition", id.as_str()))
    }

    pub async fn find_by_pair(
        pool: &PgPool,
        from_shot_id: &ShotId,
        to_shot_id: &ShotId,
    ) -> DbResult<Option<Transition>> {
        let query =
            format!("SELECT {COLUMNS} FROM transitions WHERE from_shot_id = $1 AND to_shot_id = $2");
        let row: Option<TransitionRow> = sqlx::query_as(&query)
            .bind(from_shot_id.as_str())
            .bind(to_shot_id.as_str())
            .fetch_optional(pool)
            .await?;
        Ok(row.map(Transition::from))
    }

    /// Transitions of a chapter in playback order.
    pub async fn list_by_chapter(pool: &PgPool, chapter_id: &ChapterId) -> DbResult<Vec<Transition>> {
        let query = format!(
            "SELECT {cols} FROM transitions t \
             JOIN scripts sp ON t.script_id = sp.id \
             WHERE sp.chapter_id = $1 \
             ORDER BY t.order_index",
            cols = COLUMNS
                .split(", ")
                .map(|c| format!("t.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows: Vec<TransitionRow> = sqlx::query_as(&query)
            .bind(chapter_id.as_str())
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Transition::from).collect())
    }

    /// Store the LLM-generated video prompt.
    pub async fn set_prompt(pool: &PgPool, id: &TransitionId, prompt: &str) -> DbResult<()> {
        sqlx::query("UPDATE transitions SET video_prompt = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(prompt)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mark a transition submitted to the provider.
    ///
    /// Persists the external task id and schedules the first poll
    /// before flipping the status, so a crash between the two leaves
    /// no `processing` row without a task id.
    pub async fn mark_submitted(
        pool: &PgPool,
        id: &TransitionId,
        external_task_id: &str,
        api_key_id: &ApiKeyId,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE transitions \
             SET external_task_id = $2, api_key_id = $3, status = 'processing', \
                 next_poll_at = NOW() + make_interval(secs => $4), poll_count = 0, \
                 error_message = NULL, version = version + 1, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(external_task_id)
        .bind(api_key_id.as_str())
        .bind(POLL_BASE_SECS as f64)
        .execute(pool)
        .await?;
        info!(transition_id = %id, external_task_id, "Transition submitted");
        Ok(())
    }

    /// Claim transitions due for a provider poll.
    ///
    /// Atomically pushes `next_poll_at` out on the per-task
    /// exponential schedule (5 s doubling up to 60 s) while selecting,
    /// so concurrent sweepers never double-poll the same task
    /// (`SKIP LOCKED` plus the claim-style update).
    pub async fn claim_due_for_poll(pool: &PgPool, limit: i64) -> DbResult<Vec<Transition>> {
        let query = format!(
            "UPDATE transitions \
             SET next_poll_at = NOW() + make_interval(secs => \
                     LEAST($2 * POWER(2, LEAST(poll_count, 8)), $3)), \
                 poll_count = poll_count + 1, updated_at = NOW() \
             WHERE id IN ( \
                 SELECT id FROM transitions \
                 WHERE status = 'processing' AND external_task_id IS NOT NULL \
                   AND (next_poll_at IS NULL OR next_poll_at <= NOW()) \
                 ORDER BY next_poll_at \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {COLUMNS}"
        );
        let rows: Vec<TransitionRow> = sqlx::query_as(&query)
            .bind(limit)
            .bind(POLL_BASE_SECS as f64)
            .bind(POLL_CAP_SECS as f64)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Transition::from).collect())
    }

    /// Record the finished clip and complete the transition
    /// (history-preserving on re-generation).
    pub async fn mark_completed(
        pool: &PgPool,
        id: &TransitionId,
        video_url: &str,
        meta: &GenerationMeta,
    ) -> DbResult<()> {
        record_url(pool, VIDEO_URL, id.as_str(), video_url, meta).await?;
        sqlx::query(
            "UPDATE transitions SET status = 'completed', error_message = NULL, \
             next_poll_at = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .execute(pool)
        .await?;
        info!(transition_id = %id, "Transition completed");
        Ok(())
    }

    /// Record a terminal provider failure.
    pub async fn mark_failed(pool: &PgPool, id: &TransitionId, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE transitions SET status = 'failed', error_message = $2, next_poll_at = NULL, \
             version = version + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Reset a transition for re-submission.
    pub async fn reset_for_retry(pool: &PgPool, id: &TransitionId) -> DbResult<()> {
        sqlx::query(
            "UPDATE transitions SET status = 'pending', external_task_id = NULL, \
             next_poll_at = NULL, poll_count = 0, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Repoint the transition clip at a historical result.
    pub async fn select_video_history(
        pool: &PgPool,
        id: &TransitionId,
        history_id: &HistoryId,
    ) -> DbResult<String> {
        select_history(pool, VIDEO_URL, id.as_str(), history_id).await
    }
}
