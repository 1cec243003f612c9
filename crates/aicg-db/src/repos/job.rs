//! Repository for the `jobs` table.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use sqlx::PgPool;
use tracing::info;

use aicg_models::{
    ApiKeyId, ChapterId, ErrorKind, Job, JobId, JobStatistics, JobStatus, Stage,
};

use crate::error::{DbError, DbResult};

const COLUMNS: &str = "id, user_id, chapter_id, target_stage, api_key_id, model, \
     continue_on_partial, status, progress, stat_total, stat_success, stat_failed, stat_skipped, \
     cancel_requested, result_ref, error_code, error_message, created_at, updated_at, \
     started_at, completed_at";

/// Retention after terminal status (spec lifecycle).
const SUCCESS_TTL_DAYS: i64 = 14;
const FAILURE_TTL_DAYS: i64 = 90;

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    user_id: String,
    chapter_id: String,
    target_stage: String,
    api_key_id: String,
    model: Option<String>,
    continue_on_partial: bool,
    status: String,
    progress: f32,
    stat_total: i32,
    stat_success: i32,
    stat_failed: i32,
    stat_skipped: i32,
    cancel_requested: bool,
    result_ref: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for Job {
    fn from(r: JobRow) -> Self {
        Job {
            id: JobId::from_string(r.id),
            user_id: r.user_id,
            chapter_id: ChapterId::from_string(r.chapter_id),
            target_stage: Stage::from_str(&r.target_stage).unwrap_or(Stage::ComposeVideo),
            api_key_id: ApiKeyId::from_string(r.api_key_id),
            model: r.model,
            continue_on_partial: r.continue_on_partial,
            status: JobStatus::from_str(&r.status).unwrap_or(JobStatus::Pending),
            progress: r.progress,
            statistics: JobStatistics {
                total: r.stat_total.max(0) as u32,
                success: r.stat_success.max(0) as u32,
                failed: r.stat_failed.max(0) as u32,
                skipped: r.stat_skipped.max(0) as u32,
            },
            cancel_requested: r.cancel_requested,
            result_ref: r.result_ref,
            error_code: r.error_code.as_deref().and_then(parse_error_kind),
            error_message: r.error_message,
            created_at: r.created_at,
            updated_at: r.updated_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
        }
    }
}

fn parse_error_kind(s: &str) -> Option<ErrorKind> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).ok()
}

fn error_kind_str(kind: ErrorKind) -> String {
    match serde_json::to_value(kind) {
        Ok(serde_json::Value::String(s)) => s,
        _ => kind.as_str().to_string(),
    }
}

/// CRUD and lifecycle transitions for jobs.
pub struct JobRepo;

impl JobRepo {
    pub async fn create(pool: &PgPool, job: &Job) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO jobs \
                 (id, user_id, chapter_id, target_stage, api_key_id, model, continue_on_partial, \
                  status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(job.id.as_str())
        .bind(&job.user_id)
        .bind(job.chapter_id.as_str())
        .bind(job.target_stage.as_str())
        .bind(job.api_key_id.as_str())
        .bind(job.model.as_deref())
        .bind(job.continue_on_partial)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(pool)
        .await?;
        counter!("aicg_jobs_created_total").increment(1);
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &JobId) -> DbResult<Job> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        let row: Option<JobRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.map(Job::from)
            .ok_or_else(|| DbError::not_found("Job", id.as_str()))
    }

    pub async fn list_by_chapter(pool: &PgPool, chapter_id: &ChapterId) -> DbResult<Vec<Job>> {
        let query =
            format!("SELECT {COLUMNS} FROM jobs WHERE chapter_id = $1 ORDER BY created_at DESC");
        let rows: Vec<JobRow> = sqlx::query_as(&query)
            .bind(chapter_id.as_str())
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Job::from).collect())
    }

    pub async fn mark_running(pool: &PgPool, id: &JobId) -> DbResult<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'running', started_at = COALESCE(started_at, NOW()), \
             updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Fold a stage materialization into the counters: newly created
    /// tasks raise the total, the already-satisfied portion counts as
    /// skipped.
    pub async fn add_counts(pool: &PgPool, id: &JobId, total: u32, skipped: u32) -> DbResult<()> {
        sqlx::query(
            "UPDATE jobs SET stat_total = stat_total + $2, stat_skipped = stat_skipped + $3, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(total as i32)
        .bind(skipped as i32)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Roll a terminal task outcome into the job counters.
    pub async fn record_task_outcome(pool: &PgPool, id: &JobId, success: bool) -> DbResult<()> {
        let column = if success { "stat_success" } else { "stat_failed" };
        let query =
            format!("UPDATE jobs SET {column} = {column} + 1, updated_at = NOW() WHERE id = $1");
        sqlx::query(&query).bind(id.as_str()).execute(pool).await?;
        Ok(())
    }

    /// Update progress, clamped to be nondecreasing.
    pub async fn update_progress(pool: &PgPool, id: &JobId, progress: f32) -> DbResult<()> {
        sqlx::query(
            "UPDATE jobs SET progress = GREATEST(progress, LEAST($2, 1.0)), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(progress)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Request cooperative cancellation of a job and its live tasks.
    pub async fn request_cancel(pool: &PgPool, id: &JobId) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET cancel_requested = TRUE, updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id.as_str())
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query(
            "UPDATE tasks SET cancel_requested = TRUE, updated_at = NOW() \
             WHERE job_id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id.as_str())
        .execute(pool)
        .await?;
        info!(job_id = %id, "Job cancellation requested");
        Ok(true)
    }

    /// Finalize a job with a terminal status.
    pub async fn finalize(
        pool: &PgPool,
        id: &JobId,
        status: JobStatus,
        result_ref: Option<&str>,
        error: Option<(ErrorKind, &str)>,
    ) -> DbResult<()> {
        debug_assert!(status.is_terminal());
        let (error_code, error_message) = match error {
            Some((kind, msg)) => (
                Some(error_kind_str(kind)),
                // operator-readable, truncated at 4 KiB
                Some(msg.chars().take(4096).collect::<String>()),
            ),
            None => (None, None),
        };
        sqlx::query(
            "UPDATE jobs SET status = $2, result_ref = $3, error_code = $4, error_message = $5, \
             progress = CASE WHEN $2 = 'success' THEN 1.0 ELSE progress END, \
             completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(result_ref)
        .bind(error_code)
        .bind(error_message)
        .execute(pool)
        .await?;
        counter!("aicg_jobs_finished_total", "status" => status.as_str()).increment(1);
        info!(job_id = %id, status = status.as_str(), "Job finalized");
        Ok(())
    }

    /// Delete terminal jobs past their retention window. Tasks cascade.
    pub async fn ttl_sweep(pool: &PgPool) -> DbResult<u64> {
        let success_cutoff = Utc::now() - Duration::days(SUCCESS_TTL_DAYS);
        let failure_cutoff = Utc::now() - Duration::days(FAILURE_TTL_DAYS);
        let result = sqlx::query(
            "DELETE FROM jobs WHERE \
                 (status = 'success' AND completed_at < $1) \
              OR (status IN ('failed', 'cancelled') AND completed_at < $2)",
        )
        .bind(success_cutoff)
        .bind(failure_cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
