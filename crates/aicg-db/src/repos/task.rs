//! Repository for the `tasks` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use aicg_models::{ErrorKind, JobId, Stage, Task, TaskId, TaskKind, TaskPayload, TaskStatus};

use crate::error::{DbError, DbResult};

const COLUMNS: &str = "id, job_id, kind, stage, payload, status, retries, cancel_requested, \
     progress_current, progress_total, result, error_code, error_message, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    job_id: String,
    kind: String,
    stage: String,
    payload: serde_json::Value,
    status: String,
    retries: i32,
    cancel_requested: bool,
    progress_current: Option<i32>,
    progress_total: Option<i32>,
    result: Option<serde_json::Value>,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TaskRow {
    fn into_task(self) -> DbResult<Task> {
        let payload: TaskPayload = serde_json::from_value(self.payload)?;
        Ok(Task {
            id: TaskId::from_string(self.id),
            job_id: JobId::from_string(self.job_id),
            kind: TaskKind::from_str(&self.kind).unwrap_or_else(|| payload.kind()),
            stage: Stage::from_str(&self.stage).unwrap_or_else(|| payload.stage()),
            payload,
            status: TaskStatus::from_str(&self.status).unwrap_or(TaskStatus::Pending),
            retries: self.retries.max(0) as u32,
            cancel_requested: self.cancel_requested,
            progress_current: self.progress_current.map(|v| v.max(0) as u32),
            progress_total: self.progress_total.map(|v| v.max(0) as u32),
            result: self.result,
            error_code: self
                .error_code
                .and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok()),
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Per-stage terminal counts for readiness decisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageCounts {
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    pub cancelled: u32,
    pub skipped: u32,
}

impl StageCounts {
    pub fn settled(&self) -> u32 {
        self.success + self.failed + self.cancelled + self.skipped
    }

    /// All tasks settled and none failed.
    pub fn is_clean(&self) -> bool {
        self.settled() == self.total && self.failed == 0 && self.cancelled == 0
    }

    /// All tasks settled with a mix of successes and failures.
    pub fn is_partial(&self) -> bool {
        self.settled() == self.total
            && self.failed > 0
            && (self.success > 0 || self.skipped > 0)
    }
}

/// CRUD and lifecycle transitions for executor tasks.
pub struct TaskRepo;

impl TaskRepo {
    pub async fn create_many(pool: &PgPool, tasks: &[Task]) -> DbResult<()> {
        let mut tx = pool.begin().await?;
        for t in tasks {
            sqlx::query(
                "INSERT INTO tasks \
                     (id, job_id, kind, stage, payload, status, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(t.id.as_str())
            .bind(t.job_id.as_str())
            .bind(t.kind.as_str())
            .bind(t.stage.as_str())
            .bind(serde_json::to_value(&t.payload)?)
            .bind(t.status.as_str())
            .bind(t.created_at)
            .bind(t.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &TaskId) -> DbResult<Task> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.ok_or_else(|| DbError::not_found("Task", id.as_str()))?
            .into_task()
    }

    pub async fn list_by_job(pool: &PgPool, job_id: &JobId) -> DbResult<Vec<Task>> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE job_id = $1 ORDER BY created_at");
        let rows: Vec<TaskRow> = sqlx::query_as(&query)
            .bind(job_id.as_str())
            .fetch_all(pool)
            .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Pending tasks of one stage of a job, in submission order.
    pub async fn pending_for_stage(
        pool: &PgPool,
        job_id: &JobId,
        stage: Stage,
    ) -> DbResult<Vec<Task>> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE job_id = $1 AND stage = $2 AND status = 'pending' \
             ORDER BY created_at"
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&query)
            .bind(job_id.as_str())
            .bind(stage.as_str())
            .fetch_all(pool)
            .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Claim a task for execution: pending -> running.
    ///
    /// Returns `None` when another worker already claimed it or the
    /// task was cancelled meanwhile (at-least-once delivery makes both
    /// possible).
    pub async fn claim(pool: &PgPool, id: &TaskId) -> DbResult<Option<Task>> {
        let query = format!(
            "UPDATE tasks SET status = 'running', updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' AND cancel_requested = FALSE \
             RETURNING {COLUMNS}"
        );
        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.map(TaskRow::into_task).transpose()
    }

    /// Re-queue a running task for a later retry attempt.
    pub async fn requeue_for_retry(pool: &PgPool, id: &TaskId) -> DbResult<u32> {
        let retries: i32 = sqlx::query_scalar(
            "UPDATE tasks SET status = 'pending', retries = retries + 1, updated_at = NOW() \
             WHERE id = $1 RETURNING retries",
        )
        .bind(id.as_str())
        .fetch_one(pool)
        .await?;
        Ok(retries.max(0) as u32)
    }

    pub async fn mark_success(
        pool: &PgPool,
        id: &TaskId,
        result: Option<&serde_json::Value>,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'success', result = $2, error_code = NULL, \
             error_message = NULL, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(result)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        pool: &PgPool,
        id: &TaskId,
        kind: ErrorKind,
        message: &str,
    ) -> DbResult<()> {
        let code = match serde_json::to_value(kind) {
            Ok(serde_json::Value::String(s)) => s,
            _ => kind.as_str().to_string(),
        };
        sqlx::query(
            "UPDATE tasks SET status = 'failed', error_code = $2, error_message = $3, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(code)
        // operator-readable, truncated at 4 KiB
        .bind(message.chars().take(4096).collect::<String>())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_cancelled(pool: &PgPool, id: &TaskId) -> DbResult<()> {
        sqlx::query(
            "UPDATE tasks SET status = 'cancelled', updated_at = NOW() \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id.as_str())
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_skipped(pool: &PgPool, id: &TaskId) -> DbResult<()> {
        sqlx::query("UPDATE tasks SET status = 'skipped', updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Report `{current, total}` progress from a handler.
    pub async fn set_progress(
        pool: &PgPool,
        id: &TaskId,
        current: u32,
        total: u32,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE tasks SET progress_current = $2, progress_total = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(current as i32)
        .bind(total as i32)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Open (pending or running) poll-bookkeeping tasks for a
    /// transition. The sweeper settles these when the external video
    /// task terminates.
    pub async fn open_poll_tasks(pool: &PgPool, transition_id: &str) -> DbResult<Vec<Task>> {
        Self::open_tasks_of_kind(pool, "video_poll", transition_id).await
    }

    /// Open submit tasks for a transition; a failed transition whose
    /// submit path is exhausted can never complete.
    pub async fn open_submit_tasks(pool: &PgPool, transition_id: &str) -> DbResult<Vec<Task>> {
        Self::open_tasks_of_kind(pool, "video_submit", transition_id).await
    }

    async fn open_tasks_of_kind(
        pool: &PgPool,
        kind: &str,
        transition_id: &str,
    ) -> DbResult<Vec<Task>> {
        let query = format!(
            "SELECT {COLUMNS} FROM tasks \
             WHERE kind = $1 \
               AND payload->>'transition_id' = $2 \
               AND status IN ('pending', 'running')"
        );
        let rows: Vec<TaskRow> = sqlx::query_as(&query)
            .bind(kind)
            .bind(transition_id)
            .fetch_all(pool)
            .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Whether cancellation has been requested; workers call this at
    /// suspension points.
    pub async fn is_cancel_requested(pool: &PgPool, id: &TaskId) -> DbResult<bool> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT cancel_requested FROM tasks WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(pool)
                .await?;
        Ok(flag.unwrap_or(true))
    }

    /// Terminal counts for a stage of a job.
    pub async fn stage_counts(pool: &PgPool, job_id: &JobId, stage: Stage) -> DbResult<StageCounts> {
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), \
                 COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN status = 'cancelled' THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN status = 'skipped' THEN 1 ELSE 0 END), 0) \
             FROM tasks WHERE job_id = $1 AND stage = $2",
        )
        .bind(job_id.as_str())
        .bind(stage.as_str())
        .fetch_one(pool)
        .await?;
        Ok(StageCounts {
            total: row.0 as u32,
            success: row.1 as u32,
            failed: row.2 as u32,
            cancelled: row.3 as u32,
            skipped: row.4 as u32,
        })
    }

    /// Weighted progress over a job's task tree: settled weight over
    /// total weight, in `[0, 1]`.
    pub async fn weighted_progress(pool: &PgPool, job_id: &JobId) -> DbResult<f32> {
        let tasks = Self::list_by_job(pool, job_id).await?;
        let total: u32 = tasks.iter().map(|t| t.kind.weight()).sum();
        if total == 0 {
            return Ok(0.0);
        }
        let settled: u32 = tasks
            .iter()
            .filter(|t| t.status.is_terminal())
            .map(|t| t.kind.weight())
            .sum();
        Ok(settled as f32 / total as f32)
    }

    /// Whether every task of the job is terminal.
    pub async fn all_settled(pool: &PgPool, job_id: &JobId) -> DbResult<bool> {
        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tasks WHERE job_id = $1 AND status IN ('pending', 'running')",
        )
        .bind(job_id.as_str())
        .fetch_one(pool)
        .await?;
        Ok(open == 0)
    }
}
