//! Repository for the `video_tasks` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use aicg_models::{ChapterId, ErrorKind, GenSettings, VideoTask, VideoTaskId, VideoTaskStatus};

use crate::error::{DbError, DbResult};

const COLUMNS: &str = "id, chapter_id, user_id, settings, status, progress, current_index, \
     total_count, video_url, duration_secs, error_code, error_message, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct VideoTaskRow {
    id: String,
    chapter_id: String,
    user_id: String,
    settings: serde_json::Value,
    status: String,
    progress: i16,
    current_index: i32,
    total_count: i32,
    video_url: Option<String>,
    duration_secs: Option<i32>,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl VideoTaskRow {
    fn into_video_task(self) -> DbResult<VideoTask> {
        Ok(VideoTask {
            id: VideoTaskId::from_string(self.id),
            chapter_id: ChapterId::from_string(self.chapter_id),
            user_id: self.user_id,
            settings: serde_json::from_value(self.settings)?,
            status: VideoTaskStatus::from_str(&self.status).unwrap_or(VideoTaskStatus::Pending),
            progress: self.progress,
            current_index: self.current_index,
            total_count: self.total_count,
            video_url: self.video_url,
            duration_secs: self.duration_secs,
            error_code: self
                .error_code
                .and_then(|s| serde_json::from_value(serde_json::Value::String(s)).ok()),
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// CRUD and staged progress for video assembly tasks.
pub struct VideoTaskRepo;

impl VideoTaskRepo {
    pub async fn create(pool: &PgPool, task: &VideoTask) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO video_tasks \
                 (id, chapter_id, user_id, settings, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(task.id.as_str())
        .bind(task.chapter_id.as_str())
        .bind(&task.user_id)
        .bind(serde_json::to_value(&task.settings)?)
        .bind(task.status.as_str())
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &VideoTaskId) -> DbResult<VideoTask> {
        let query = format!("SELECT {COLUMNS} FROM video_tasks WHERE id = $1");
        let row: Option<VideoTaskRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.ok_or_else(|| DbError::not_found("VideoTask", id.as_str()))?
            .into_video_task()
    }

    /// The most recent assembly task for a chapter.
    pub async fn latest_for_chapter(
        pool: &PgPool,
        chapter_id: &ChapterId,
    ) -> DbResult<Option<VideoTask>> {
        let query = format!(
            "SELECT {COLUMNS} FROM video_tasks WHERE chapter_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row: Option<VideoTaskRow> = sqlx::query_as(&query)
            .bind(chapter_id.as_str())
            .fetch_optional(pool)
            .await?;
        row.map(VideoTaskRow::into_video_task).transpose()
    }

    /// Advance through the assembly pipeline stages.
    pub async fn set_status(pool: &PgPool, id: &VideoTaskId, status: VideoTaskStatus) -> DbResult<()> {
        sqlx::query("UPDATE video_tasks SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Update coarse progress and the current clip/sentence index.
    pub async fn set_progress(
        pool: &PgPool,
        id: &VideoTaskId,
        progress: i16,
        current_index: i32,
        total_count: i32,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE video_tasks SET progress = GREATEST(progress, $2), current_index = $3, \
             total_count = $4, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(progress.min(100))
        .bind(current_index)
        .bind(total_count)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_completed(
        pool: &PgPool,
        id: &VideoTaskId,
        video_url: &str,
        duration_secs: i32,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE video_tasks SET status = 'completed', video_url = $2, duration_secs = $3, \
             progress = 100, error_code = NULL, error_message = NULL, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(video_url)
        .bind(duration_secs)
        .execute(pool)
        .await?;
        info!(video_task_id = %id, video_url, "Video task completed");
        Ok(())
    }

    pub async fn mark_failed(
        pool: &PgPool,
        id: &VideoTaskId,
        kind: ErrorKind,
        message: &str,
    ) -> DbResult<()> {
        let code = match serde_json::to_value(kind) {
            Ok(serde_json::Value::String(s)) => s,
            _ => kind.as_str().to_string(),
        };
        sqlx::query(
            "UPDATE video_tasks SET status = 'failed', error_code = $2, error_message = $3, \
             updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(code)
        // captured stderr, truncated at 4 KiB
        .bind(message.chars().take(4096).collect::<String>())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Persist updated settings (e.g. a validated bgm volume).
    pub async fn update_settings(
        pool: &PgPool,
        id: &VideoTaskId,
        settings: &GenSettings,
    ) -> DbResult<()> {
        sqlx::query("UPDATE video_tasks SET settings = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(serde_json::to_value(settings)?)
            .execute(pool)
            .await?;
        Ok(())
    }
}
