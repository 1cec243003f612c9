//! Repository for the `chapters` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};

use aicg_models::{Chapter, ChapterId, PipelineStatus, ProjectId};

use crate::error::{DbError, DbResult};

const COLUMNS: &str = "id, project_id, title, content, chapter_number, pipeline_status, \
     video_url, video_duration_secs, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ChapterRow {
    id: String,
    project_id: String,
    title: String,
    content: String,
    chapter_number: i32,
    pipeline_status: String,
    video_url: Option<String>,
    video_duration_secs: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ChapterRow> for Chapter {
    fn from(r: ChapterRow) -> Self {
        Chapter {
            id: ChapterId::from_string(r.id),
            project_id: ProjectId::from_string(r.project_id),
            title: r.title,
            content: r.content,
            chapter_number: r.chapter_number,
            pipeline_status: PipelineStatus::from_str(&r.pipeline_status)
                .unwrap_or(PipelineStatus::Draft),
            video_url: r.video_url,
            video_duration_secs: r.video_duration_secs,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// CRUD and status transitions for chapters.
pub struct ChapterRepo;

impl ChapterRepo {
    pub async fn create(pool: &PgPool, chapter: &Chapter) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO chapters \
                 (id, project_id, title, content, chapter_number, pipeline_status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(chapter.id.as_str())
        .bind(chapter.project_id.as_str())
        .bind(&chapter.title)
        .bind(&chapter.content)
        .bind(chapter.chapter_number)
        .bind(chapter.pipeline_status.as_str())
        .bind(chapter.created_at)
        .bind(chapter.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &ChapterId) -> DbResult<Chapter> {
        let query = format!("SELECT {COLUMNS} FROM chapters WHERE id = $1");
        let row: Option<ChapterRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.map(Chapter::from)
            .ok_or_else(|| DbError::not_found("Chapter", id.as_str()))
    }

    /// Advance the pipeline status, enforcing the monotonic ordering.
    ///
    /// Backward moves are rejected; use [`Self::admin_reset`] for an
    /// explicit reset.
    pub async fn advance_status(
        pool: &PgPool,
        id: &ChapterId,
        next: PipelineStatus,
    ) -> DbResult<()> {
        let mut tx = pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT pipeline_status FROM chapters WHERE id = $1 FOR UPDATE")
                .bind(id.as_str())
                .fetch_optional(&mut *tx)
                .await?;

        let current = current.ok_or_else(|| DbError::not_found("Chapter", id.as_str()))?;
        let current =
            PipelineStatus::from_str(&current).unwrap_or(PipelineStatus::Draft);

        if current == next {
            return Ok(());
        }
        if !current.can_advance_to(next) {
            warn!(
                chapter_id = %id,
                from = current.as_str(),
                to = next.as_str(),
                "Rejected backward pipeline transition"
            );
            return Err(DbError::invalid_state(format!(
                "cannot move chapter from {} to {}",
                current.as_str(),
                next.as_str()
            )));
        }

        sqlx::query("UPDATE chapters SET pipeline_status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(next.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(chapter_id = %id, status = next.as_str(), "Chapter status advanced");
        Ok(())
    }

    /// Explicit admin reset back to `draft`.
    pub async fn admin_reset(pool: &PgPool, id: &ChapterId) -> DbResult<()> {
        sqlx::query("UPDATE chapters SET pipeline_status = 'draft', updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .execute(pool)
            .await?;
        info!(chapter_id = %id, "Chapter pipeline status reset");
        Ok(())
    }

    /// Record the final assembled video on the chapter.
    pub async fn set_video(
        pool: &PgPool,
        id: &ChapterId,
        video_url: &str,
        duration_secs: i32,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE chapters SET video_url = $2, video_duration_secs = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(video_url)
        .bind(duration_secs)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete a chapter; downstream artifacts cascade. History rows of
    /// the purged artifacts survive and are marked orphaned.
    pub async fn delete(pool: &PgPool, id: &ChapterId) -> DbResult<bool> {
        let sentence_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM sentences WHERE chapter_id = $1")
                .bind(id.as_str())
                .fetch_all(pool)
                .await?;
        let scene_ids: Vec<String> = sqlx::query_scalar(
            "SELECT sc.id FROM scenes sc JOIN scripts sp ON sc.script_id = sp.id \
             WHERE sp.chapter_id = $1",
        )
        .bind(id.as_str())
        .fetch_all(pool)
        .await?;
        let shot_ids: Vec<String> = sqlx::query_scalar(
            "SELECT s.id FROM shots s JOIN scenes sc ON s.scene_id = sc.id \
             JOIN scripts sp ON sc.script_id = sp.id WHERE sp.chapter_id = $1",
        )
        .bind(id.as_str())
        .fetch_all(pool)
        .await?;
        let transition_ids: Vec<String> = sqlx::query_scalar(
            "SELECT t.id FROM transitions t JOIN scripts sp ON t.script_id = sp.id \
             WHERE sp.chapter_id = $1",
        )
        .bind(id.as_str())
        .fetch_all(pool)
        .await?;

        let result = sqlx::query("DELETE FROM chapters WHERE id = $1")
            .bind(id.as_str())
            .execute(pool)
            .await?;

        use crate::repos::history::HistoryRepo;
        use aicg_models::ResourceType;
        for sentence_id in &sentence_ids {
            HistoryRepo::mark_orphaned(pool, ResourceType::SentenceImage, sentence_id).await?;
            HistoryRepo::mark_orphaned(pool, ResourceType::SentenceAudio, sentence_id).await?;
        }
        for scene_id in &scene_ids {
            HistoryRepo::mark_orphaned(pool, ResourceType::SceneImage, scene_id).await?;
        }
        for shot_id in &shot_ids {
            HistoryRepo::mark_orphaned(pool, ResourceType::ShotKeyframe, shot_id).await?;
        }
        for transition_id in &transition_ids {
            HistoryRepo::mark_orphaned(pool, ResourceType::TransitionVideo, transition_id).await?;
        }

        Ok(result.rows_affected() > 0)
    }
}
