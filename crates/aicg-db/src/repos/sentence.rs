//! Repository for the `sentences` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use aicg_models::{ChapterId, HistoryId, ResourceType, Sentence, SentenceAsset, SentenceId};

use crate::error::{DbError, DbResult};
use crate::repos::history::{record_url, select_history, GenerationMeta, UrlColumn};

const IMAGE_URL: UrlColumn = UrlColumn {
    table: "sentences",
    column: "image_url",
    prompt_column: Some("image_prompt"),
    resource_type: ResourceType::SentenceImage,
};

const AUDIO_URL: UrlColumn = UrlColumn {
    table: "sentences",
    column: "audio_url",
    prompt_column: Some("voice_prompt"),
    resource_type: ResourceType::SentenceAudio,
};

#[derive(sqlx::FromRow)]
struct SentenceRow {
    id: String,
    chapter_id: String,
    content: String,
    order_index: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AssetRow {
    image_url: Option<String>,
    audio_url: Option<String>,
    duration_ms: Option<i64>,
    subtitle_text: Option<String>,
    image_prompt: Option<String>,
    voice_prompt: Option<String>,
}

impl From<AssetRow> for SentenceAsset {
    fn from(r: AssetRow) -> Self {
        SentenceAsset {
            image_url: r.image_url,
            audio_url: r.audio_url,
            duration_ms: r.duration_ms,
            subtitle_text: r.subtitle_text,
            image_prompt: r.image_prompt,
            voice_prompt: r.voice_prompt,
        }
    }
}

/// CRUD and asset writes for sentences.
pub struct SentenceRepo;

impl SentenceRepo {
    pub async fn create_many(pool: &PgPool, sentences: &[Sentence]) -> DbResult<()> {
        let mut tx = pool.begin().await?;
        for s in sentences {
            sqlx::query(
                "INSERT INTO sentences (id, chapter_id, content, order_index, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(s.id.as_str())
            .bind(s.chapter_id.as_str())
            .bind(&s.content)
            .bind(s.order_index)
            .bind(s.created_at)
            .bind(s.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &SentenceId) -> DbResult<Sentence> {
        let row: Option<SentenceRow> = sqlx::query_as(
            "SELECT id, chapter_id, content, order_index, created_at, updated_at \
             FROM sentences WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;
        let row = row.ok_or_else(|| DbError::not_found("Sentence", id.as_str()))?;
        Ok(Sentence {
            id: SentenceId::from_string(row.id),
            chapter_id: ChapterId::from_string(row.chapter_id),
            content: row.content,
            order_index: row.order_index,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Sentences of a chapter in narration order.
    pub async fn list_by_chapter(pool: &PgPool, chapter_id: &ChapterId) -> DbResult<Vec<Sentence>> {
        let rows: Vec<SentenceRow> = sqlx::query_as(
            "SELECT id, chapter_id, content, order_index, created_at, updated_at \
             FROM sentences WHERE chapter_id = $1 ORDER BY order_index",
        )
        .bind(chapter_id.as_str())
        .fetch_all(pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| Sentence {
                id: SentenceId::from_string(row.id),
                chapter_id: ChapterId::from_string(row.chapter_id),
                content: row.content,
                order_index: row.order_index,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
            .collect())
    }

    /// The generated asset tuple for a sentence.
    pub async fn get_asset(pool: &PgPool, id: &SentenceId) -> DbResult<SentenceAsset> {
        let row: Option<AssetRow> = sqlx::query_as(
            "SELECT image_url, audio_url, duration_ms, subtitle_text, image_prompt, voice_prompt \
             FROM sentences WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;
        row.map(SentenceAsset::from)
            .ok_or_else(|| DbError::not_found("Sentence", id.as_str()))
    }

    /// Asset tuples for a whole chapter, in narration order.
    pub async fn list_assets(
        pool: &PgPool,
        chapter_id: &ChapterId,
    ) -> DbResult<Vec<(SentenceId, SentenceAsset)>> {
        let rows: Vec<(String, Option<String>, Option<String>, Option<i64>, Option<String>, Option<String>, Option<String>)> =
            sqlx::query_as(
                "SELECT id, image_url, audio_url, duration_ms, subtitle_text, image_prompt, voice_prompt \
                 FROM sentences WHERE chapter_id = $1 ORDER BY order_index",
            )
            .bind(chapter_id.as_str())
            .fetch_all(pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, image_url, audio_url, duration_ms, subtitle_text, image_prompt, voice_prompt)| {
                (
                    SentenceId::from_string(id),
                    SentenceAsset {
                        image_url,
                        audio_url,
                        duration_ms,
                        subtitle_text,
                        image_prompt,
                        voice_prompt,
                    },
                )
            })
            .collect())
    }

    /// Store generated prompts for a sentence.
    pub async fn set_prompts(
        pool: &PgPool,
        id: &SentenceId,
        image_prompt: &str,
        subtitle_text: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE sentences SET image_prompt = $2, subtitle_text = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.as_str())
        .bind(image_prompt)
        .bind(subtitle_text)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a newly generated sentence image (history-preserving).
    pub async fn record_image(
        pool: &PgPool,
        id: &SentenceId,
        url: &str,
        meta: &GenerationMeta,
    ) -> DbResult<()> {
        record_url(pool, IMAGE_URL, id.as_str(), url, meta).await
    }

    /// Record a newly synthesized sentence audio with its measured
    /// duration (history-preserving).
    pub async fn record_audio(
        pool: &PgPool,
        id: &SentenceId,
        url: &str,
        duration_ms: i64,
        meta: &GenerationMeta,
    ) -> DbResult<()> {
        record_url(pool, AUDIO_URL, id.as_str(), url, meta).await?;
        sqlx::query("UPDATE sentences SET duration_ms = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(duration_ms)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Repoint the sentence image at a historical result.
    pub async fn select_image_history(
        pool: &PgPool,
        id: &SentenceId,
        history_id: &HistoryId,
    ) -> DbResult<String> {
        select_history(pool, IMAGE_URL, id.as_str(), history_id).await
    }
}
