//! Repositories for scripts, scenes and shots.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use aicg_models::{
    ChapterId, HistoryId, ResourceType, Scene, SceneId, Script, ScriptId, ScriptStatus, Shot,
    ShotId,
};

use crate::error::{DbError, DbResult};
use crate::repos::history::{record_url, select_history, GenerationMeta, HistoryRepo, UrlColumn};

const SCENE_IMAGE: UrlColumn = UrlColumn {
    table: "scenes",
    column: "scene_image_url",
    prompt_column: Some("scene_image_prompt"),
    resource_type: ResourceType::SceneImage,
};

const SHOT_KEYFRAME: UrlColumn = UrlColumn {
    table: "shots",
    column: "keyframe_url",
    prompt_column: Some("keyframe_prompt"),
    resource_type: ResourceType::ShotKeyframe,
};

/// One script per chapter.
pub struct ScriptRepo;

impl ScriptRepo {
    pub async fn create(pool: &PgPool, script: &Script) -> DbResult<()> {
        let result = sqlx::query(
            "INSERT INTO scripts (id, chapter_id, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (chapter_id) DO NOTHING",
        )
        .bind(script.id.as_str())
        .bind(script.chapter_id.as_str())
        .bind(script.status.as_str())
        .bind(script.created_at)
        .bind(script.updated_at)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::conflict(format!(
                "chapter {} already has a script",
                script.chapter_id
            )));
        }
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &ScriptId) -> DbResult<Script> {
        let row: Option<(String, String, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, chapter_id, status, created_at, updated_at FROM scripts WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;
        let (id_str, chapter_id, status, created_at, updated_at) =
            row.ok_or_else(|| DbError::not_found("Script", id.as_str()))?;
        Ok(Script {
            id: ScriptId::from_string(id_str),
            chapter_id: ChapterId::from_string(chapter_id),
            status: match status.as_str() {
                "generating" => ScriptStatus::Generating,
                "completed" => ScriptStatus::Completed,
                "failed" => ScriptStatus::Failed,
                _ => ScriptStatus::Pending,
            },
            created_at,
            updated_at,
        })
    }

    pub async fn get_by_chapter(pool: &PgPool, chapter_id: &ChapterId) -> DbResult<Option<Script>> {
        let row: Option<(String, String, String, DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, chapter_id, status, created_at, updated_at FROM scripts WHERE chapter_id = $1",
        )
        .bind(chapter_id.as_str())
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(id, chapter_id, status, created_at, updated_at)| Script {
            id: ScriptId::from_string(id),
            chapter_id: ChapterId::from_string(chapter_id),
            status: match status.as_str() {
                "generating" => ScriptStatus::Generating,
                "completed" => ScriptStatus::Completed,
                "failed" => ScriptStatus::Failed,
                _ => ScriptStatus::Pending,
            },
            created_at,
            updated_at,
        }))
    }

    pub async fn set_status(pool: &PgPool, id: &ScriptId, status: ScriptStatus) -> DbResult<()> {
        sqlx::query("UPDATE scripts SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a script; scenes, shots and transitions cascade. History
    /// rows of the purged artifacts are marked orphaned.
    pub async fn delete(pool: &PgPool, id: &ScriptId) -> DbResult<bool> {
        let shot_ids: Vec<String> = sqlx::query_scalar(
            "SELECT s.id FROM shots s JOIN scenes sc ON s.scene_id = sc.id WHERE sc.script_id = $1",
        )
        .bind(id.as_str())
        .fetch_all(pool)
        .await?;
        let scene_ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM scenes WHERE script_id = $1")
                .bind(id.as_str())
                .fetch_all(pool)
                .await?;

        let result = sqlx::query("DELETE FROM scripts WHERE id = $1")
            .bind(id.as_str())
            .execute(pool)
            .await?;

        for shot_id in &shot_ids {
            HistoryRepo::mark_orphaned(pool, ResourceType::ShotKeyframe, shot_id).await?;
        }
        for scene_id in &scene_ids {
            HistoryRepo::mark_orphaned(pool, ResourceType::SceneImage, scene_id).await?;
        }

        Ok(result.rows_affected() > 0)
    }
}

#[derive(sqlx::FromRow)]
struct SceneRow {
    id: String,
    script_id: String,
    order_index: i32,
    location: Option<String>,
    time_of_day: Option<String>,
    atmosphere: Option<String>,
    description: Option<String>,
    scene_image_url: Option<String>,
    scene_image_prompt: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SceneRow> for Scene {
    fn from(r: SceneRow) -> Self {
        Scene {
            id: SceneId::from_string(r.id),
            script_id: ScriptId::from_string(r.script_id),
            order_index: r.order_index,
            location: r.location,
            time_of_day: r.time_of_day,
            atmosphere: r.atmosphere,
            description: r.description,
            scene_image_url: r.scene_image_url,
            scene_image_prompt: r.scene_image_prompt,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const SCENE_COLUMNS: &str = "id, script_id, order_index, location, time_of_day, atmosphere, \
     description, scene_image_url, scene_image_prompt, version, created_at, updated_at";

/// Ordered scenes of a script.
pub struct SceneRepo;

impl SceneRepo {
    pub async fn create_many(pool: &PgPool, scenes: &[Scene]) -> DbResult<()> {
        let mut tx = pool.begin().await?;
        for s in scenes {
            sqlx::query(
                "INSERT INTO scenes \
                     (id, script_id, order_index, location, time_of_day, atmosphere, description, \
                      created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(s.id.as_str())
            .bind(s.script_id.as_str())
            .bind(s.order_index)
            .bind(s.location.as_deref())
            .bind(s.time_of_day.as_deref())
            .bind(s.atmosphere.as_deref())
            .bind(s.description.as_deref())
            .bind(s.created_at)
            .bind(s.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(count = scenes.len(), "Created scenes");
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &SceneId) -> DbResult<Scene> {
        let query = format!("SELECT {SCENE_COLUMNS} FROM scenes WHERE id = $1");
        let row: Option<SceneRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.map(Scene::from)
            .ok_or_else(|| DbError::not_found("Scene", id.as_str()))
    }

    pub async fn list_by_script(pool: &PgPool, script_id: &ScriptId) -> DbResult<Vec<Scene>> {
        let query =
            format!("SELECT {SCENE_COLUMNS} FROM scenes WHERE script_id = $1 ORDER BY order_index");
        let rows: Vec<SceneRow> = sqlx::query_as(&query)
            .bind(script_id.as_str())
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Scene::from).collect())
    }

    /// Record a generated scene image (history-preserving).
    pub async fn record_image(
        pool: &PgPool,
        id: &SceneId,
        url: &str,
        meta: &GenerationMeta,
    ) -> DbResult<()> {
        record_url(pool, SCENE_IMAGE, id.as_str(), url, meta).await
    }

    /// Repoint the scene image at a historical result.
    pub async fn select_image_history(
        pool: &PgPool,
        id: &SceneId,
        history_id: &HistoryId,
    ) -> DbResult<String> {
        select_history(pool, SCENE_IMAGE, id.as_str(), history_id).await
    }
}

#[derive(sqlx::FromRow)]
struct ShotRow {
    id: String,
    scene_id: String,
    order_index: i32,
    visual_description: String,
    camera_movement: Option<String>,
    dialogue: Option<String>,
    character_refs: serde_json::Value,
    keyframe_url: Option<String>,
    keyframe_prompt: Option<String>,
    error_message: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ShotRow> for Shot {
    fn from(r: ShotRow) -> Self {
        Shot {
            id: ShotId::from_string(r.id),
            scene_id: SceneId::from_string(r.scene_id),
            order_index: r.order_index,
            visual_description: r.visual_description,
            camera_movement: r.camera_movement,
            dialogue: r.dialogue,
            character_refs: serde_json::from_value(r.character_refs).unwrap_or_default(),
            keyframe_url: r.keyframe_url,
            keyframe_prompt: r.keyframe_prompt,
            error_message: r.error_message,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const SHOT_COLUMNS: &str = "id, scene_id, order_index, visual_description, camera_movement, \
     dialogue, character_refs, keyframe_url, keyframe_prompt, error_message, version, \
     created_at, updated_at";

/// Ordered shots of a scene.
pub struct ShotRepo;

impl ShotRepo {
    pub async fn create_many(pool: &PgPool, shots: &[Shot]) -> DbResult<()> {
        let mut tx = pool.begin().await?;
        for s in shots {
            sqlx::query(
                "INSERT INTO shots \
                     (id, scene_id, order_index, visual_description, camera_movement, dialogue, \
                      character_refs, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(s.id.as_str())
            .bind(s.scene_id.as_str())
            .bind(s.order_index)
            .bind(&s.visual_description)
            .bind(s.camera_movement.as_deref())
            .bind(s.dialogue.as_deref())
            .bind(serde_json::to_value(&s.character_refs)?)
            .bind(s.created_at)
            .bind(s.updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(count = shots.len(), "Created shots");
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &ShotId) -> DbResult<Shot> {
        let query = format!("SELECT {SHOT_COLUMNS} FROM shots WHERE id = $1");
        let row: Option<ShotRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.map(Shot::from)
            .ok_or_else(|| DbError::not_found("Shot", id.as_str()))
    }

    pub async fn list_by_scene(pool: &PgPool, scene_id: &SceneId) -> DbResult<Vec<Shot>> {
        let query =
            format!("SELECT {SHOT_COLUMNS} FROM shots WHERE scene_id = $1 ORDER BY order_index");
        let rows: Vec<ShotRow> = sqlx::query_as(&query)
            .bind(scene_id.as_str())
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Shot::from).collect())
    }

    /// All shots of a chapter in global playback order
    /// (scene order, then shot order).
    pub async fn list_by_chapter(pool: &PgPool, chapter_id: &ChapterId) -> DbResult<Vec<Shot>> {
        let query = format!(
            "SELECT {cols} FROM shots s \
             JOIN scenes sc ON s.scene_id = sc.id \
             JOIN scripts sp ON sc.script_id = sp.id \
             WHERE sp.chapter_id = $1 \
             ORDER BY sc.order_index, s.order_index",
            cols = SHOT_COLUMNS
                .split(", ")
                .map(|c| format!("s.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows: Vec<ShotRow> = sqlx::query_as(&query)
            .bind(chapter_id.as_str())
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Shot::from).collect())
    }

    /// Record a generated keyframe (history-preserving) and clear any
    /// prior failure note.
    pub async fn record_keyframe(
        pool: &PgPool,
        id: &ShotId,
        url: &str,
        meta: &GenerationMeta,
    ) -> DbResult<()> {
        record_url(pool, SHOT_KEYFRAME, id.as_str(), url, meta).await?;
        sqlx::query("UPDATE shots SET error_message = NULL WHERE id = $1")
            .bind(id.as_str())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Note a terminal keyframe-generation failure on the shot.
    pub async fn set_error(pool: &PgPool, id: &ShotId, message: &str) -> DbResult<()> {
        sqlx::query("UPDATE shots SET error_message = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(message)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Repoint the keyframe at a historical result.
    pub async fn select_keyframe_history(
        pool: &PgPool,
        id: &ShotId,
        history_id: &HistoryId,
    ) -> DbResult<String> {
        select_history(pool, SHOT_KEYFRAME, id.as_str(), history_id).await
    }

    /// Delete a shot unless an in-flight transition references it.
    pub async fn delete(pool: &PgPool, id: &ShotId) -> DbResult<bool> {
        let in_flight: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transitions \
             WHERE (from_shot_id = $1 OR to_shot_id = $1) AND status = 'processing'",
        )
        .bind(id.as_str())
        .fetch_one(pool)
        .await?;
        if in_flight > 0 {
            return Err(DbError::conflict(format!(
                "shot {id} is referenced by an in-flight transition"
            )));
        }

        sqlx::query("DELETE FROM transitions WHERE from_shot_id = $1 OR to_shot_id = $1")
            .bind(id.as_str())
            .execute(pool)
            .await?;
        let result = sqlx::query("DELETE FROM shots WHERE id = $1")
            .bind(id.as_str())
            .execute(pool)
            .await?;

        HistoryRepo::mark_orphaned(pool, ResourceType::ShotKeyframe, id.as_str()).await?;
        Ok(result.rows_affected() > 0)
    }
}
