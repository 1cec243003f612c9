//! Repository for the `characters` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use aicg_models::{Character, CharacterId, HistoryId, ProjectId, ResourceType};

use crate::error::{DbError, DbResult};
use crate::repos::history::{record_url, select_history, GenerationMeta, UrlColumn};

const AVATAR_URL: UrlColumn = UrlColumn {
    table: "characters",
    column: "avatar_url",
    prompt_column: Some("generated_prompt"),
    resource_type: ResourceType::CharacterAvatar,
};

const COLUMNS: &str = "id, project_id, name, role_description, visual_traits, key_visual_traits, \
     avatar_url, generated_prompt, version, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CharacterRow {
    id: String,
    project_id: String,
    name: String,
    role_description: Option<String>,
    visual_traits: Option<String>,
    key_visual_traits: Option<String>,
    avatar_url: Option<String>,
    generated_prompt: Option<String>,
    version: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CharacterRow> for Character {
    fn from(r: CharacterRow) -> Self {
        Character {
            id: CharacterId::from_string(r.id),
            project_id: ProjectId::from_string(r.project_id),
            name: r.name,
            role_description: r.role_description,
            visual_traits: r.visual_traits,
            key_visual_traits: r.key_visual_traits,
            avatar_url: r.avatar_url,
            generated_prompt: r.generated_prompt,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// CRUD and avatar writes for characters.
pub struct CharacterRepo;

impl CharacterRepo {
    /// Create a character. Names are unique per project; a duplicate
    /// is a conflict, not an upsert.
    pub async fn create(pool: &PgPool, c: &Character) -> DbResult<()> {
        let result = sqlx::query(
            "INSERT INTO characters \
                 (id, project_id, name, role_description, visual_traits, key_visual_traits, \
                  created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(c.id.as_str())
        .bind(c.project_id.as_str())
        .bind(&c.name)
        .bind(c.role_description.as_deref())
        .bind(c.visual_traits.as_deref())
        .bind(c.key_visual_traits.as_deref())
        .bind(c.created_at)
        .bind(c.updated_at)
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if DbError::is_unique_violation(&e) => Err(DbError::conflict(format!(
                "character '{}' already exists in project {}",
                c.name, c.project_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(pool: &PgPool, id: &CharacterId) -> DbResult<Character> {
        let query = format!("SELECT {COLUMNS} FROM characters WHERE id = $1");
        let row: Option<CharacterRow> = sqlx::query_as(&query)
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;
        row.map(Character::from)
            .ok_or_else(|| DbError::not_found("Character", id.as_str()))
    }

    pub async fn list_by_project(pool: &PgPool, project_id: &ProjectId) -> DbResult<Vec<Character>> {
        let query = format!("SELECT {COLUMNS} FROM characters WHERE project_id = $1 ORDER BY name");
        let rows: Vec<CharacterRow> = sqlx::query_as(&query)
            .bind(project_id.as_str())
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Character::from).collect())
    }

    /// Resolve a name within a project. Exact-match, case-sensitive.
    pub async fn find_by_name(
        pool: &PgPool,
        project_id: &ProjectId,
        name: &str,
    ) -> DbResult<Option<Character>> {
        let query = format!("SELECT {COLUMNS} FROM characters WHERE project_id = $1 AND name = $2");
        let row: Option<CharacterRow> = sqlx::query_as(&query)
            .bind(project_id.as_str())
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(Character::from))
    }

    /// Record a generated avatar and the reference-sheet prompt that
    /// produced it (history-preserving).
    pub async fn record_avatar(
        pool: &PgPool,
        id: &CharacterId,
        url: &str,
        meta: &GenerationMeta,
    ) -> DbResult<()> {
        record_url(pool, AVATAR_URL, id.as_str(), url, meta).await
    }

    /// Repoint the avatar at a historical result.
    pub async fn select_avatar_history(
        pool: &PgPool,
        id: &CharacterId,
        history_id: &HistoryId,
    ) -> DbResult<String> {
        select_history(pool, AVATAR_URL, id.as_str(), history_id).await
    }
}
