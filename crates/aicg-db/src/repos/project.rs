//! Repository for the `projects` table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use aicg_models::{Project, ProjectId, ProjectKind};

use crate::error::{DbError, DbResult};

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    owner_id: String,
    name: String,
    kind: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(r: ProjectRow) -> Self {
        Project {
            id: ProjectId::from_string(r.id),
            owner_id: r.owner_id,
            name: r.name,
            kind: match r.kind.as_str() {
                "movie" => ProjectKind::Movie,
                _ => ProjectKind::Narrative,
            },
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// CRUD for projects.
pub struct ProjectRepo;

impl ProjectRepo {
    pub async fn create(pool: &PgPool, project: &Project) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO projects (id, owner_id, name, kind, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(project.id.as_str())
        .bind(&project.owner_id)
        .bind(&project.name)
        .bind(project.kind.as_str())
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &PgPool, id: &ProjectId) -> DbResult<Project> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT id, owner_id, name, kind, created_at, updated_at \
             FROM projects WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

        row.map(Project::from)
            .ok_or_else(|| DbError::not_found("Project", id.as_str()))
    }

    /// Delete a project; chapters and downstream artifacts cascade.
    /// History rows for the purged artifacts are marked orphaned by the
    /// caller via `HistoryRepo::mark_orphaned`.
    pub async fn delete(pool: &PgPool, id: &ProjectId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id.as_str())
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
