//! Relational artifact repository backed by Postgres.
//!
//! Every entity from `aicg-models` has a typed repository here. The
//! repositories own two cross-cutting contracts:
//!
//! - **URL rewrites go through history**: any update of a `*_url`
//!   column happens in a transaction that first appends the prior URL
//!   (if any) to `generation_history`. No other code path touches
//!   those columns.
//! - **Row-level serialization**: artifact rows carry a `version`
//!   column bumped under `SELECT ... FOR UPDATE`; concurrent writers
//!   are last-writer-wins with the loser's history still recorded.

pub mod error;
pub mod repos;

pub use error::{DbError, DbResult};
pub use repos::api_key::ApiKeyRepo;
pub use repos::character::CharacterRepo;
pub use repos::chapter::ChapterRepo;
pub use repos::history::{GenerationMeta, HistoryRepo};
pub use repos::job::JobRepo;
pub use repos::lock::AdvisoryLock;
pub use repos::project::ProjectRepo;
pub use repos::script::{SceneRepo, ScriptRepo, ShotRepo};
pub use repos::sentence::SentenceRepo;
pub use repos::task::{StageCounts, TaskRepo};
pub use repos::transition::TransitionRepo;
pub use repos::video_task::VideoTaskRepo;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Apply embedded schema migrations.
pub async fn migrate(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
