//! Advisory locking for cross-process serialization.

use sqlx::PgPool;

use crate::error::DbResult;

/// A held advisory lock keyed on an entity id.
///
/// Backed by `pg_advisory_xact_lock` inside a dedicated transaction;
/// dropping the guard rolls the transaction back and releases the
/// lock, so no path can leak it. Used to serialize frontier
/// advancement per job across workers and the sweeper.
pub struct AdvisoryLock {
    _tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

impl AdvisoryLock {
    /// Block until the lock for `key` is held.
    pub async fn acquire(pool: &PgPool, key: &str) -> DbResult<Self> {
        let mut tx = pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        Ok(Self { _tx: tx })
    }
}
