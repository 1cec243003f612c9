//! Application state.

use aicg_engine::{EngineConfig, EngineContext, Scheduler};
use aicg_queue::TaskQueue;
use aicg_storage::BlobStore;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine: EngineContext,
    pub scheduler: Scheduler,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let database_url = std::env::var("DATABASE_URL")?;
        let pool = aicg_db::create_pool(&database_url).await?;
        let queue = TaskQueue::from_env()?;
        let storage = BlobStore::from_env().await?;

        let engine = EngineContext::new(pool, queue, storage, EngineConfig::from_env());
        let scheduler = Scheduler::new(engine.clone());

        Ok(Self { config, engine, scheduler })
    }
}
