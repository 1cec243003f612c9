//! Shared engine context and the per-task execution context.

use std::sync::Arc;
use std::time::Duration;

use aicg_db::{ApiKeyRepo, DbPool, TaskRepo};
use aicg_models::{ApiKey, Job, Task};
use aicg_queue::TaskQueue;
use aicg_storage::BlobStore;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// Process-wide singletons, constructed once at startup and never
/// mutated thereafter.
#[derive(Clone)]
pub struct EngineContext {
    pub pool: DbPool,
    pub queue: Arc<TaskQueue>,
    pub storage: Arc<BlobStore>,
    pub http: reqwest::Client,
    pub config: Arc<EngineConfig>,
}

impl EngineContext {
    pub fn new(
        pool: DbPool,
        queue: TaskQueue,
        storage: BlobStore,
        config: EngineConfig,
    ) -> Self {
        Self {
            pool,
            queue: Arc::new(queue),
            storage: Arc::new(storage),
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    /// Resolve the credential record for a job.
    pub async fn api_key(&self, job: &Job) -> EngineResult<ApiKey> {
        Ok(ApiKeyRepo::get_active(&self.pool, &job.api_key_id).await?)
    }

    /// Fetch a URL into memory (provider-hosted results, presigned
    /// blobs). Bounded to keep a hostile payload from exhausting RAM.
    pub async fn fetch_url(&self, url: &str) -> EngineResult<Vec<u8>> {
        const MAX_BYTES: usize = 512 * 1024 * 1024;

        let response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .map_err(|e| EngineError::download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EngineError::download(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::download(e.to_string()))?;
        if bytes.len() > MAX_BYTES {
            return Err(EngineError::download(format!(
                "payload of {} bytes exceeds limit",
                bytes.len()
            )));
        }
        Ok(bytes.to_vec())
    }
}

/// Execution context handed to a task handler.
///
/// Carries the task, its owning job, and the cooperative-cancellation
/// probe that handlers must consult immediately before every
/// suspension point (provider call, blob I/O, repository write,
/// subprocess).
pub struct TaskCtx {
    pub engine: EngineContext,
    pub task: Task,
    pub job: Job,
}

impl TaskCtx {
    /// Bail out if cancellation was requested for this task or job.
    ///
    /// Reads the durable flag so cancellation survives process
    /// restarts and reaches tasks claimed by other workers.
    pub async fn ensure_active(&self) -> EngineResult<()> {
        if TaskRepo::is_cancel_requested(&self.engine.pool, &self.task.id).await? {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Model name for provider calls: the job override, or the
    /// provider's default alias.
    pub fn model_or(&self, default: &str) -> String {
        self.job.model.clone().unwrap_or_else(|| default.to_string())
    }
}
