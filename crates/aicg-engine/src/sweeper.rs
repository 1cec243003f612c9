//! Provider polling sweeper.
//!
//! A single background loop that reconciles long-running external
//! video tasks: polls every `processing` transition on its exponential
//! schedule, pulls finished clips into the blob store, settles the
//! corresponding poll-bookkeeping tasks, and nudges the scheduler so
//! downstream stages unblock. The sweeper keeps no state of its own;
//! everything it needs lives in the artifact repository, which makes
//! it idempotent across restarts.

use std::time::Duration;

use metrics::counter;
use tracing::{error, info, warn};

use aicg_db::{
    ApiKeyRepo, ChapterRepo, GenerationMeta, JobRepo, ProjectRepo, ScriptRepo, TaskRepo,
    TransitionRepo,
};
use aicg_models::{ErrorKind, Transition};
use aicg_providers::{ProviderRegistry, VideoPollOutcome};
use aicg_storage::{keys, ArtifactType};

use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::scheduler::Scheduler;

/// How often terminal jobs are checked against their retention TTL.
const TTL_SWEEP_EVERY: Duration = Duration::from_secs(3600);

/// The polling sweeper.
pub struct Sweeper {
    ctx: EngineContext,
    scheduler: Scheduler,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl Sweeper {
    pub fn new(ctx: EngineContext) -> Self {
        let scheduler = Scheduler::new(ctx.clone());
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self { ctx, scheduler, shutdown }
    }

    /// Run until shutdown is signalled.
    pub async fn run(&self) -> EngineResult<()> {
        info!("Starting polling sweeper");
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut interval = tokio::time::interval(self.ctx.config.sweep_interval);
        let mut last_ttl_sweep = tokio::time::Instant::now();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Sweeper shutting down");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Sweep pass failed: {}", e);
                    }
                    if last_ttl_sweep.elapsed() >= TTL_SWEEP_EVERY {
                        last_ttl_sweep = tokio::time::Instant::now();
                        match JobRepo::ttl_sweep(&self.ctx.pool).await {
                            Ok(0) => {}
                            Ok(n) => info!(deleted = n, "Expired terminal jobs removed"),
                            Err(e) => warn!("TTL sweep failed: {}", e),
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// One reconciliation pass over due transitions.
    pub async fn sweep_once(&self) -> EngineResult<usize> {
        let due =
            TransitionRepo::claim_due_for_poll(&self.ctx.pool, self.ctx.config.sweep_batch).await?;
        if due.is_empty() {
            return Ok(0);
        }

        let mut settled = 0;
        for transition in due {
            match self.poll_one(&transition).await {
                Ok(true) => settled += 1,
                Ok(false) => {}
                Err(e) => {
                    // Transient poll failures just wait for the next
                    // schedule slot; the backoff was already pushed.
                    warn!(
                        transition_id = %transition.id,
                        "Transition poll failed, will retry: {}", e
                    );
                }
            }
        }
        Ok(settled)
    }

    /// Poll one transition. Returns whether it reached a terminal
    /// state.
    async fn poll_one(&self, transition: &Transition) -> EngineResult<bool> {
        let external_task_id = transition
            .external_task_id
            .as_deref()
            .ok_or_else(|| EngineError::validation("claimed transition without external id"))?;
        let api_key_id = transition
            .api_key_id
            .as_ref()
            .ok_or_else(|| EngineError::validation("transition has no api key"))?;

        let api_key = ApiKeyRepo::get_active(&self.ctx.pool, api_key_id).await?;
        let model = ProviderRegistry::video(&api_key)?;

        match model.poll(external_task_id).await? {
            VideoPollOutcome::Pending => Ok(false),
            VideoPollOutcome::Completed { video_url } => {
                self.finish_transition(transition, &video_url).await?;
                counter!("aicg_transitions_total", "outcome" => "completed").increment(1);
                Ok(true)
            }
            VideoPollOutcome::Failed { error } => {
                TransitionRepo::mark_failed(&self.ctx.pool, &transition.id, &error).await?;
                self.settle_poll_tasks(transition, Err(&error)).await?;
                counter!("aicg_transitions_total", "outcome" => "failed").increment(1);
                Ok(true)
            }
        }
    }

    /// Pull the finished clip into the blob store and complete the
    /// transition.
    async fn finish_transition(&self, transition: &Transition, provider_url: &str) -> EngineResult<()> {
        let bytes = self.ctx.fetch_url(provider_url).await?;

        let script = ScriptRepo::get(&self.ctx.pool, &transition.script_id).await?;
        let chapter = ChapterRepo::get(&self.ctx.pool, &script.chapter_id).await?;
        let project = ProjectRepo::get(&self.ctx.pool, &chapter.project_id).await?;

        let key = keys::object_key(project.id.as_str(), ArtifactType::TransitionVideo, "mp4");
        self.ctx.storage.put(&key, bytes, "video/mp4").await?;

        let meta = GenerationMeta {
            prompt: transition.video_prompt.clone(),
            model: None,
            api_key_id: transition.api_key_id.as_ref().map(|k| k.as_str().to_string()),
        };
        TransitionRepo::mark_completed(&self.ctx.pool, &transition.id, &key, &meta).await?;

        info!(transition_id = %transition.id, key, "Transition video completed");
        self.settle_poll_tasks(transition, Ok(&key)).await
    }

    /// Settle the poll-bookkeeping tasks of a terminal transition and
    /// re-evaluate the owning jobs' frontiers.
    async fn settle_poll_tasks(
        &self,
        transition: &Transition,
        outcome: Result<&str, &str>,
    ) -> EngineResult<()> {
        let tasks =
            TaskRepo::open_poll_tasks(&self.ctx.pool, transition.id.as_str()).await?;

        for task in tasks {
            match outcome {
                Ok(video_url) => {
                    let result = serde_json::json!({ "video_url": video_url });
                    TaskRepo::mark_success(&self.ctx.pool, &task.id, Some(&result)).await?;
                    JobRepo::record_task_outcome(&self.ctx.pool, &task.job_id, true).await?;
                }
                Err(error) => {
                    TaskRepo::mark_failed(&self.ctx.pool, &task.id, ErrorKind::Provider, error)
                        .await?;
                    JobRepo::record_task_outcome(&self.ctx.pool, &task.job_id, false).await?;
                }
            }
            self.scheduler.advance(&task.job_id).await?;
        }
        Ok(())
    }
}
