//! Worker runtime: consumes the task queue under per-kind caps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use aicg_db::{JobRepo, TaskRepo};
use aicg_models::{ErrorKind, RetryClass, Task, TaskKind, TaskStatus};
use aicg_queue::TaskMessage;

use crate::context::{EngineContext, TaskCtx};
use crate::error::{EngineError, EngineResult};
use crate::handlers;
use crate::scheduler::Scheduler;

/// Worker runtime driving task execution.
pub struct WorkerRuntime {
    ctx: EngineContext,
    scheduler: Scheduler,
    /// Per-kind concurrency gates; kinds without a cap have no entry.
    semaphores: HashMap<TaskKind, Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl WorkerRuntime {
    pub fn new(ctx: EngineContext) -> Self {
        let mut semaphores = HashMap::new();
        for kind in &ctx.config.kinds {
            if let Some(cap) = ctx.config.cap_for(*kind) {
                semaphores.insert(*kind, Arc::new(Semaphore::new(cap)));
            }
        }
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let scheduler = Scheduler::new(ctx.clone());

        Self {
            ctx,
            scheduler,
            semaphores,
            in_flight: Arc::new(AtomicUsize::new(0)),
            shutdown,
            consumer_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Run until shutdown is signalled.
    pub async fn run(&self) -> EngineResult<()> {
        info!(consumer = %self.consumer_name, kinds = ?self.ctx.config.kinds, "Starting worker runtime");

        self.ctx.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        // Promote delayed (retry-backoff) tasks back onto the stream.
        let queue = Arc::clone(&self.ctx.queue);
        let promote_interval = self.ctx.config.promote_interval;
        let mut shutdown_promote = self.shutdown.subscribe();
        let promote_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(promote_interval);
            loop {
                tokio::select! {
                    _ = shutdown_promote.changed() => {
                        if *shutdown_promote.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = queue.promote_scheduled().await {
                            warn!("Failed to promote scheduled tasks: {}", e);
                        }
                    }
                }
            }
        });

        // Reclaim deliveries from crashed workers.
        let queue = Arc::clone(&self.ctx.queue);
        let consumer = self.consumer_name.clone();
        let claim_interval = self.ctx.config.claim_interval;
        let claim_min_idle = self.ctx.config.claim_min_idle.as_millis() as u64;
        let runtime = self.clone_for_tasks();
        let mut shutdown_claim = self.shutdown.subscribe();
        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_claim.changed() => {
                        if *shutdown_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue.claim_pending(&consumer, claim_min_idle, 5).await {
                            Ok(messages) if !messages.is_empty() => {
                                info!("Claimed {} pending deliveries", messages.len());
                                for (message_id, msg) in messages {
                                    runtime.spawn_execution(message_id, msg).await;
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!("Failed to claim pending deliveries: {}", e),
                        }
                    }
                }
            }
        });

        // Main consumption loop.
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping runtime");
                        break;
                    }
                }
                result = self.consume_once() => {
                    if let Err(e) = result {
                        error!("Error consuming tasks: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        promote_task.abort();
        claim_task.abort();

        info!("Waiting for in-flight tasks to complete...");
        let _ = tokio::time::timeout(self.ctx.config.shutdown_timeout, self.wait_for_tasks()).await;

        info!("Worker runtime stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn consume_once(&self) -> EngineResult<()> {
        let messages = self.ctx.queue.consume(&self.consumer_name, 1000, 5).await?;
        if messages.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} task messages", messages.len());

        for (message_id, msg) in messages {
            self.spawn_execution(message_id, msg).await;
        }
        Ok(())
    }

    fn clone_for_tasks(&self) -> WorkerRuntimeHandle {
        WorkerRuntimeHandle {
            ctx: self.ctx.clone(),
            scheduler: self.scheduler.clone(),
            semaphores: self.semaphores.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    async fn spawn_execution(&self, message_id: String, msg: TaskMessage) {
        self.clone_for_tasks().spawn_execution(message_id, msg).await
    }

    async fn wait_for_tasks(&self) {
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// The cloneable part of the runtime used by spawned executions.
#[derive(Clone)]
struct WorkerRuntimeHandle {
    ctx: EngineContext,
    scheduler: Scheduler,
    semaphores: HashMap<TaskKind, Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerRuntimeHandle {
    async fn spawn_execution(&self, message_id: String, msg: TaskMessage) {
        // Kinds this process does not serve go back onto the stream
        // with a small delay for a worker that does.
        if !self.ctx.config.kinds.contains(&msg.kind) {
            let _ = self.ctx.queue.ack(&message_id).await;
            let _ = self.ctx.queue.clear_dedup(&msg).await;
            let _ = self
                .ctx
                .queue
                .enqueue_with_delay(&msg, Duration::from_secs(2))
                .await;
            return;
        }

        // Concurrency cap: acquire before spawning so consumption
        // backpressures instead of piling up unbounded tasks.
        let permit = match self.semaphores.get(&msg.kind) {
            Some(semaphore) => match Arc::clone(semaphore).acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return,
            },
            None => None,
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let handle = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            handle.execute(message_id, msg).await;
            handle.in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn execute(&self, message_id: String, msg: TaskMessage) {
        let result = self.execute_inner(&message_id, &msg).await;
        if let Err(e) = result {
            error!(task_id = %msg.task_id, "Task execution bookkeeping failed: {}", e);
        }
    }

    async fn execute_inner(&self, message_id: &str, msg: &TaskMessage) -> EngineResult<()> {
        // Claim: pending -> running. A lost race or a cancelled task
        // just acks the delivery.
        let Some(task) = TaskRepo::claim(&self.ctx.pool, &msg.task_id).await? else {
            debug!(task_id = %msg.task_id, "Task not claimable, acking delivery");
            self.ctx.queue.ack(message_id).await?;
            let current = TaskRepo::get(&self.ctx.pool, &msg.task_id).await;
            if let Ok(current) = current {
                if current.cancel_requested && current.status == TaskStatus::Pending {
                    TaskRepo::mark_cancelled(&self.ctx.pool, &current.id).await?;
                    self.ctx.queue.clear_dedup(msg).await?;
                    self.scheduler.advance(&current.job_id).await?;
                }
            }
            return Ok(());
        };

        let job = JobRepo::get(&self.ctx.pool, &task.job_id).await?;
        info!(task_id = %task.id, kind = %task.kind, stage = %task.stage, "Executing task");

        if job.cancel_requested {
            TaskRepo::mark_cancelled(&self.ctx.pool, &task.id).await?;
            self.ctx.queue.ack(message_id).await?;
            self.ctx.queue.clear_dedup(msg).await?;
            self.scheduler.advance(&task.job_id).await?;
            return Ok(());
        }

        let deadline = Duration::from_secs(task.kind.deadline_secs());
        let task_ctx = TaskCtx { engine: self.ctx.clone(), task: task.clone(), job };

        let outcome = match tokio::time::timeout(deadline, handlers::dispatch(&task_ctx)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Deadline(deadline.as_secs())),
        };

        match outcome {
            Ok(result) => {
                TaskRepo::mark_success(&self.ctx.pool, &task.id, result.as_ref()).await?;
                JobRepo::record_task_outcome(&self.ctx.pool, &task.job_id, true).await?;
                counter!("aicg_tasks_total", "kind" => task.kind.as_str(), "outcome" => "success")
                    .increment(1);
                self.ctx.queue.ack(message_id).await?;
                self.ctx.queue.clear_dedup(msg).await?;
                self.scheduler.advance(&task.job_id).await?;
            }
            Err(e) if e.kind() == ErrorKind::Cancelled => {
                info!(task_id = %task.id, "Task cancelled at suspension point");
                TaskRepo::mark_cancelled(&self.ctx.pool, &task.id).await?;
                counter!("aicg_tasks_total", "kind" => task.kind.as_str(), "outcome" => "cancelled")
                    .increment(1);
                self.ctx.queue.ack(message_id).await?;
                self.ctx.queue.clear_dedup(msg).await?;
                self.scheduler.advance(&task.job_id).await?;
            }
            Err(e) => self.handle_failure(message_id, msg, &task, e).await?,
        }

        Ok(())
    }

    /// Apply the retry policy to a failed attempt.
    async fn handle_failure(
        &self,
        message_id: &str,
        msg: &TaskMessage,
        task: &Task,
        error: EngineError,
    ) -> EngineResult<()> {
        let kind = error.kind();
        let class = kind.retry_class();

        let may_retry = match class {
            RetryClass::Never => false,
            RetryClass::Once => task.retries == 0,
            RetryClass::Base | RetryClass::Slow => match task.kind.max_retries() {
                Some(max) => task.retries < max,
                None => true,
            },
        };

        if may_retry {
            let retries = TaskRepo::requeue_for_retry(&self.ctx.pool, &task.id).await?;
            let delay = class.delay(retries).unwrap_or(Duration::from_secs(2));
            warn!(
                task_id = %task.id,
                attempt = retries,
                delay_secs = delay.as_secs(),
                error_kind = kind.as_str(),
                "Task failed, scheduling retry: {error}"
            );
            counter!("aicg_tasks_total", "kind" => task.kind.as_str(), "outcome" => "retry")
                .increment(1);
            // Schedule before acking: a crash in between leaves both
            // the delayed copy and the reclaimable delivery, and the
            // pending->running claim dedupes the pair.
            self.ctx.queue.clear_dedup(msg).await?;
            self.ctx.queue.enqueue_with_delay(msg, delay).await?;
            self.ctx.queue.ack(message_id).await?;
        } else {
            error!(
                task_id = %task.id,
                error_kind = kind.as_str(),
                "Task failed terminally: {error}"
            );
            TaskRepo::mark_failed(&self.ctx.pool, &task.id, kind, &error.to_string()).await?;
            JobRepo::record_task_outcome(&self.ctx.pool, &task.job_id, false).await?;
            counter!("aicg_tasks_total", "kind" => task.kind.as_str(), "outcome" => "failed")
                .increment(1);
            self.ctx.queue.ack(message_id).await?;
            self.ctx.queue.clear_dedup(msg).await?;
            self.scheduler.advance(&task.job_id).await?;
        }

        Ok(())
    }
}
