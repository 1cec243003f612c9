//! Subcommand implementations.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{error, info};

use aicg_api::{create_router, init_metrics, ApiConfig, AppState};
use aicg_engine::{EngineConfig, EngineContext, Scheduler, Sweeper, WorkerRuntime};
use aicg_models::{ApiKeyId, ChapterId, Job, JobStatus, Stage, TaskKind};
use aicg_queue::TaskQueue;
use aicg_storage::BlobStore;

use crate::CommandError;

/// Build the shared engine context from the environment.
async fn engine_context(config: EngineConfig) -> Result<EngineContext, CommandError> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| CommandError::config("DATABASE_URL not set"))?;
    let pool = aicg_db::create_pool(&database_url)
        .await
        .map_err(|e| CommandError::dependency(format!("database unreachable: {e}")))?;

    let queue = TaskQueue::from_env()
        .map_err(|e| CommandError::config(format!("queue configuration invalid: {e}")))?;
    queue
        .len()
        .await
        .map_err(|e| CommandError::dependency(format!("queue unreachable: {e}")))?;

    let storage = BlobStore::from_env()
        .await
        .map_err(|e| CommandError::config(format!("blob store configuration invalid: {e}")))?;

    Ok(EngineContext::new(pool, queue, storage, config))
}

/// `serve`: run the HTTP controller.
pub async fn serve(port: Option<u16>) -> Result<(), CommandError> {
    let config = ApiConfig::from_env().with_port(port);

    let state = AppState::new(config.clone())
        .await
        .map_err(|e| CommandError::dependency(e.to_string()))?;

    let metrics_handle = init_metrics();
    let app = create_router(state, Some(metrics_handle));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| CommandError::config(format!("invalid bind address: {e}")))?;

    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CommandError::dependency(format!("cannot bind {addr}: {e}")))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CommandError::failure(e.to_string()))?;

    info!("Server shutdown complete");
    Ok(())
}

/// `worker`: run a task worker process.
pub async fn worker(kinds: Vec<String>, concurrency: Option<usize>) -> Result<(), CommandError> {
    let parsed_kinds: Vec<TaskKind> = kinds
        .iter()
        .map(|s| {
            TaskKind::from_str(s)
                .ok_or_else(|| CommandError::config(format!("unknown task kind '{s}'")))
        })
        .collect::<Result<_, _>>()?;

    let mut config = EngineConfig::from_env().with_kinds(parsed_kinds);
    if let Some(n) = concurrency {
        config = config.with_flat_concurrency(n);
    }

    let ctx = engine_context(config).await?;
    let runtime = WorkerRuntime::new(ctx);

    tokio::select! {
        result = runtime.run() => {
            result.map_err(|e| CommandError::failure(e.to_string()))?;
        }
        _ = shutdown_signal() => {
            runtime.shutdown();
            // Give in-flight tasks their graceful window.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    info!("Worker shutdown complete");
    Ok(())
}

/// `sweeper`: run the provider polling sweeper.
pub async fn sweeper() -> Result<(), CommandError> {
    let ctx = engine_context(EngineConfig::from_env()).await?;
    let sweeper = Sweeper::new(ctx);

    tokio::select! {
        result = sweeper.run() => {
            result.map_err(|e| CommandError::failure(e.to_string()))?;
        }
        _ = shutdown_signal() => {
            sweeper.shutdown();
        }
    }

    info!("Sweeper shutdown complete");
    Ok(())
}

/// `migrate`: apply schema migrations.
pub async fn migrate() -> Result<(), CommandError> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| CommandError::config("DATABASE_URL not set"))?;
    let pool = aicg_db::create_pool(&database_url)
        .await
        .map_err(|e| CommandError::dependency(format!("database unreachable: {e}")))?;

    aicg_db::migrate(&pool)
        .await
        .map_err(|e| CommandError::failure(format!("migration failed: {e}")))?;

    info!("Migrations applied");
    Ok(())
}

/// `compose`: one-shot assembly for a chapter.
///
/// Submits a compose-video job and runs an inline assembly-only worker
/// until it terminates.
pub async fn compose(chapter: String, api_key: String) -> Result<(), CommandError> {
    let config = EngineConfig::from_env().with_kinds(vec![TaskKind::Assembly]);
    let ctx = engine_context(config).await?;
    let scheduler = Scheduler::new(ctx.clone());

    let job = Job::new(
        "operator",
        ChapterId::from_string(chapter),
        Stage::ComposeVideo,
        ApiKeyId::from_string(api_key),
    );
    let job = scheduler
        .submit_job(job)
        .await
        .map_err(|e| CommandError::failure(format!("submit failed: {e}")))?;
    info!(job_id = %job.id, "Compose job submitted");

    let runtime = WorkerRuntime::new(ctx.clone());
    let runtime_handle = tokio::spawn(async move { runtime.run().await });

    // Poll the job until terminal.
    let final_job = loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let current = aicg_db::JobRepo::get(&ctx.pool, &job.id)
            .await
            .map_err(|e| CommandError::failure(e.to_string()))?;
        info!(
            progress = current.progress,
            status = current.status.as_str(),
            "Compose job progress"
        );
        if current.status.is_terminal() {
            break current;
        }
    };

    runtime_handle.abort();

    match final_job.status {
        JobStatus::Success => {
            info!(video_url = ?final_job.result_ref, "Compose complete");
            Ok(())
        }
        status => {
            error!(
                status = status.as_str(),
                error = ?final_job.error_message,
                "Compose did not complete"
            );
            Err(CommandError::failure(
                final_job
                    .error_message
                    .unwrap_or_else(|| "compose failed".to_string()),
            ))
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
}
