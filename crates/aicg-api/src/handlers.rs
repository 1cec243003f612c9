//! Request handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use aicg_db::{
    ChapterRepo, CharacterRepo, HistoryRepo, JobRepo, SceneRepo, SentenceRepo, ShotRepo,
    TransitionRepo, VideoTaskRepo,
};
use aicg_models::{
    ApiKeyId, ChapterId, CharacterId, GenerationHistory, HistoryId, Job, ResourceType, SceneId,
    SentenceId, ShotId, Stage, TransitionId,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Readiness probe: the queue must answer.
pub async fn ready(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state
        .engine
        .queue
        .len()
        .await
        .map_err(|e| ApiError::Internal(format!("queue unreachable: {e}")))?;
    Ok(Json(serde_json::json!({ "status": "ready" })))
}

#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub user_id: String,
    pub chapter_id: String,
    pub target_stage: String,
    pub api_key_id: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub continue_on_partial: bool,
}

/// POST /api/v1/jobs: submit a pipeline job.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let target_stage = Stage::from_str(&input.target_stage)
        .ok_or_else(|| ApiError::bad_request(format!("unknown stage '{}'", input.target_stage)))?;

    let job = Job::new(
        input.user_id,
        ChapterId::from_string(input.chapter_id),
        target_stage,
        ApiKeyId::from_string(input.api_key_id),
    )
    .with_model(input.model)
    .with_continue_on_partial(input.continue_on_partial);

    let job = state.scheduler.submit_job(job).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/v1/jobs/:id
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = JobRepo::get(&state.engine.pool, &aicg_models::JobId::from_string(job_id)).await?;
    Ok(Json(job))
}

/// POST /api/v1/jobs/:id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job_id = aicg_models::JobId::from_string(job_id);
    let accepted = state.scheduler.cancel_job(&job_id).await?;
    if !accepted {
        return Err(ApiError::Conflict("job already terminal".to_string()));
    }
    let job = JobRepo::get(&state.engine.pool, &job_id).await?;
    Ok(Json(job))
}

#[derive(Debug, Serialize)]
pub struct ChapterStatusResponse {
    pub chapter: aicg_models::Chapter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_task: Option<aicg_models::VideoTask>,
    pub jobs: Vec<Job>,
}

/// GET /api/v1/chapters/:id: chapter production state.
pub async fn get_chapter_status(
    State(state): State<AppState>,
    Path(chapter_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let chapter_id = ChapterId::from_string(chapter_id);
    let chapter = ChapterRepo::get(&state.engine.pool, &chapter_id).await?;
    let video_task = VideoTaskRepo::latest_for_chapter(&state.engine.pool, &chapter_id).await?;
    let jobs = JobRepo::list_by_chapter(&state.engine.pool, &chapter_id).await?;
    Ok(Json(ChapterStatusResponse { chapter, video_task, jobs }))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<GenerationHistory>,
    pub has_history: bool,
}

fn parse_resource_type(s: &str) -> ApiResult<ResourceType> {
    ResourceType::from_str(s)
        .ok_or_else(|| ApiError::bad_request(format!("unknown resource type '{s}'")))
}

/// GET /api/v1/history/:resource_type/:resource_id
pub async fn list_history(
    State(state): State<AppState>,
    Path((resource_type, resource_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let resource_type = parse_resource_type(&resource_type)?;
    let entries = HistoryRepo::list(&state.engine.pool, resource_type, &resource_id).await?;
    let has_history = !entries.is_empty();
    Ok(Json(HistoryResponse { entries, has_history }))
}

#[derive(Debug, Deserialize)]
pub struct SelectHistoryRequest {
    pub history_id: String,
}

/// POST /api/v1/history/:resource_type/:resource_id/select
///
/// Repoints the live artifact at a historical result; the previous
/// live entry becomes one more history row.
pub async fn select_history(
    State(state): State<AppState>,
    Path((resource_type, resource_id)): Path<(String, String)>,
    Json(input): Json<SelectHistoryRequest>,
) -> ApiResult<impl IntoResponse> {
    let resource_type = parse_resource_type(&resource_type)?;
    let history_id = HistoryId::from_string(input.history_id);
    let pool = &state.engine.pool;

    let url = match resource_type {
        ResourceType::SceneImage => {
            SceneRepo::select_image_history(pool, &SceneId::from_string(resource_id), &history_id)
                .await?
        }
        ResourceType::ShotKeyframe => {
            ShotRepo::select_keyframe_history(pool, &ShotId::from_string(resource_id), &history_id)
                .await?
        }
        ResourceType::CharacterAvatar => {
            CharacterRepo::select_avatar_history(
                pool,
                &CharacterId::from_string(resource_id),
                &history_id,
            )
            .await?
        }
        ResourceType::TransitionVideo => {
            TransitionRepo::select_video_history(
                pool,
                &TransitionId::from_string(resource_id),
                &history_id,
            )
            .await?
        }
        ResourceType::SentenceImage => {
            SentenceRepo::select_image_history(
                pool,
                &SentenceId::from_string(resource_id),
                &history_id,
            )
            .await?
        }
        ResourceType::SentenceAudio => {
            return Err(ApiError::bad_request(
                "sentence audio history selection is not supported; durations would go stale",
            ))
        }
    };

    Ok(Json(serde_json::json!({ "current_url": url })))
}
