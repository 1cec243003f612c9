//! Transition prompt and video-submission handlers.

use base64::Engine as _;
use serde_json::{json, Value};
use tracing::info;

use aicg_db::{ShotRepo, TransitionRepo};
use aicg_models::{ShotId, Transition, TransitionId, TransitionStatus};
use aicg_providers::{ProviderRegistry, TextRequest, VideoSubmitRequest};
use chrono::Utc;

use crate::context::TaskCtx;
use crate::error::{EngineError, EngineResult};
use crate::prompts;

/// Default aliases when the job carries no override.
const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_VIDEO_MODEL: &str = "veo_3_1-fast";

/// S6: create the transition record for a consecutive shot pair and
/// write its LLM-generated video prompt.
pub async fn create_transition(
    ctx: &TaskCtx,
    from_shot_id: &ShotId,
    to_shot_id: &ShotId,
    order_index: i32,
) -> EngineResult<Option<Value>> {
    if let Some(existing) =
        TransitionRepo::find_by_pair(&ctx.engine.pool, from_shot_id, to_shot_id).await?
    {
        if existing.video_prompt.is_some() {
            info!(transition_id = %existing.id, "Transition already prompted, skipping");
            return Ok(None);
        }
    }

    let from_shot = ShotRepo::get(&ctx.engine.pool, from_shot_id).await?;
    let to_shot = ShotRepo::get(&ctx.engine.pool, to_shot_id).await?;

    let api_key = ctx.engine.api_key(&ctx.job).await?;
    let model = ProviderRegistry::text(&api_key)?;

    ctx.ensure_active().await?;
    let request = TextRequest::new(
        prompts::transition_video(&from_shot, &to_shot),
        ctx.model_or(DEFAULT_TEXT_MODEL),
    )
    .with_system(prompts::TRANSITION_SYSTEM);
    let completion = model.complete(request).await?;
    let video_prompt = completion.text.trim().to_string();

    ctx.ensure_active().await?;
    match TransitionRepo::find_by_pair(&ctx.engine.pool, from_shot_id, to_shot_id).await? {
        Some(existing) => {
            TransitionRepo::set_prompt(&ctx.engine.pool, &existing.id, &video_prompt).await?;
            Ok(Some(json!({ "transition_id": existing.id })))
        }
        None => {
            let script_id = {
                let scene =
                    aicg_db::SceneRepo::get(&ctx.engine.pool, &from_shot.scene_id).await?;
                scene.script_id
            };
            let transition = Transition {
                id: TransitionId::new(),
                script_id,
                from_shot_id: from_shot_id.clone(),
                to_shot_id: to_shot_id.clone(),
                order_index,
                video_prompt: Some(video_prompt),
                video_url: None,
                status: TransitionStatus::Pending,
                external_task_id: None,
                api_key_id: None,
                error_message: None,
                next_poll_at: None,
                poll_count: 0,
                version: 0,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            TransitionRepo::create(&ctx.engine.pool, &transition).await?;
            info!(transition_id = %transition.id, order_index, "Transition created");
            Ok(Some(json!({ "transition_id": transition.id })))
        }
    }
}

/// S7 submit: hand the transition to the video provider and release
/// the worker. The polling sweeper owns completion.
pub async fn submit_transition_video(
    ctx: &TaskCtx,
    transition_id: &TransitionId,
) -> EngineResult<Option<Value>> {
    let transition = TransitionRepo::get(&ctx.engine.pool, transition_id).await?;

    match transition.status {
        TransitionStatus::Completed => return Ok(None),
        TransitionStatus::Processing if transition.external_task_id.is_some() => {
            info!(transition_id = %transition_id, "Transition already submitted, skipping");
            return Ok(None);
        }
        _ => {}
    }

    let prompt = transition
        .video_prompt
        .clone()
        .ok_or_else(|| EngineError::validation("transition has no video prompt"))?;

    let from_shot = ShotRepo::get(&ctx.engine.pool, &transition.from_shot_id).await?;
    let to_shot = ShotRepo::get(&ctx.engine.pool, &transition.to_shot_id).await?;

    let first_frame = match from_shot.keyframe_url.as_deref() {
        Some(key) => Some(keyframe_data_url(ctx, key).await?),
        None => {
            return Err(EngineError::incomplete_materials(vec![format!(
                "shot_{}.keyframe",
                from_shot.order_index
            )]))
        }
    };
    let last_frame = match to_shot.keyframe_url.as_deref() {
        Some(key) => Some(keyframe_data_url(ctx, key).await?),
        None => {
            return Err(EngineError::incomplete_materials(vec![format!(
                "shot_{}.keyframe",
                to_shot.order_index
            )]))
        }
    };

    let api_key = ctx.engine.api_key(&ctx.job).await?;
    let model = ProviderRegistry::video(&api_key)?;

    ctx.ensure_active().await?;
    let request = VideoSubmitRequest::new(prompt, ctx.model_or(DEFAULT_VIDEO_MODEL))
        .with_frames(first_frame, last_frame);
    let external_task_id = model.submit(request).await?;

    // Persist the id and flip to processing in one statement: a crash
    // here leaves either a pending row (resubmitted) or a processing
    // row the sweeper can pick up, never a processing row without an
    // id.
    TransitionRepo::mark_submitted(&ctx.engine.pool, transition_id, &external_task_id, &api_key.id)
        .await?;

    info!(transition_id = %transition_id, external_task_id, "Transition video submitted");
    Ok(Some(json!({ "external_task_id": external_task_id })))
}

/// S7 poll: bookkeeping handler.
///
/// Poll tasks are normally settled by the sweeper without ever being
/// enqueued; this handler only resolves deliveries that raced a
/// completed transition.
pub async fn poll_transition_video(
    ctx: &TaskCtx,
    transition_id: &TransitionId,
) -> EngineResult<Option<Value>> {
    let transition = TransitionRepo::get(&ctx.engine.pool, transition_id).await?;
    match transition.status {
        TransitionStatus::Completed => Ok(Some(json!({ "video_url": transition.video_url }))),
        TransitionStatus::Failed => Err(EngineError::Provider(
            aicg_providers::ProviderError::Api {
                status: 502,
                message: transition
                    .error_message
                    .unwrap_or_else(|| "transition video generation failed".into()),
            },
        )),
        _ => Err(EngineError::validation(
            "transition still generating; completion is sweeper-driven",
        )),
    }
}

async fn keyframe_data_url(ctx: &TaskCtx, key: &str) -> EngineResult<String> {
    ctx.ensure_active().await?;
    let bytes = ctx.engine.storage.get(key).await?;
    let mime = if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else {
        "image/jpeg"
    };
    Ok(format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}
