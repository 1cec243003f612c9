//! Task handlers, one per payload variant.

pub mod assembly;
pub mod extract;
pub mod imagegen;
pub mod transition;
pub mod tts;

use serde_json::Value;

use aicg_models::TaskPayload;

use crate::context::TaskCtx;
use crate::error::EngineResult;

/// Dispatch a task to its handler.
///
/// Handlers return an optional JSON result stored on the task row;
/// they check `ctx.ensure_active()` before every suspension point.
pub async fn dispatch(ctx: &TaskCtx) -> EngineResult<Option<Value>> {
    match &ctx.task.payload {
        TaskPayload::ExtractCharacters { chapter_id } => {
            extract::extract_characters(ctx, chapter_id).await
        }
        TaskPayload::ExtractScenes { chapter_id } => extract::extract_scenes(ctx, chapter_id).await,
        TaskPayload::ExtractShots { scene_id } => extract::extract_shots(ctx, scene_id).await,
        TaskPayload::GenerateSceneImage { scene_id } => {
            imagegen::generate_scene_image(ctx, scene_id).await
        }
        TaskPayload::GenerateCharacterAvatar { character_id } => {
            imagegen::generate_character_avatar(ctx, character_id).await
        }
        TaskPayload::GenerateKeyframe { shot_id } => imagegen::generate_keyframe(ctx, shot_id).await,
        TaskPayload::CreateTransition { from_shot_id, to_shot_id, order_index } => {
            transition::create_transition(ctx, from_shot_id, to_shot_id, *order_index).await
        }
        TaskPayload::SubmitTransitionVideo { transition_id } => {
            transition::submit_transition_video(ctx, transition_id).await
        }
        TaskPayload::PollTransitionVideo { transition_id } => {
            transition::poll_transition_video(ctx, transition_id).await
        }
        TaskPayload::GenerateSentencePrompts { sentence_id } => {
            extract::generate_sentence_prompts(ctx, sentence_id).await
        }
        TaskPayload::GenerateSentenceImage { sentence_id } => {
            imagegen::generate_sentence_image(ctx, sentence_id).await
        }
        TaskPayload::SynthesizeSentenceAudio { sentence_id } => {
            tts::synthesize_sentence_audio(ctx, sentence_id).await
        }
        TaskPayload::ComposeVideo { video_task_id } => {
            assembly::compose_video(ctx, video_task_id).await
        }
    }
}
