//! Image generation handlers.

use base64::Engine as _;
use serde_json::{json, Value};
use tracing::{info, warn};

use aicg_db::{
    CharacterRepo, ChapterRepo, GenerationMeta, ProjectRepo, SceneRepo, ScriptRepo, SentenceRepo,
    ShotRepo,
};
use aicg_models::{Character, CharacterId, SceneId, SentenceId, ShotId};
use aicg_providers::{ImageRequest, ProviderRegistry};
use aicg_storage::{keys, ArtifactType};

use crate::context::TaskCtx;
use crate::error::{EngineError, EngineResult};
use crate::prompts;

/// Default image model alias when the job carries no override.
const DEFAULT_IMAGE_MODEL: &str = "gpt-image-1";

fn meta(ctx: &TaskCtx, prompt: &str) -> GenerationMeta {
    GenerationMeta {
        prompt: Some(prompt.to_string()),
        model: Some(ctx.model_or(DEFAULT_IMAGE_MODEL)),
        api_key_id: Some(ctx.job.api_key_id.as_str().to_string()),
    }
}

async fn generate_and_store(
    ctx: &TaskCtx,
    prompt: &str,
    reference_images: Vec<String>,
    project_id: &str,
    artifact: ArtifactType,
) -> EngineResult<String> {
    let api_key = ctx.engine.api_key(&ctx.job).await?;
    let model = ProviderRegistry::image(&api_key)?;

    ctx.ensure_active().await?;
    let request = ImageRequest::new(prompt, ctx.model_or(DEFAULT_IMAGE_MODEL))
        .with_reference_images(reference_images)
        .with_aspect_ratio("16:9");
    let output = model.generate(request).await?;

    ctx.ensure_active().await?;
    let key = keys::object_key(project_id, artifact, keys::ext_for_mime(&output.mime));
    ctx.engine.storage.put(&key, output.bytes, &output.mime).await?;
    Ok(key)
}

/// Blob content as a data URL for identity-reference inputs.
async fn data_url(ctx: &TaskCtx, key: &str) -> EngineResult<String> {
    ctx.ensure_active().await?;
    let bytes = ctx.engine.storage.get(key).await?;
    let mime = match key.rsplit('.').next() {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    Ok(format!(
        "data:{mime};base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

/// S3: environment-only establishing image for a scene.
pub async fn generate_scene_image(ctx: &TaskCtx, scene_id: &SceneId) -> EngineResult<Option<Value>> {
    let scene = SceneRepo::get(&ctx.engine.pool, scene_id).await?;
    let script = ScriptRepo::get_by_chapter(&ctx.engine.pool, &ctx.job.chapter_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Script", ctx.job.chapter_id.as_str()))?;
    let chapter = ChapterRepo::get(&ctx.engine.pool, &script.chapter_id).await?;

    let prompt = prompts::scene_image(&scene);
    let key = generate_and_store(
        ctx,
        &prompt,
        Vec::new(),
        chapter.project_id.as_str(),
        ArtifactType::SceneImage,
    )
    .await?;

    ctx.ensure_active().await?;
    SceneRepo::record_image(&ctx.engine.pool, scene_id, &key, &meta(ctx, &prompt)).await?;
    info!(scene_id = %scene_id, key, "Scene image generated");
    Ok(Some(json!({ "scene_image_url": key })))
}

/// S4: three-view reference avatar for a character.
pub async fn generate_character_avatar(
    ctx: &TaskCtx,
    character_id: &CharacterId,
) -> EngineResult<Option<Value>> {
    let character = CharacterRepo::get(&ctx.engine.pool, character_id).await?;

    let prompt = prompts::character_avatar(&character);
    let key = generate_and_store(
        ctx,
        &prompt,
        Vec::new(),
        character.project_id.as_str(),
        ArtifactType::Avatar,
    )
    .await?;

    ctx.ensure_active().await?;
    CharacterRepo::record_avatar(&ctx.engine.pool, character_id, &key, &meta(ctx, &prompt))
        .await?;
    info!(character = %character.name, key, "Character avatar generated");
    Ok(Some(json!({ "avatar_url": key })))
}

/// S5: keyframe for a shot, anchored on scene context and the
/// referenced characters' avatars.
pub async fn generate_keyframe(ctx: &TaskCtx, shot_id: &ShotId) -> EngineResult<Option<Value>> {
    let shot = ShotRepo::get(&ctx.engine.pool, shot_id).await?;
    let scene = SceneRepo::get(&ctx.engine.pool, &shot.scene_id).await?;
    let chapter = ChapterRepo::get(&ctx.engine.pool, &ctx.job.chapter_id).await?;
    let project = ProjectRepo::get(&ctx.engine.pool, &chapter.project_id).await?;

    // Exact-name resolution; dangling references fall back to scene
    // context alone.
    let mut characters: Vec<Character> = Vec::new();
    for name in &shot.character_refs {
        match CharacterRepo::find_by_name(&ctx.engine.pool, &project.id, name).await? {
            Some(character) => characters.push(character),
            None => warn!(shot_id = %shot_id, name, "Unknown character reference on shot"),
        }
    }

    let mut references = Vec::new();
    for character in &characters {
        if let Some(avatar_key) = character.avatar_url.as_deref() {
            references.push(data_url(ctx, avatar_key).await?);
        }
    }

    let prompt = prompts::keyframe(&scene, &shot, &characters);
    let result = generate_and_store(
        ctx,
        &prompt,
        references,
        project.id.as_str(),
        ArtifactType::Keyframe,
    )
    .await;

    match result {
        Ok(key) => {
            ctx.ensure_active().await?;
            ShotRepo::record_keyframe(&ctx.engine.pool, shot_id, &key, &meta(ctx, &prompt))
                .await?;
            info!(shot_id = %shot_id, key, "Keyframe generated");
            Ok(Some(json!({ "keyframe_url": key })))
        }
        Err(e) => {
            // Surface the failure on the shot row; a later success
            // clears it.
            ShotRepo::set_error(&ctx.engine.pool, shot_id, &e.to_string()).await?;
            Err(e)
        }
    }
}

/// Narrative: illustration for one sentence.
pub async fn generate_sentence_image(
    ctx: &TaskCtx,
    sentence_id: &SentenceId,
) -> EngineResult<Option<Value>> {
    let sentence = SentenceRepo::get(&ctx.engine.pool, sentence_id).await?;
    let asset = SentenceRepo::get_asset(&ctx.engine.pool, sentence_id).await?;
    let chapter = ChapterRepo::get(&ctx.engine.pool, &sentence.chapter_id).await?;

    let prompt = asset
        .image_prompt
        .clone()
        .unwrap_or_else(|| sentence.content.clone());
    let key = generate_and_store(
        ctx,
        &prompt,
        Vec::new(),
        chapter.project_id.as_str(),
        ArtifactType::SentenceImage,
    )
    .await?;

    ctx.ensure_active().await?;
    SentenceRepo::record_image(&ctx.engine.pool, sentence_id, &key, &meta(ctx, &prompt)).await?;
    Ok(Some(json!({ "image_url": key })))
}
