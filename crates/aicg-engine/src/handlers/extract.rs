//! Text-model extraction handlers.

use serde_json::{json, Value};
use tracing::{info, warn};

use aicg_db::{
    CharacterRepo, ChapterRepo, ProjectRepo, SceneRepo, ScriptRepo, SentenceRepo, ShotRepo,
};
use aicg_models::{
    Chapter, ChapterId, Character, CharacterId, Scene, SceneId, Script, ScriptStatus, SentenceId,
    Shot, ShotId,
};
use aicg_providers::{ProviderRegistry, TextRequest};
use chrono::Utc;

use crate::context::TaskCtx;
use crate::error::{EngineError, EngineResult};
use crate::extract::{
    parse_extraction, CharacterExtraction, SceneExtraction, SentencePromptSpec, ShotExtraction,
};
use crate::prompts;

/// Default text model alias when the job carries no override.
const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";

async fn complete_json(ctx: &TaskCtx, system: &str, prompt: String) -> EngineResult<String> {
    let api_key = ctx.engine.api_key(&ctx.job).await?;
    let model = ProviderRegistry::text(&api_key)?;

    ctx.ensure_active().await?;
    let request = TextRequest::new(prompt, ctx.model_or(DEFAULT_TEXT_MODEL))
        .with_system(system)
        .with_json_mode(true)
        .with_temperature(0.7);
    let completion = model.complete(request).await?;
    Ok(completion.text)
}

/// Serialized character name list injected into extraction prompts.
async fn characters_json(ctx: &TaskCtx, chapter: &Chapter) -> EngineResult<String> {
    let characters =
        CharacterRepo::list_by_project(&ctx.engine.pool, &chapter.project_id).await?;
    let names: Vec<&str> = characters.iter().map(|c| c.name.as_str()).collect();
    Ok(serde_json::to_string(&names)?)
}

/// S0: extract the chapter's recurring characters.
pub async fn extract_characters(ctx: &TaskCtx, chapter_id: &ChapterId) -> EngineResult<Option<Value>> {
    let chapter = ChapterRepo::get(&ctx.engine.pool, chapter_id).await?;
    let project = ProjectRepo::get(&ctx.engine.pool, &chapter.project_id).await?;

    let text = complete_json(
        ctx,
        prompts::EXTRACTION_SYSTEM,
        prompts::character_extraction(&chapter.content),
    )
    .await?;
    let parsed: CharacterExtraction = parse_extraction(&text)?;

    ctx.ensure_active().await?;
    let mut created = 0u32;
    let mut existing = 0u32;
    for spec in parsed.characters {
        let character = Character {
            id: CharacterId::new(),
            project_id: project.id.clone(),
            name: spec.name,
            role_description: spec.role_description,
            visual_traits: spec.visual_traits,
            key_visual_traits: spec.key_visual_traits,
            avatar_url: None,
            generated_prompt: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        match CharacterRepo::create(&ctx.engine.pool, &character).await {
            Ok(()) => created += 1,
            // Name already present in the project; keep the prior one.
            Err(aicg_db::DbError::Conflict(_)) => existing += 1,
            Err(e) => return Err(e.into()),
        }
    }

    info!(chapter_id = %chapter_id, created, existing, "Characters extracted");
    Ok(Some(json!({ "created": created, "existing": existing })))
}

/// S1: split the chapter into scenes.
pub async fn extract_scenes(ctx: &TaskCtx, chapter_id: &ChapterId) -> EngineResult<Option<Value>> {
    let chapter = ChapterRepo::get(&ctx.engine.pool, chapter_id).await?;

    let script = match ScriptRepo::get_by_chapter(&ctx.engine.pool, chapter_id).await? {
        Some(script) => script,
        None => {
            let script = Script {
                id: aicg_models::ScriptId::new(),
                chapter_id: chapter_id.clone(),
                status: ScriptStatus::Pending,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            ScriptRepo::create(&ctx.engine.pool, &script).await?;
            script
        }
    };

    if !SceneRepo::list_by_script(&ctx.engine.pool, &script.id).await?.is_empty() {
        info!(chapter_id = %chapter_id, "Scenes already extracted, skipping");
        return Ok(None);
    }

    ScriptRepo::set_status(&ctx.engine.pool, &script.id, ScriptStatus::Generating).await?;

    let characters = characters_json(ctx, &chapter).await?;
    let text = complete_json(
        ctx,
        prompts::EXTRACTION_SYSTEM,
        prompts::scene_extraction(&characters, &chapter.content),
    )
    .await?;

    let parsed: SceneExtraction = match parse_extraction(&text) {
        Ok(parsed) => parsed,
        Err(e) => {
            ScriptRepo::set_status(&ctx.engine.pool, &script.id, ScriptStatus::Failed).await?;
            return Err(e);
        }
    };

    ctx.ensure_active().await?;
    let scenes: Vec<Scene> = parsed
        .scenes
        .into_iter()
        .map(|spec| Scene {
            id: SceneId::new(),
            script_id: script.id.clone(),
            order_index: spec.order_index,
            location: spec.location,
            time_of_day: spec.time_of_day,
            atmosphere: spec.atmosphere,
            description: Some(spec.description),
            scene_image_url: None,
            scene_image_prompt: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .collect();

    if scenes.is_empty() {
        ScriptRepo::set_status(&ctx.engine.pool, &script.id, ScriptStatus::Failed).await?;
        return Err(EngineError::Provider(aicg_providers::ProviderError::Malformed(
            "extraction produced zero scenes".into(),
        )));
    }

    SceneRepo::create_many(&ctx.engine.pool, &scenes).await?;
    ScriptRepo::set_status(&ctx.engine.pool, &script.id, ScriptStatus::Completed).await?;

    Ok(Some(json!({ "scenes": scenes.len() })))
}

/// S2: split one scene into shots.
pub async fn extract_shots(ctx: &TaskCtx, scene_id: &SceneId) -> EngineResult<Option<Value>> {
    let scene = SceneRepo::get(&ctx.engine.pool, scene_id).await?;
    if !ShotRepo::list_by_scene(&ctx.engine.pool, scene_id).await?.is_empty() {
        info!(scene_id = %scene_id, "Shots already extracted, skipping");
        return Ok(None);
    }

    let script = ScriptRepo::get_by_chapter(
        &ctx.engine.pool,
        &ctx.job.chapter_id,
    )
    .await?
    .ok_or_else(|| EngineError::not_found("Script", ctx.job.chapter_id.as_str()))?;
    let chapter = ChapterRepo::get(&ctx.engine.pool, &script.chapter_id).await?;
    let characters = characters_json(ctx, &chapter).await?;

    let description = scene.description.clone().unwrap_or_default();
    let text = complete_json(
        ctx,
        prompts::EXTRACTION_SYSTEM,
        prompts::shot_extraction(&characters, &description),
    )
    .await?;
    let parsed: ShotExtraction = parse_extraction(&text)?;

    ctx.ensure_active().await?;
    let project = ProjectRepo::get(&ctx.engine.pool, &chapter.project_id).await?;
    let mut shots = Vec::with_capacity(parsed.shots.len());
    for spec in parsed.shots {
        for name in &spec.characters {
            if CharacterRepo::find_by_name(&ctx.engine.pool, &project.id, name)
                .await?
                .is_none()
            {
                warn!(scene_id = %scene_id, name, "Extracted shot references unknown character");
            }
        }
        shots.push(Shot {
            id: ShotId::new(),
            scene_id: scene_id.clone(),
            order_index: spec.order_index,
            visual_description: spec.shot,
            camera_movement: spec.camera_movement,
            dialogue: (!spec.dialogue.is_empty()).then_some(spec.dialogue),
            character_refs: spec.characters,
            keyframe_url: None,
            keyframe_prompt: None,
            error_message: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
    }

    if shots.is_empty() {
        return Err(EngineError::Provider(aicg_providers::ProviderError::Malformed(
            "extraction produced zero shots".into(),
        )));
    }

    ShotRepo::create_many(&ctx.engine.pool, &shots).await?;
    Ok(Some(json!({ "shots": shots.len() })))
}

/// Narrative: produce the image prompt and subtitle for one sentence.
pub async fn generate_sentence_prompts(
    ctx: &TaskCtx,
    sentence_id: &SentenceId,
) -> EngineResult<Option<Value>> {
    let sentence = SentenceRepo::get(&ctx.engine.pool, sentence_id).await?;
    let asset = SentenceRepo::get_asset(&ctx.engine.pool, sentence_id).await?;
    if asset.image_prompt.is_some() && asset.subtitle_text.is_some() {
        return Ok(None);
    }

    let text = complete_json(
        ctx,
        prompts::EXTRACTION_SYSTEM,
        prompts::sentence_prompts(&sentence.content),
    )
    .await?;
    let parsed: SentencePromptSpec = parse_extraction(&text)?;

    ctx.ensure_active().await?;
    SentenceRepo::set_prompts(
        &ctx.engine.pool,
        sentence_id,
        &parsed.image_prompt,
        &parsed.subtitle_text,
    )
    .await?;
    Ok(None)
}
