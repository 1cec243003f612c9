//! Speech synthesis handler.

use serde_json::{json, Value};
use tracing::info;

use aicg_db::{ChapterRepo, GenerationMeta, SentenceRepo};
use aicg_models::SentenceId;
use aicg_providers::{ProviderRegistry, TtsRequest};
use aicg_storage::{keys, ArtifactType};

use crate::context::TaskCtx;
use crate::error::EngineResult;

/// Default speech model and voice when the job carries no override.
const DEFAULT_TTS_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";

/// Narrative: synthesize one sentence's narration audio.
///
/// The stored `duration_ms` is always the measured length of the
/// uploaded payload: when the provider reports no timing, the bytes
/// are probed locally before anything is persisted.
pub async fn synthesize_sentence_audio(
    ctx: &TaskCtx,
    sentence_id: &SentenceId,
) -> EngineResult<Option<Value>> {
    let sentence = SentenceRepo::get(&ctx.engine.pool, sentence_id).await?;
    let chapter = ChapterRepo::get(&ctx.engine.pool, &sentence.chapter_id).await?;

    let api_key = ctx.engine.api_key(&ctx.job).await?;
    let model = ProviderRegistry::tts(&api_key)?;

    ctx.ensure_active().await?;
    let request = TtsRequest::new(
        sentence.content.clone(),
        DEFAULT_VOICE,
        ctx.model_or(DEFAULT_TTS_MODEL),
    );
    let output = model.synthesize(request).await?;

    let duration_ms = match output.duration_ms {
        Some(duration) => duration as i64,
        None => measure_duration(&output.audio_bytes, &output.mime).await?,
    };

    ctx.ensure_active().await?;
    let key = keys::object_key(
        chapter.project_id.as_str(),
        ArtifactType::SentenceAudio,
        keys::ext_for_mime(&output.mime),
    );
    ctx.engine
        .storage
        .put(&key, output.audio_bytes, &output.mime)
        .await?;

    ctx.ensure_active().await?;
    let meta = GenerationMeta {
        prompt: Some(sentence.content.clone()),
        model: Some(ctx.model_or(DEFAULT_TTS_MODEL)),
        api_key_id: Some(ctx.job.api_key_id.as_str().to_string()),
    };
    SentenceRepo::record_audio(&ctx.engine.pool, sentence_id, &key, duration_ms, &meta).await?;

    info!(sentence_id = %sentence_id, duration_ms, key, "Sentence audio synthesized");
    Ok(Some(json!({ "audio_url": key, "duration_ms": duration_ms })))
}

/// Measure an audio payload by probing it from a scratch file.
async fn measure_duration(bytes: &[u8], mime: &str) -> EngineResult<i64> {
    let scratch = aicg_media::scratch_dir()?;
    let path = scratch
        .path()
        .join(format!("audio.{}", keys::ext_for_mime(mime)));
    tokio::fs::write(&path, bytes).await.map_err(aicg_media::MediaError::from)?;
    Ok(aicg_media::probe_duration_ms(&path).await?)
}
