//! The video assembly engine.
//!
//! Terminal stage of both pipelines: fetch the ordered per-chapter
//! media, build the final video with FFmpeg, mix background music,
//! upload, and record the result. Scratch files live in an
//! `aicg-*` temp directory that is removed on every exit path.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use aicg_db::{ChapterRepo, ProjectRepo, SentenceRepo, TaskRepo, TransitionRepo, VideoTaskRepo};
use aicg_media::{
    concat_clips, concat_clips_with_trim, detect_majority_fps, mix_bgm, probe_media,
    render_sentence_clip, scale_to_target, FfmpegRunner, SentenceClipSpec,
};
use aicg_models::{
    Chapter, ErrorKind, Project, ProjectKind, SentenceAsset, VideoTask, VideoTaskId,
    VideoTaskStatus,
};
use aicg_storage::{keys, ArtifactType};

use crate::context::TaskCtx;
use crate::error::{EngineError, EngineResult};

/// Parallel download bound inside one assembly.
const DOWNLOAD_PARALLELISM: usize = 5;

/// Per-FFmpeg-invocation timeout.
const FFMPEG_STEP_TIMEOUT_SECS: u64 = 1200;

/// S8: assemble the chapter's final video.
pub async fn compose_video(
    ctx: &TaskCtx,
    video_task_id: &VideoTaskId,
) -> EngineResult<Option<Value>> {
    let result = run_assembly(ctx, video_task_id).await;

    if let Err(e) = &result {
        let kind = e.kind();
        if kind != ErrorKind::Cancelled {
            VideoTaskRepo::mark_failed(&ctx.engine.pool, video_task_id, kind, &failure_message(e))
                .await
                .ok();
        }
    }

    result
}

/// Failure text for the video task row; FFmpeg failures carry their
/// captured stderr (already truncated at 4 KiB by the media layer).
fn failure_message(e: &EngineError) -> String {
    if let EngineError::Media(media_err) = e {
        if let Some(stderr) = media_err.stderr() {
            return format!("{e}\n{stderr}");
        }
    }
    e.to_string()
}

async fn run_assembly(ctx: &TaskCtx, video_task_id: &VideoTaskId) -> EngineResult<Option<Value>> {
    let task = VideoTaskRepo::get(&ctx.engine.pool, video_task_id).await?;
    let chapter = ChapterRepo::get(&ctx.engine.pool, &task.chapter_id).await?;
    let project = ProjectRepo::get(&ctx.engine.pool, &chapter.project_id).await?;

    task.settings
        .validate()
        .map_err(EngineError::validation)?;

    // Kill any running FFmpeg the moment cancellation lands.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let poller = spawn_cancel_poller(ctx, cancel_tx);

    let runner = FfmpegRunner::new()
        .with_cancel(cancel_rx)
        .with_timeout(FFMPEG_STEP_TIMEOUT_SECS);

    let result = match project.kind {
        ProjectKind::Movie => assemble_movie(ctx, &task, &chapter, &project, &runner).await,
        ProjectKind::Narrative => assemble_narrative(ctx, &task, &chapter, &project, &runner).await,
    };

    poller.abort();
    result
}

fn spawn_cancel_poller(ctx: &TaskCtx, tx: watch::Sender<bool>) -> tokio::task::JoinHandle<()> {
    let pool = ctx.engine.pool.clone();
    let task_id = ctx.task.id.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(2));
        loop {
            interval.tick().await;
            match TaskRepo::is_cancel_requested(&pool, &task_id).await {
                Ok(true) => {
                    let _ = tx.send(true);
                    break;
                }
                Ok(false) => {}
                Err(e) => warn!("Cancel poll failed: {}", e),
            }
        }
    })
}

/// Movie pipeline: ordered transition clips, overlap-trimmed.
async fn assemble_movie(
    ctx: &TaskCtx,
    task: &VideoTask,
    chapter: &Chapter,
    project: &Project,
    runner: &FfmpegRunner,
) -> EngineResult<Option<Value>> {
    let pool = &ctx.engine.pool;
    VideoTaskRepo::set_status(pool, &task.id, VideoTaskStatus::Validating).await?;

    let shots = aicg_db::ShotRepo::list_by_chapter(pool, &chapter.id).await?;
    if shots.len() < 2 {
        return Err(EngineError::incomplete_materials(vec![
            "at_least_2_shots".to_string(),
        ]));
    }

    let transitions = TransitionRepo::list_by_chapter(pool, &chapter.id).await?;

    // Enumerate every gap so the caller can drive remediation.
    let mut missing = Vec::new();
    for shot in &shots {
        if shot.keyframe_url.is_none() {
            missing.push(format!("shot_{}.keyframe", shot.order_index));
        }
    }
    if transitions.is_empty() {
        missing.push("transitions".to_string());
    }
    for transition in &transitions {
        if transition.video_url.is_none() {
            missing.push(format!("transition_{}.video", transition.order_index));
        }
    }
    if !missing.is_empty() {
        return Err(EngineError::incomplete_materials(missing));
    }

    let total = transitions.len() as i32;
    VideoTaskRepo::set_progress(pool, &task.id, 10, 0, total).await?;

    let scratch = aicg_media::scratch_dir()?;
    info!(chapter_id = %chapter.id, clips = total, "Assembling movie video");

    // Download fan-in, bounded.
    ctx.ensure_active().await?;
    VideoTaskRepo::set_status(pool, &task.id, VideoTaskStatus::Downloading).await?;

    let clip_keys: Vec<String> = transitions
        .iter()
        .map(|t| t.video_url.clone().expect("validated above"))
        .collect();
    let clips = download_batch(ctx, &clip_keys, scratch.path().into(), "transition", "mp4", |done| {
        let pool = pool.clone();
        let task_id = task.id.clone();
        async move {
            let progress = 10 + (done as i16 * 40 / total.max(1) as i16);
            VideoTaskRepo::set_progress(&pool, &task_id, progress, done as i32, total)
                .await
                .ok();
        }
    })
    .await?;

    // Authoritative fps: majority vote, else the target (re-encoded).
    ctx.ensure_active().await?;
    let mut fps_values = Vec::with_capacity(clips.len());
    let mut audio_flags = Vec::with_capacity(clips.len());
    for clip in &clips {
        let info = probe_media(clip).await?;
        fps_values.push(info.fps);
        audio_flags.push(info.has_audio);
    }
    let fps = detect_majority_fps(&fps_values).unwrap_or(task.settings.fps as f64);
    let with_audio = audio_flags.iter().all(|&a| a);
    if !with_audio {
        warn!(chapter_id = %chapter.id, "Some clips carry no audio; assembling video-only");
    }

    ctx.ensure_active().await?;
    VideoTaskRepo::set_status(pool, &task.id, VideoTaskStatus::Concatenating).await?;
    VideoTaskRepo::set_progress(pool, &task.id, 60, total, total).await?;

    let concatenated = scratch.path().join("movie_final.mp4");
    if clips.len() == 1 {
        // A two-shot chapter has a single transition; nothing to trim.
        tokio::fs::copy(&clips[0], &concatenated)
            .await
            .map_err(aicg_media::MediaError::from)?;
    } else {
        concat_clips_with_trim(runner, &clips, fps, with_audio, &concatenated).await?;
    }

    let final_path =
        apply_bgm(ctx, task, runner, scratch.path().into(), concatenated, with_audio).await?;

    upload_final(ctx, task, chapter, project, &final_path, total).await
}

/// Narrative pipeline: Ken Burns sentence clips in narration order.
async fn assemble_narrative(
    ctx: &TaskCtx,
    task: &VideoTask,
    chapter: &Chapter,
    project: &Project,
    runner: &FfmpegRunner,
) -> EngineResult<Option<Value>> {
    let pool = &ctx.engine.pool;
    VideoTaskRepo::set_status(pool, &task.id, VideoTaskStatus::Validating).await?;

    let sentences = SentenceRepo::list_assets(pool, &chapter.id).await?;
    if sentences.is_empty() {
        return Err(EngineError::incomplete_materials(vec!["sentences".to_string()]));
    }

    let mut missing = Vec::new();
    for (index, (_, asset)) in sentences.iter().enumerate() {
        if asset.image_url.is_none() {
            missing.push(format!("sentence_{index}.image"));
        }
        if asset.audio_url.is_none() {
            missing.push(format!("sentence_{index}.audio"));
        }
        if asset.duration_ms.is_none() {
            missing.push(format!("sentence_{index}.duration"));
        }
    }
    if !missing.is_empty() {
        return Err(EngineError::incomplete_materials(missing));
    }

    let total = sentences.len() as i32;
    let (width, height) = task
        .settings
        .dimensions()
        .ok_or_else(|| EngineError::validation("unparseable resolution"))?;

    VideoTaskRepo::set_progress(pool, &task.id, 5, 0, total).await?;
    let scratch = aicg_media::scratch_dir()?;
    info!(chapter_id = %chapter.id, sentences = total, "Assembling narrative video");

    // Download images and audio, bounded.
    ctx.ensure_active().await?;
    VideoTaskRepo::set_status(pool, &task.id, VideoTaskStatus::Downloading).await?;

    let image_keys: Vec<String> =
        sentences.iter().map(|(_, a)| a.image_url.clone().expect("validated above")).collect();
    let audio_keys: Vec<String> =
        sentences.iter().map(|(_, a)| a.audio_url.clone().expect("validated above")).collect();

    let images =
        download_batch(ctx, &image_keys, scratch.path().into(), "image", "png", |_| async {})
            .await?;
    let audios =
        download_batch(ctx, &audio_keys, scratch.path().into(), "audio", "mp3", |_| async {})
            .await?;
    VideoTaskRepo::set_progress(pool, &task.id, 30, 0, total).await?;

    // Render one clip per sentence; duration equals the measured audio
    // length.
    VideoTaskRepo::set_status(pool, &task.id, VideoTaskStatus::Synthesizing).await?;
    let mut clips = Vec::with_capacity(sentences.len());
    for (index, (_, asset)) in sentences.iter().enumerate() {
        ctx.ensure_active().await?;
        let clip = scratch.path().join(format!("sentence_{index:03}.mp4"));
        let spec = sentence_spec(asset, &images[index], &audios[index], width, height, task);
        render_sentence_clip(runner, &spec, &clip).await?;
        clips.push(clip);

        let progress = 30 + ((index as i16 + 1) * 30 / total.max(1) as i16);
        VideoTaskRepo::set_progress(pool, &task.id, progress, index as i32 + 1, total).await?;
    }

    ctx.ensure_active().await?;
    VideoTaskRepo::set_status(pool, &task.id, VideoTaskStatus::Concatenating).await?;

    let concatenated = scratch.path().join("narrative_concat.mp4");
    if clips.len() == 1 {
        tokio::fs::copy(&clips[0], &concatenated)
            .await
            .map_err(aicg_media::MediaError::from)?;
    } else {
        concat_clips(runner, &clips, true, &concatenated).await?;
    }

    // Target resolution and fps are enforced in one final pass.
    ctx.ensure_active().await?;
    let enforced = scratch.path().join("narrative_final.mp4");
    scale_to_target(runner, &concatenated, width, height, task.settings.fps, &enforced).await?;

    let final_path =
        apply_bgm(ctx, task, runner, scratch.path().into(), enforced, true).await?;

    upload_final(ctx, task, chapter, project, &final_path, total).await
}

fn sentence_spec(
    asset: &SentenceAsset,
    image: &PathBuf,
    audio: &PathBuf,
    width: u32,
    height: u32,
    task: &VideoTask,
) -> SentenceClipSpec {
    SentenceClipSpec {
        image: image.clone(),
        audio: audio.clone(),
        duration_ms: asset.duration_ms.expect("validated above"),
        subtitle: asset.subtitle_text.clone(),
        width,
        height,
        fps: task.settings.fps,
        zoom_speed: task.settings.zoom_speed,
    }
}

/// Download blob keys into scratch files, at most
/// [`DOWNLOAD_PARALLELISM`] in flight, preserving order.
async fn download_batch<F, Fut>(
    ctx: &TaskCtx,
    blob_keys: &[String],
    dir: PathBuf,
    prefix: &str,
    ext: &str,
    on_progress: F,
) -> EngineResult<Vec<PathBuf>>
where
    F: Fn(usize) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    ctx.ensure_active().await?;

    let semaphore = Arc::new(Semaphore::new(DOWNLOAD_PARALLELISM));
    let mut join_set = JoinSet::new();

    for (index, key) in blob_keys.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let storage = Arc::clone(&ctx.engine.storage);
        let key = key.clone();
        let path = dir.join(format!("{prefix}_{index:03}.{ext}"));

        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let bytes = storage.get(&key).await?;
            tokio::fs::write(&path, bytes)
                .await
                .map_err(aicg_media::MediaError::from)?;
            Ok::<(usize, PathBuf), EngineError>((index, path))
        });
    }

    let mut paths: Vec<Option<PathBuf>> = vec![None; blob_keys.len()];
    let mut done = 0usize;
    while let Some(joined) = join_set.join_next().await {
        let (index, path) = joined.map_err(|e| EngineError::download(e.to_string()))??;
        paths[index] = Some(path);
        done += 1;
        on_progress(done).await;
    }

    Ok(paths.into_iter().map(|p| p.expect("all downloads joined")).collect())
}

/// Mix background music when configured; a zero volume skips the pass
/// so the primary track stays untouched.
async fn apply_bgm(
    ctx: &TaskCtx,
    task: &VideoTask,
    runner: &FfmpegRunner,
    dir: PathBuf,
    video: PathBuf,
    with_audio: bool,
) -> EngineResult<PathBuf> {
    let Some(bgm_key) = task.settings.bgm_ref.as_deref() else {
        return Ok(video);
    };
    if task.settings.bgm_volume <= 0.0 {
        info!("BGM volume is 0, skipping mix");
        return Ok(video);
    }
    if !with_audio {
        warn!("Video has no primary audio track, skipping BGM mix");
        return Ok(video);
    }

    ctx.ensure_active().await?;
    let bgm_bytes = ctx.engine.storage.get(bgm_key).await?;
    let ext = bgm_key.rsplit('.').next().unwrap_or("mp3");
    let bgm_path = dir.join(format!("bgm.{ext}"));
    tokio::fs::write(&bgm_path, bgm_bytes)
        .await
        .map_err(aicg_media::MediaError::from)?;

    ctx.ensure_active().await?;
    let mixed = dir.join("final_with_bgm.mp4");
    mix_bgm(runner, &video, &bgm_path, task.settings.bgm_volume, &mixed).await?;
    info!(volume = task.settings.bgm_volume, "BGM mixed");
    Ok(mixed)
}

/// Upload the finished blob and record completion.
async fn upload_final(
    ctx: &TaskCtx,
    task: &VideoTask,
    chapter: &Chapter,
    project: &Project,
    path: &PathBuf,
    total: i32,
) -> EngineResult<Option<Value>> {
    let pool = &ctx.engine.pool;

    ctx.ensure_active().await?;
    VideoTaskRepo::set_status(pool, &task.id, VideoTaskStatus::Uploading).await?;
    VideoTaskRepo::set_progress(pool, &task.id, 85, total, total).await?;

    let duration_secs = probe_media(path).await?.duration.round() as i32;
    let bytes = tokio::fs::read(path).await.map_err(aicg_media::MediaError::from)?;
    let key = keys::object_key(project.id.as_str(), ArtifactType::FinalVideo, "mp4");

    ctx.ensure_active().await?;
    ctx.engine.storage.put(&key, bytes, "video/mp4").await?;

    VideoTaskRepo::mark_completed(pool, &task.id, &key, duration_secs).await?;
    ChapterRepo::set_video(pool, &chapter.id, &key, duration_secs).await?;

    info!(
        chapter_id = %chapter.id,
        video_url = key,
        duration_secs,
        "Chapter video assembled"
    );
    Ok(Some(json!({ "video_url": key, "duration_secs": duration_secs })))
}
