//! Assembly filter graphs.
//!
//! Three building blocks used by the video assembly engine:
//! - [`concat_clips_with_trim`]: frame-accurate concatenation of
//!   transition clips with the shared-keyframe overlap removed
//! - [`render_sentence_clip`]: a Ken Burns clip for one sentence with
//!   its audio and burned-in subtitle
//! - [`mix_bgm`]: background music mixing with dialogue ducking

use std::path::{Path, PathBuf};

use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Output quality for re-encoded concatenations.
const CONCAT_CRF: u8 = 18;

/// Leading frames to drop from every clip after the first.
///
/// Each transition is generated with the previous transition's last
/// keyframe as its first frame; naive concatenation would show that
/// frame twice across the cut. 1.5 seconds worth of frames covers the
/// dwell the generators put on the anchor frame.
pub fn trim_frames_for_fps(fps: f64) -> u32 {
    (1.5 * fps).round() as u32
}

/// Build the trim+concat filter graph for `n` clips.
///
/// Every clip after the first loses its leading `trim_frames` frames;
/// audio is trimmed by the equivalent time so A/V sync is preserved.
fn concat_filter(n: usize, trim_frames: u32, fps: f64, with_audio: bool) -> String {
    let mut parts = Vec::with_capacity(n + 1);
    let trim_secs = trim_frames as f64 / fps;

    for i in 0..n {
        if i == 0 {
            parts.push(format!("[{i}:v]setpts=PTS-STARTPTS[v{i}]"));
            if with_audio {
                parts.push(format!("[{i}:a]asetpts=PTS-STARTPTS[a{i}]"));
            }
        } else {
            parts.push(format!(
                "[{i}:v]trim=start_frame={trim_frames},setpts=PTS-STARTPTS[v{i}]"
            ));
            if with_audio {
                parts.push(format!(
                    "[{i}:a]atrim=start={trim_secs:.6},asetpts=PTS-STARTPTS[a{i}]"
                ));
            }
        }
    }

    let mut concat_inputs = String::new();
    for i in 0..n {
        concat_inputs.push_str(&format!("[v{i}]"));
        if with_audio {
            concat_inputs.push_str(&format!("[a{i}]"));
        }
    }
    let a = if with_audio { 1 } else { 0 };
    parts.push(format!("{concat_inputs}concat=n={n}:v=1:a={a}[vout]{}",
        if with_audio { "[aout]" } else { "" }));

    parts.join(";")
}

/// Concatenate ordered clips, dropping the duplicated keyframe overlap.
///
/// `fps` is the authoritative clip frame rate (majority vote of the
/// probes); when the set disagreed, pass the target fps and the graph
/// re-times every input to it.
pub async fn concat_clips_with_trim(
    runner: &FfmpegRunner,
    clips: &[PathBuf],
    fps: f64,
    with_audio: bool,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    if clips.len() < 2 {
        return Err(MediaError::InvalidMedia(
            "concatenation requires at least 2 clips".to_string(),
        ));
    }
    if fps <= 0.0 {
        return Err(MediaError::InvalidMedia(format!("invalid fps {fps}")));
    }

    let trim_frames = trim_frames_for_fps(fps);
    info!(
        clips = clips.len(),
        trim_frames, fps, "Concatenating clips with overlap trim"
    );

    let mut cmd = FfmpegCommand::with_output(output);
    for clip in clips {
        cmd = cmd.input(Vec::<String>::new(), clip);
    }
    cmd = cmd
        .filter_complex(concat_filter(clips.len(), trim_frames, fps, with_audio))
        .map("[vout]")
        .video_codec("libx264")
        .crf(CONCAT_CRF)
        .preset("medium")
        .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"]);
    if with_audio {
        cmd = cmd.map("[aout]").audio_codec("aac").audio_bitrate("192k");
    }

    runner.run(&cmd).await
}

/// Concatenate ordered clips as-is (narrative pipeline, where clips
/// share no overlapping frames).
pub async fn concat_clips(
    runner: &FfmpegRunner,
    clips: &[PathBuf],
    with_audio: bool,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    if clips.len() < 2 {
        return Err(MediaError::InvalidMedia(
            "concatenation requires at least 2 clips".to_string(),
        ));
    }

    let mut cmd = FfmpegCommand::with_output(output);
    for clip in clips {
        cmd = cmd.input(Vec::<String>::new(), clip);
    }
    cmd = cmd
        .filter_complex(concat_filter(clips.len(), 0, 30.0, with_audio))
        .map("[vout]")
        .video_codec("libx264")
        .crf(CONCAT_CRF)
        .preset("medium")
        .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"]);
    if with_audio {
        cmd = cmd.map("[aout]").audio_codec("aac").audio_bitrate("192k");
    }

    runner.run(&cmd).await
}

/// Specification for one narrative sentence clip.
#[derive(Debug, Clone)]
pub struct SentenceClipSpec {
    pub image: PathBuf,
    pub audio: PathBuf,
    /// Measured audio duration; the clip lasts exactly this long.
    pub duration_ms: i64,
    pub subtitle: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Ken Burns zoom increment per frame.
    pub zoom_speed: f64,
}

/// Escape a subtitle line for use inside a drawtext filter.
fn escape_drawtext(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
        .replace('%', "\\%")
}

/// Build the Ken Burns + subtitle filter graph for one sentence.
fn sentence_filter(spec: &SentenceClipSpec) -> String {
    let (w, h, fps) = (spec.width, spec.height, spec.fps);
    let total_frames = ((spec.duration_ms as f64 / 1000.0) * fps as f64).ceil() as i64;
    let zoom = spec.zoom_speed;

    // Slow push-in with a drift toward the lower right; capped at 1.15x.
    let mut video = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
         pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,\
         zoompan=z='min(1+{zoom}*on,1.15)':\
         x='iw/2-(iw/zoom/2)-{dx}*on/{total_frames}':\
         y='ih/2-(ih/zoom/2)-{dy}*on/{total_frames}':\
         d={total_frames}:s={w}x{h}:fps={fps}",
        dx = (w as f64 * 0.05) as i64,
        dy = (h as f64 * 0.05) as i64,
    );

    if let Some(subtitle) = spec.subtitle.as_deref().filter(|s| !s.is_empty()) {
        video.push_str(&format!(
            ",drawtext=text='{}':fontsize=h/18:fontcolor=white:borderw=2:bordercolor=black:\
             x=(w-text_w)/2:y=h-text_h-h/12",
            escape_drawtext(subtitle)
        ));
    }

    format!("{video}[v];[1:a]asetpts=PTS-STARTPTS[a]")
}

/// Render one sentence into a clip whose duration equals the measured
/// audio length.
pub async fn render_sentence_clip(
    runner: &FfmpegRunner,
    spec: &SentenceClipSpec,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    if spec.duration_ms <= 0 {
        return Err(MediaError::InvalidMedia(format!(
            "sentence audio duration {} ms is not positive",
            spec.duration_ms
        )));
    }

    let cmd = FfmpegCommand::with_output(output)
        .input(["-loop", "1", "-framerate", &spec.fps.to_string()], &spec.image)
        .input(Vec::<String>::new(), &spec.audio)
        .filter_complex(sentence_filter(spec))
        .map("[v]")
        .map("[a]")
        .video_codec("libx264")
        .preset("slow")
        .crf(20)
        .output_args(["-profile:v", "high", "-level", "4.2"])
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart", "-shortest"]);

    runner.run(&cmd).await
}

/// Build the BGM mixing graph.
///
/// The music is looped to cover the video, set to `volume`, and ducked
/// under dialogue with a sidechain compressor keyed on the primary
/// track (≈6 dB attenuation while speech is present).
fn bgm_filter(volume: f32) -> String {
    format!(
        "[1:a]volume={volume}[bgm];\
         [0:a]asplit=2[main][sc];\
         [bgm][sc]sidechaincompress=threshold=0.03:ratio=4:attack=20:release=300[ducked];\
         [main][ducked]amix=inputs=2:duration=first:dropout_transition=2[aout]"
    )
}

/// Mix background music into a finished video.
///
/// Callers must skip this entirely when `volume` is zero so the
/// primary track stays bit-identical to a no-BGM run.
pub async fn mix_bgm(
    runner: &FfmpegRunner,
    video: impl AsRef<Path>,
    bgm: impl AsRef<Path>,
    volume: f32,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    if !(volume > 0.0) {
        return Err(MediaError::InvalidMedia(
            "bgm volume must be positive; skip the mix for silent bgm".to_string(),
        ));
    }
    let volume = volume.min(0.5);

    let cmd = FfmpegCommand::with_output(output)
        .input(Vec::<String>::new(), video)
        .input(["-stream_loop", "-1"], bgm)
        .filter_complex(bgm_filter(volume))
        .map("0:v")
        .map("[aout]")
        .video_codec("copy")
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_arg("-shortest");

    runner.run(&cmd).await
}

/// Enforce target resolution and fps in one final re-encode pass.
pub async fn scale_to_target(
    runner: &FfmpegRunner,
    input: impl AsRef<Path>,
    width: u32,
    height: u32,
    fps: u32,
    output: impl AsRef<Path>,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(input, output)
        .video_filter(format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease,\
             pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:black,fps={fps}"
        ))
        .video_codec("libx264")
        .crf(CONCAT_CRF)
        .preset("medium")
        .audio_codec("copy")
        .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"]);

    runner.run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_frames_follow_fps() {
        assert_eq!(trim_frames_for_fps(24.0), 36);
        assert_eq!(trim_frames_for_fps(23.976), 36);
        assert_eq!(trim_frames_for_fps(30.0), 45);
        assert_eq!(trim_frames_for_fps(60.0), 90);
    }

    #[test]
    fn concat_filter_trims_all_but_first() {
        let f = concat_filter(3, 36, 24.0, true);
        // First clip only gets a PTS reset
        assert!(f.contains("[0:v]setpts=PTS-STARTPTS[v0]"));
        assert!(!f.contains("[0:v]trim"));
        // Later clips lose their leading frames, audio by equal time
        assert!(f.contains("[1:v]trim=start_frame=36"));
        assert!(f.contains("[2:v]trim=start_frame=36"));
        assert!(f.contains("[1:a]atrim=start=1.500000"));
        assert!(f.contains("concat=n=3:v=1:a=1[vout][aout]"));
    }

    #[test]
    fn concat_filter_video_only() {
        let f = concat_filter(2, 45, 30.0, false);
        assert!(!f.contains("atrim"));
        assert!(f.contains("concat=n=2:v=1:a=0[vout]"));
    }

    #[test]
    fn sentence_filter_burns_subtitle() {
        let spec = SentenceClipSpec {
            image: "i.png".into(),
            audio: "a.mp3".into(),
            duration_ms: 2500,
            subtitle: Some("It's 50:50".into()),
            width: 1440,
            height: 1080,
            fps: 30,
            zoom_speed: 0.00015,
        };
        let f = sentence_filter(&spec);
        assert!(f.contains("zoompan"));
        assert!(f.contains("d=75")); // 2.5 s at 30 fps
        assert!(f.contains("drawtext"));
        assert!(f.contains("It\\'s 50\\:50"));
    }

    #[test]
    fn sentence_filter_without_subtitle() {
        let spec = SentenceClipSpec {
            image: "i.png".into(),
            audio: "a.mp3".into(),
            duration_ms: 1000,
            subtitle: None,
            width: 640,
            height: 480,
            fps: 24,
            zoom_speed: 0.0002,
        };
        assert!(!sentence_filter(&spec).contains("drawtext"));
    }

    #[test]
    fn bgm_filter_ducks_under_dialogue() {
        let f = bgm_filter(0.15);
        assert!(f.contains("volume=0.15"));
        assert!(f.contains("sidechaincompress"));
        assert!(f.contains("amix=inputs=2:duration=first"));
    }
}
