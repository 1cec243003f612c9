//! FFmpeg CLI wrapper and assembly primitives.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building with multiple inputs
//! - Progress parsing from `-progress pipe:2`
//! - Cancellation and timeout support via tokio
//! - The filter graphs of the assembly engine: overlap-trimmed
//!   concatenation, Ken Burns sentence clips with burned-in subtitles,
//!   BGM mixing with dialogue ducking
//!
//! Everything here works on local files; fetching and persisting blobs
//! is the caller's concern.

pub mod command;
pub mod compose;
pub mod error;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use compose::{
    concat_clips, concat_clips_with_trim, mix_bgm, render_sentence_clip, scale_to_target,
    trim_frames_for_fps, SentenceClipSpec,
};
pub use error::{MediaError, MediaResult};
pub use probe::{detect_majority_fps, probe_duration_ms, probe_media, MediaInfo};
pub use progress::{FfmpegProgress, ProgressCallback};

/// Prefix for scratch directories; everything under it is ephemeral.
pub const SCRATCH_PREFIX: &str = "aicg-";

/// Create a scratch directory that is removed on drop.
pub fn scratch_dir() -> MediaResult<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir()
        .map_err(MediaError::from)
}
