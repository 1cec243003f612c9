//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Stderr capture limit on FFmpeg failures.
pub const STDERR_CAP_BYTES: usize = 4096;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),
}

impl MediaError {
    /// Create an FFmpeg failure error with stderr truncated to the cap.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr: stderr.map(|s| truncate_stderr(&s)),
            exit_code,
        }
    }

    /// Stderr captured on failure, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

/// Truncate captured stderr to [`STDERR_CAP_BYTES`] at a char boundary.
pub fn truncate_stderr(s: &str) -> String {
    if s.len() <= STDERR_CAP_BYTES {
        return s.to_string();
    }
    let mut end = STDERR_CAP_BYTES;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_is_capped_at_4kib() {
        let long = "x".repeat(10_000);
        let e = MediaError::ffmpeg_failed("boom", Some(long), Some(1));
        assert_eq!(e.stderr().unwrap().len(), STDERR_CAP_BYTES);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(3000);
        let t = truncate_stderr(&s);
        assert!(t.len() <= STDERR_CAP_BYTES);
        assert!(t.chars().all(|c| c == 'é'));
    }
}
