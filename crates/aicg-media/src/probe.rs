//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels (0 for audio-only files)
    pub width: u32,
    /// Height in pixels (0 for audio-only files)
    pub height: u32,
    /// Frame rate (fps); 0 for audio-only files
    pub fps: f64,
    /// Whether the file carries an audio stream
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a media file for information.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let ffprobe = check_ffprobe()?;

    let output = Command::new(&ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video_stream
        .and_then(|s| {
            s.avg_frame_rate
                .as_ref()
                .or(s.r_frame_rate.as_ref())
                .and_then(|r| parse_frame_rate(r))
        })
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration,
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        fps,
        has_audio,
    })
}

/// Measured duration of a media file in milliseconds.
///
/// This is the authoritative source for sentence audio durations; the
/// stored `duration_ms` always comes from here when the provider does
/// not report timing.
pub async fn probe_duration_ms(path: impl AsRef<Path>) -> MediaResult<i64> {
    let info = probe_media(path).await?;
    Ok((info.duration * 1000.0).round() as i64)
}

/// Pick the authoritative fps for a set of clips by majority vote.
///
/// Returns `None` on a split vote; the caller then falls back to the
/// target fps and re-encodes.
pub fn detect_majority_fps(fps_values: &[f64]) -> Option<f64> {
    if fps_values.is_empty() {
        return None;
    }

    // Bucket by rounded fps so 23.976 and 24.0 count together.
    let mut counts: Vec<(i64, usize, f64)> = Vec::new();
    for &fps in fps_values {
        let bucket = fps.round() as i64;
        match counts.iter_mut().find(|(b, _, _)| *b == bucket) {
            Some((_, count, _)) => *count += 1,
            None => counts.push((bucket, 1, fps)),
        }
    }

    counts.sort_by(|a, b| b.1.cmp(&a.1));
    let (_, best_count, representative) = counts[0];
    let tied = counts.len() > 1 && counts[1].1 == best_count;
    if tied || best_count * 2 <= fps_values.len() {
        None
    } else {
        Some(representative)
    }
}

/// Parse a frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_parsing() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("30/0").is_none());
    }

    #[test]
    fn majority_fps_vote() {
        assert_eq!(detect_majority_fps(&[24.0, 24.0, 23.976]), Some(24.0));
        assert_eq!(detect_majority_fps(&[24.0, 24.0, 30.0]), Some(24.0));
        // Split vote yields no authority
        assert_eq!(detect_majority_fps(&[24.0, 30.0]), None);
        assert_eq!(detect_majority_fps(&[]), None);
    }
}
