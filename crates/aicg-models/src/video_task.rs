//! Terminal video assembly records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ChapterId, ErrorKind, VideoTaskId};

/// Assembly pipeline stage of a video task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoTaskStatus {
    #[default]
    Pending,
    Validating,
    Downloading,
    Synthesizing,
    Concatenating,
    Uploading,
    Completed,
    Failed,
}

impl VideoTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoTaskStatus::Pending => "pending",
            VideoTaskStatus::Validating => "validating",
            VideoTaskStatus::Downloading => "downloading",
            VideoTaskStatus::Synthesizing => "synthesizing",
            VideoTaskStatus::Concatenating => "concatenating",
            VideoTaskStatus::Uploading => "uploading",
            VideoTaskStatus::Completed => "completed",
            VideoTaskStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(VideoTaskStatus::Pending),
            "validating" => Some(VideoTaskStatus::Validating),
            "downloading" => Some(VideoTaskStatus::Downloading),
            "synthesizing" => Some(VideoTaskStatus::Synthesizing),
            "concatenating" => Some(VideoTaskStatus::Concatenating),
            "uploading" => Some(VideoTaskStatus::Uploading),
            "completed" => Some(VideoTaskStatus::Completed),
            "failed" => Some(VideoTaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoTaskStatus::Completed | VideoTaskStatus::Failed)
    }
}

/// Generation settings for assembly.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenSettings {
    /// Output resolution as `WxH`.
    pub resolution: String,
    pub fps: u32,
    /// Blob key of the background music track, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bgm_ref: Option<String>,
    /// BGM mix volume; hard-capped at 0.5.
    pub bgm_volume: f32,
    /// Ken Burns zoom increment per frame (narrative pipeline).
    pub zoom_speed: f64,
}

impl Default for GenSettings {
    fn default() -> Self {
        Self {
            resolution: "1440x1080".to_string(),
            fps: 30,
            bgm_ref: None,
            bgm_volume: 0.15,
            zoom_speed: 0.000_15,
        }
    }
}

impl GenSettings {
    /// Parse `resolution` into `(width, height)`.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let (w, h) = self.resolution.split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?))
    }

    /// Validate caller-supplied settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.dimensions().is_none() {
            return Err(format!("invalid resolution '{}'", self.resolution));
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(format!("invalid fps {}", self.fps));
        }
        if !(0.0..=0.5).contains(&self.bgm_volume) {
            return Err(format!("bgm_volume {} outside [0, 0.5]", self.bgm_volume));
        }
        Ok(())
    }
}

/// The terminal assembly record for a chapter.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoTask {
    pub id: VideoTaskId,
    pub chapter_id: ChapterId,
    pub user_id: String,
    pub settings: GenSettings,
    pub status: VideoTaskStatus,
    /// Coarse percentage in `[0, 100]`.
    pub progress: i16,
    /// Index of the clip or sentence currently being processed.
    pub current_index: i32,
    pub total_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoTask {
    pub fn new(chapter_id: ChapterId, user_id: impl Into<String>, settings: GenSettings) -> Self {
        let now = Utc::now();
        Self {
            id: VideoTaskId::new(),
            chapter_id,
            user_id: user_id.into(),
            settings,
            status: VideoTaskStatus::Pending,
            progress: 0,
            current_index: 0,
            total_count: 0,
            video_url: None,
            duration_secs: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(GenSettings::default().validate().is_ok());
        assert_eq!(GenSettings::default().dimensions(), Some((1440, 1080)));
    }

    #[test]
    fn bgm_volume_is_capped() {
        let mut s = GenSettings::default();
        s.bgm_volume = 0.6;
        assert!(s.validate().is_err());
        s.bgm_volume = -0.1;
        assert!(s.validate().is_err());
        s.bgm_volume = 0.0;
        assert!(s.validate().is_ok());
    }
}
