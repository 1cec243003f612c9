//! Scripts, scenes, shots and transitions (movie pipeline).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ApiKeyId, ChapterId, SceneId, ScriptId, ShotId, TransitionId};

/// Generation status of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStatus {
    #[default]
    Pending,
    Generating,
    Completed,
    Failed,
}

impl ScriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptStatus::Pending => "pending",
            ScriptStatus::Generating => "generating",
            ScriptStatus::Completed => "completed",
            ScriptStatus::Failed => "failed",
        }
    }
}

/// One movie script per chapter, owning ordered scenes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Script {
    pub id: ScriptId,
    pub chapter_id: ChapterId,
    pub status: ScriptStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An ordered group of shots sharing a location and time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub id: SceneId,
    pub script_id: ScriptId,
    pub order_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_of_day: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atmosphere: Option<String>,
    /// Scene text description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Environment-only scene image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_image_prompt: Option<String>,
    /// Optimistic-concurrency version, bumped on every artifact rewrite.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The smallest filmable unit: one keyframe plus optional dialogue.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Shot {
    pub id: ShotId,
    pub scene_id: SceneId,
    pub order_index: i32,
    /// Visual description used to build the keyframe prompt.
    pub visual_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_movement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dialogue: Option<String>,
    /// Character names referenced by this shot. Matching against
    /// project characters is exact-string; dangling names are tolerated
    /// and logged.
    #[serde(default)]
    pub character_refs: Vec<String>,
    /// Anchor image for transition-video generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyframe_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyframe_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a transition video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionStatus::Pending => "pending",
            TransitionStatus::Processing => "processing",
            TransitionStatus::Completed => "completed",
            TransitionStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransitionStatus::Pending),
            "processing" => Some(TransitionStatus::Processing),
            "completed" => Some(TransitionStatus::Completed),
            "failed" => Some(TransitionStatus::Failed),
            _ => None,
        }
    }
}

/// A directed edge between two consecutive shots of a script.
///
/// Exactly one transition exists per consecutive ordered shot pair. The
/// finished clip is an 8-second interpolated video whose first frame is
/// the `from` shot's keyframe and whose last frame is the `to` shot's.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Transition {
    pub id: TransitionId,
    pub script_id: ScriptId,
    pub from_shot_id: ShotId,
    pub to_shot_id: ShotId,
    pub order_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub status: TransitionStatus,
    /// Provider-side task id while the clip is generating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_task_id: Option<String>,
    /// Credential the submit used; the sweeper polls with the same key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<ApiKeyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Earliest time the sweeper should poll this transition again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_poll_at: Option<DateTime<Utc>>,
    /// Number of polls performed so far, drives the poll backoff.
    pub poll_count: i32,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_status_roundtrip() {
        for s in [
            TransitionStatus::Pending,
            TransitionStatus::Processing,
            TransitionStatus::Completed,
            TransitionStatus::Failed,
        ] {
            assert_eq!(TransitionStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(TransitionStatus::from_str("bogus"), None);
    }
}
