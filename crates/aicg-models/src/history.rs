//! Append-only generation history.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ApiKeyId, HistoryId};

/// Artifact families that keep history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    SceneImage,
    ShotKeyframe,
    CharacterAvatar,
    TransitionVideo,
    SentenceImage,
    SentenceAudio,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::SceneImage => "scene_image",
            ResourceType::ShotKeyframe => "shot_keyframe",
            ResourceType::CharacterAvatar => "character_avatar",
            ResourceType::TransitionVideo => "transition_video",
            ResourceType::SentenceImage => "sentence_image",
            ResourceType::SentenceAudio => "sentence_audio",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scene_image" => Some(ResourceType::SceneImage),
            "shot_keyframe" => Some(ResourceType::ShotKeyframe),
            "character_avatar" => Some(ResourceType::CharacterAvatar),
            "transition_video" => Some(ResourceType::TransitionVideo),
            "sentence_image" => Some(ResourceType::SentenceImage),
            "sentence_audio" => Some(ResourceType::SentenceAudio),
            _ => None,
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            ResourceType::TransitionVideo => MediaType::Video,
            ResourceType::SentenceAudio => MediaType::Audio,
            _ => MediaType::Image,
        }
    }
}

/// Kind of media a history row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Audio,
    Video,
}

/// One superseded generation result.
///
/// Rows store *prior* versions only; the live artifact points at its
/// current URL directly. Rows never point upward at their parent, and
/// they outlive a deleted parent (marked orphaned) until purged.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationHistory {
    pub id: HistoryId,
    pub resource_type: ResourceType,
    /// Id of the owning artifact, kept as text so rows survive parent
    /// deletion.
    pub resource_id: String,
    pub result_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_id: Option<ApiKeyId>,
    /// Set when the owning artifact has been deleted.
    pub orphaned: bool,
    pub created_at: DateTime<Utc>,
}
