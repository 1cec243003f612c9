//! Project-scoped characters (movie pipeline).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{CharacterId, ProjectId};

/// A recurring character referenced by name from shots.
///
/// Names are unique within a project; shot references resolve by
/// exact-string, case-sensitive match.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Character {
    pub id: CharacterId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_description: Option<String>,
    /// Full visual description used for avatar generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_traits: Option<String>,
    /// Short visual anchors injected into keyframe prompts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_visual_traits: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Three-view reference-sheet prompt generated for this character.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_prompt: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
