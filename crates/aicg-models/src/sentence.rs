//! Sentences and their generated assets (narrative pipeline).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ChapterId, SentenceId};

/// An ordered leaf of chapter text; the smallest narrative video unit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Sentence {
    pub id: SentenceId,
    pub chapter_id: ChapterId,
    pub content: String,
    /// Position within the chapter.
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Generated assets attached to a sentence.
///
/// `duration_ms` must be the true measured length of `audio_url` by the
/// time assembly runs; the TTS handler re-measures the payload when the
/// provider does not report timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SentenceAsset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Text burned in as the sentence subtitle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_prompt: Option<String>,
}

impl SentenceAsset {
    /// Whether the sentence is ready for assembly.
    pub fn is_complete(&self) -> bool {
        self.image_url.is_some() && self.audio_url.is_some() && self.duration_ms.is_some()
    }
}
