//! Capability request/response records.

use serde::{Deserialize, Serialize};

/// Text completion request.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub model: String,
    /// Ask the provider for a JSON document; code fences are stripped
    /// from the response before return.
    pub json_mode: bool,
    pub temperature: Option<f32>,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            model: model.into(),
            json_mode: false,
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Text completion result.
#[derive(Debug, Clone)]
pub struct TextCompletion {
    pub text: String,
    pub usage: TokenUsage,
}

/// Image generation request.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub model: String,
    /// Reference images as URLs or data URLs, for identity-consistent
    /// generation.
    pub reference_images: Vec<String>,
    pub aspect_ratio: Option<String>,
    pub style: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            reference_images: Vec::new(),
            aspect_ratio: None,
            style: None,
        }
    }

    pub fn with_reference_images(mut self, images: Vec<String>) -> Self {
        self.reference_images = images;
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: impl Into<String>) -> Self {
        self.aspect_ratio = Some(ratio.into());
        self
    }
}

/// Image generation result.
#[derive(Debug, Clone)]
pub struct ImageOutput {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Speech synthesis request.
#[derive(Debug, Clone)]
pub struct TtsRequest {
    pub text: String,
    pub voice_id: String,
    pub model: String,
    pub speed: Option<f32>,
    pub emotion: Option<String>,
}

impl TtsRequest {
    pub fn new(
        text: impl Into<String>,
        voice_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            voice_id: voice_id.into(),
            model: model.into(),
            speed: None,
            emotion: None,
        }
    }
}

/// Speech synthesis result.
///
/// `duration_ms` is `None` when the provider response carries no
/// timing; callers must measure the payload before persisting it, so
/// the stored duration is always authoritative.
#[derive(Debug, Clone)]
pub struct TtsOutput {
    pub audio_bytes: Vec<u8>,
    pub mime: String,
    pub duration_ms: Option<u64>,
}

/// Long-running video generation submit request.
#[derive(Debug, Clone)]
pub struct VideoSubmitRequest {
    pub prompt: String,
    pub model: String,
    /// Anchor frames as URLs or data URLs.
    pub first_frame: Option<String>,
    pub last_frame: Option<String>,
    pub duration_s: u32,
}

impl VideoSubmitRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            first_frame: None,
            last_frame: None,
            duration_s: 8,
        }
    }

    pub fn with_frames(mut self, first: Option<String>, last: Option<String>) -> Self {
        self.first_frame = first;
        self.last_frame = last;
        self
    }
}

/// Outcome of polling an external video task.
#[derive(Debug, Clone)]
pub enum VideoPollOutcome {
    /// Still generating; poll again later.
    Pending,
    /// Finished; the clip is fetchable at this URL.
    Completed { video_url: String },
    /// Terminal provider-side failure.
    Failed { error: String },
}
