//! Stage identifiers for the production graphs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A level in the production DAG.
///
/// The movie pipeline runs `ExtractCharacters` through `ComposeVideo`;
/// the narrative pipeline uses the `Sentence*` stages plus
/// `ComposeVideo`. Topology (dependencies, fan-out, weights) lives in
/// the engine; this enum is what job rows persist as `target_stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    // Movie pipeline
    ExtractCharacters,
    ExtractScenes,
    ExtractShots,
    GenerateSceneImages,
    GenerateCharacterAvatars,
    GenerateKeyframes,
    CreateTransitions,
    GenerateTransitionVideos,
    // Narrative pipeline
    GenerateSentencePrompts,
    GenerateSentenceImages,
    SynthesizeSentenceAudio,
    // Terminal stage of both graphs
    ComposeVideo,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ExtractCharacters => "extract_characters",
            Stage::ExtractScenes => "extract_scenes",
            Stage::ExtractShots => "extract_shots",
            Stage::GenerateSceneImages => "generate_scene_images",
            Stage::GenerateCharacterAvatars => "generate_character_avatars",
            Stage::GenerateKeyframes => "generate_keyframes",
            Stage::CreateTransitions => "create_transitions",
            Stage::GenerateTransitionVideos => "generate_transition_videos",
            Stage::GenerateSentencePrompts => "generate_sentence_prompts",
            Stage::GenerateSentenceImages => "generate_sentence_images",
            Stage::SynthesizeSentenceAudio => "synthesize_sentence_audio",
            Stage::ComposeVideo => "compose_video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "extract_characters" => Some(Stage::ExtractCharacters),
            "extract_scenes" => Some(Stage::ExtractScenes),
            "extract_shots" => Some(Stage::ExtractShots),
            "generate_scene_images" => Some(Stage::GenerateSceneImages),
            "generate_character_avatars" => Some(Stage::GenerateCharacterAvatars),
            "generate_keyframes" => Some(Stage::GenerateKeyframes),
            "create_transitions" => Some(Stage::CreateTransitions),
            "generate_transition_videos" => Some(Stage::GenerateTransitionVideos),
            "generate_sentence_prompts" => Some(Stage::GenerateSentencePrompts),
            "generate_sentence_images" => Some(Stage::GenerateSentenceImages),
            "synthesize_sentence_audio" => Some(Stage::SynthesizeSentenceAudio),
            "compose_video" => Some(Stage::ComposeVideo),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
