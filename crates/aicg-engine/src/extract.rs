//! Parsing of extraction-stage model output.

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Extracted character list.
#[derive(Debug, Deserialize)]
pub struct CharacterExtraction {
    pub characters: Vec<CharacterSpec>,
}

#[derive(Debug, Deserialize)]
pub struct CharacterSpec {
    pub name: String,
    #[serde(default)]
    pub role_description: Option<String>,
    #[serde(default)]
    pub visual_traits: Option<String>,
    #[serde(default)]
    pub key_visual_traits: Option<String>,
}

/// Extracted scene list.
#[derive(Debug, Deserialize)]
pub struct SceneExtraction {
    pub scenes: Vec<SceneSpec>,
}

#[derive(Debug, Deserialize)]
pub struct SceneSpec {
    pub order_index: i32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub atmosphere: Option<String>,
    pub description: String,
    #[serde(default)]
    pub characters: Vec<String>,
}

/// Extracted shot list for one scene.
#[derive(Debug, Deserialize)]
pub struct ShotExtraction {
    pub shots: Vec<ShotSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ShotSpec {
    pub order_index: i32,
    pub shot: String,
    #[serde(default)]
    pub camera_movement: Option<String>,
    #[serde(default)]
    pub dialogue: String,
    #[serde(default)]
    pub characters: Vec<String>,
}

/// Sentence prompt pair.
#[derive(Debug, Deserialize)]
pub struct SentencePromptSpec {
    pub image_prompt: String,
    pub subtitle_text: String,
}

/// Parse a JSON extraction payload, mapping parse failures to the
/// malformed-response class so the runtime retries once.
pub fn parse_extraction<T: serde::de::DeserializeOwned>(text: &str) -> EngineResult<T> {
    serde_json::from_str(text).map_err(|e| {
        EngineError::Provider(aicg_providers::ProviderError::Malformed(format!(
            "extraction payload did not parse: {e}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aicg_models::ErrorKind;

    #[test]
    fn parses_scene_extraction() {
        let json = r#"{"scenes":[{"order_index":1,"location":"gate","description":"Rain.","characters":["Aldric"]},{"order_index":2,"description":"Dawn.","characters":[]}]}"#;
        let parsed: SceneExtraction = parse_extraction(json).unwrap();
        assert_eq!(parsed.scenes.len(), 2);
        assert_eq!(parsed.scenes[0].characters, vec!["Aldric"]);
        assert!(parsed.scenes[1].characters.is_empty());
    }

    #[test]
    fn parses_shot_extraction_with_defaults() {
        let json = r#"{"shots":[{"order_index":1,"shot":"Sword raised."}]}"#;
        let parsed: ShotExtraction = parse_extraction(json).unwrap();
        assert_eq!(parsed.shots[0].dialogue, "");
        assert!(parsed.shots[0].characters.is_empty());
    }

    #[test]
    fn malformed_payload_is_retry_once() {
        let err = parse_extraction::<SceneExtraction>("not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }
}
