//! Prompt templates for the generation stages.
//!
//! All extraction prompts demand a bare JSON document; the adapter
//! layer strips code fences, and [`crate::extract`] parses the result.

use aicg_models::{Character, Scene, Shot};

pub const EXTRACTION_SYSTEM: &str =
    "You are an award-winning screenwriter and film director. You convert novel chapters \
     into structured film production data. You output only the requested JSON document, \
     with no commentary, no Markdown and no code fences.";

pub const TRANSITION_SYSTEM: &str =
    "You are an expert at writing prompts for frame-interpolating video generation models.";

/// Prompt for extracting the recurring characters of a chapter.
pub fn character_extraction(chapter_text: &str) -> String {
    format!(
        "Identify every recurring character in the chapter below.\n\
         \n\
         Output JSON of the form:\n\
         {{\"characters\": [{{\"name\": \"...\", \"role_description\": \"...\", \
         \"visual_traits\": \"full visual description for portrait generation\", \
         \"key_visual_traits\": \"3-6 short visual anchors, comma separated\"}}]}}\n\
         \n\
         Rules:\n\
         - One entry per distinct character; keep names exactly as written in the text.\n\
         - visual_traits must be concrete and filmable: age, build, face, hair, clothing.\n\
         - Characters appearing only once in passing are omitted.\n\
         \n\
         Chapter:\n{chapter_text}"
    )
}

/// Prompt for splitting a chapter into film scenes.
///
/// Scene descriptions must be dense, visually concrete text; the
/// `characters` arrays may only use names from the provided list,
/// matched exactly.
pub fn scene_extraction(characters_json: &str, chapter_text: &str) -> String {
    format!(
        "Split the chapter below into film scenes.\n\
         \n\
         Output JSON of the form:\n\
         {{\"scenes\": [{{\"order_index\": 1, \"location\": \"...\", \"time_of_day\": \"...\", \
         \"atmosphere\": \"...\", \"description\": \"dense, visually concrete scene text\", \
         \"characters\": [\"name\", ...]}}]}}\n\
         \n\
         Rules:\n\
         - A scene is one continuous place and time; split when either changes.\n\
         - You must not invent characters. Only names from the existing character list \
           may appear, spelled exactly as given; use [] when nobody appears.\n\
         - description is not a summary: write what the camera sees - space, light, \
           sound, physical action, key dialogue in quotes. No inner monologue.\n\
         \n\
         Existing characters:\n{characters_json}\n\
         \n\
         Chapter:\n{chapter_text}"
    )
}

/// Prompt for splitting one scene into 8-second shots.
pub fn shot_extraction(characters_json: &str, scene_description: &str) -> String {
    format!(
        "Split the film scene below into shots for a fixed 8-second video model.\n\
         \n\
         The model interpolates between a first frame and a last frame, so every shot \
         description must pin a clear start state and end state; all narrative beats must \
         be visible in the final frame.\n\
         \n\
         Output JSON of the form:\n\
         {{\"shots\": [{{\"order_index\": 1, \"shot\": \"start state, continuous visible \
         action, end state, framing, light\", \"camera_movement\": \"...\", \
         \"dialogue\": \"spoken line or empty string\", \"characters\": [\"name\", ...]}}]}}\n\
         \n\
         Rules:\n\
         - 2 to 6 shots per scene; do not fragment continuous action.\n\
         - At most one or two short lines of dialogue per shot.\n\
         - Only names from the existing character list, spelled exactly; [] when empty.\n\
         \n\
         Existing characters:\n{characters_json}\n\
         \n\
         Scene:\n{scene_description}"
    )
}

/// Prompt for an environment-only scene establishing image.
pub fn scene_image(scene: &Scene) -> String {
    let mut context = String::new();
    if let Some(location) = scene.location.as_deref() {
        context.push_str(&format!("Location: {location}. "));
    }
    if let Some(time_of_day) = scene.time_of_day.as_deref() {
        context.push_str(&format!("Time: {time_of_day}. "));
    }
    if let Some(atmosphere) = scene.atmosphere.as_deref() {
        context.push_str(&format!("Atmosphere: {atmosphere}. "));
    }
    format!(
        "Cinematic establishing shot of the following environment, shot on a film camera. \
         Environment only, no people.\n{context}\n{}",
        scene.description.as_deref().unwrap_or_default()
    )
}

/// Three-view reference sheet prompt for a character.
pub fn character_avatar(character: &Character) -> String {
    format!(
        "Character reference sheet, three views (front, three-quarter, profile) of the same \
         person on a neutral grey background, consistent identity across views, cinematic \
         lighting, photographic realism.\n\
         Character: {}\n{}",
        character.name,
        character.visual_traits.as_deref().unwrap_or_default()
    )
}

/// Keyframe prompt composed from scene context, shot description and
/// the referenced characters' visual anchors.
///
/// Shots with no character references must still produce a valid
/// prompt from scene context alone.
pub fn keyframe(scene: &Scene, shot: &Shot, characters: &[Character]) -> String {
    let mut prompt = format!(
        "Cinematic film still. {}\n",
        shot.visual_description
    );

    let mut context = String::new();
    if let Some(location) = scene.location.as_deref() {
        context.push_str(&format!("Location: {location}. "));
    }
    if let Some(time_of_day) = scene.time_of_day.as_deref() {
        context.push_str(&format!("Time: {time_of_day}. "));
    }
    if let Some(atmosphere) = scene.atmosphere.as_deref() {
        context.push_str(&format!("Atmosphere: {atmosphere}. "));
    }
    if !context.is_empty() {
        prompt.push_str(&context);
        prompt.push('\n');
    }

    for character in characters {
        if let Some(traits) = character.key_visual_traits.as_deref() {
            prompt.push_str(&format!("{}: {traits}\n", character.name));
        }
    }

    if let Some(camera) = shot.camera_movement.as_deref() {
        prompt.push_str(&format!("Framing: {camera}\n"));
    }

    prompt
}

/// Prompt asking the text model to write a transition-video prompt
/// bridging two consecutive shots.
///
/// Character visual traits are deliberately omitted: visual identity
/// comes from the anchor keyframes, the model only needs the names.
pub fn transition_video(from: &Shot, to: &Shot) -> String {
    format!(
        "Write one concise English video-generation prompt describing a continuous 8-second \
         camera take that starts at shot A's final image and ends at shot B's image. Describe \
         motion and transformation only; the first and last frames are supplied as images.\n\
         Output the prompt text alone, nothing else.\n\
         \n\
         Shot A: {}\nDialogue A: {}\nCharacters A: {}\n\
         \n\
         Shot B: {}\nDialogue B: {}\nCharacters B: {}",
        from.visual_description,
        from.dialogue.as_deref().unwrap_or("none"),
        join_or_none(&from.character_refs),
        to.visual_description,
        to.dialogue.as_deref().unwrap_or("none"),
        join_or_none(&to.character_refs),
    )
}

/// Prompt turning a sentence into an illustration prompt and a
/// subtitle line.
pub fn sentence_prompts(sentence_text: &str) -> String {
    format!(
        "For the narration sentence below, produce an illustration prompt and a subtitle.\n\
         \n\
         Output JSON of the form:\n\
         {{\"image_prompt\": \"concrete visual description for a single illustration\", \
         \"subtitle_text\": \"the sentence, lightly shortened if over 40 characters\"}}\n\
         \n\
         Sentence:\n{sentence_text}"
    )
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aicg_models::{CharacterId, ProjectId, SceneId, ScriptId, ShotId};
    use chrono::Utc;

    fn scene() -> Scene {
        Scene {
            id: SceneId::new(),
            script_id: ScriptId::new(),
            order_index: 1,
            location: Some("city gate".into()),
            time_of_day: Some("night".into()),
            atmosphere: Some("storm".into()),
            description: Some("Rain hammers the gate.".into()),
            scene_image_url: None,
            scene_image_prompt: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn shot(refs: Vec<String>) -> Shot {
        Shot {
            id: ShotId::new(),
            scene_id: SceneId::new(),
            order_index: 1,
            visual_description: "Knight raises the sword.".into(),
            camera_movement: Some("slow push-in".into()),
            dialogue: None,
            character_refs: refs,
            keyframe_url: None,
            keyframe_prompt: None,
            error_message: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn keyframe_prompt_includes_character_anchors() {
        let character = Character {
            id: CharacterId::new(),
            project_id: ProjectId::new(),
            name: "Aldric".into(),
            role_description: None,
            visual_traits: None,
            key_visual_traits: Some("scarred cheek, black armor".into()),
            avatar_url: None,
            generated_prompt: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let p = keyframe(&scene(), &shot(vec!["Aldric".into()]), &[character]);
        assert!(p.contains("Knight raises the sword."));
        assert!(p.contains("Aldric: scarred cheek, black armor"));
        assert!(p.contains("Location: city gate"));
    }

    #[test]
    fn keyframe_prompt_works_without_characters() {
        let p = keyframe(&scene(), &shot(vec![]), &[]);
        assert!(p.contains("Knight raises the sword."));
        assert!(p.contains("Atmosphere: storm"));
    }
}
