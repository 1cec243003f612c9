//! Object key layout.
//!
//! Keys live in a flat namespace with the path-prefix convention
//! `{project_id}/{artifact_type}/{uuid}.{ext}`.

use uuid::Uuid;

/// Artifact families stored as blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactType {
    SceneImage,
    Keyframe,
    Avatar,
    TransitionVideo,
    SentenceImage,
    SentenceAudio,
    FinalVideo,
    Bgm,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::SceneImage => "scene-images",
            ArtifactType::Keyframe => "keyframes",
            ArtifactType::Avatar => "avatars",
            ArtifactType::TransitionVideo => "transition-videos",
            ArtifactType::SentenceImage => "sentence-images",
            ArtifactType::SentenceAudio => "sentence-audio",
            ArtifactType::FinalVideo => "videos",
            ArtifactType::Bgm => "bgm",
        }
    }
}

/// Build a fresh object key for an artifact blob.
pub fn object_key(project_id: &str, artifact_type: ArtifactType, ext: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        project_id,
        artifact_type.as_str(),
        Uuid::new_v4(),
        ext.trim_start_matches('.')
    )
}

/// File extension for a MIME type produced by providers.
pub fn ext_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/ogg" => "ogg",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_convention() {
        let key = object_key("proj-1", ArtifactType::Keyframe, "png");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "proj-1");
        assert_eq!(parts[1], "keyframes");
        assert!(parts[2].ends_with(".png"));
    }

    #[test]
    fn dotted_extension_is_normalized() {
        let key = object_key("p", ArtifactType::FinalVideo, ".mp4");
        assert!(key.ends_with(".mp4"));
        assert!(!key.ends_with("..mp4"));
    }

    #[test]
    fn mime_mapping_covers_pipeline_outputs() {
        assert_eq!(ext_for_mime("image/png"), "png");
        assert_eq!(ext_for_mime("audio/mpeg"), "mp3");
        assert_eq!(ext_for_mime("video/mp4"), "mp4");
        assert_eq!(ext_for_mime("application/x-unknown"), "bin");
    }
}
