//! Typed identifiers for pipeline entities.
//!
//! Every entity gets its own UUID-backed string newtype so that a
//! `ShotId` can never be passed where a `SceneId` is expected. The
//! inner representation stays a string because ids cross the queue,
//! the database and provider payloads as opaque text.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a project.
    ProjectId
);
entity_id!(
    /// Unique identifier for a chapter.
    ChapterId
);
entity_id!(
    /// Unique identifier for a sentence.
    SentenceId
);
entity_id!(
    /// Unique identifier for a movie script.
    ScriptId
);
entity_id!(
    /// Unique identifier for a scene within a script.
    SceneId
);
entity_id!(
    /// Unique identifier for a shot within a scene.
    ShotId
);
entity_id!(
    /// Unique identifier for a transition between two shots.
    TransitionId
);
entity_id!(
    /// Unique identifier for a project-scoped character.
    CharacterId
);
entity_id!(
    /// Unique identifier for a stored provider credential.
    ApiKeyId
);
entity_id!(
    /// Unique identifier for a pipeline job.
    JobId
);
entity_id!(
    /// Unique identifier for an executor task.
    TaskId
);
entity_id!(
    /// Unique identifier for a video assembly task.
    VideoTaskId
);
entity_id!(
    /// Unique identifier for a generation history entry.
    HistoryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = ShotId::from_string("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
        let back: ShotId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
