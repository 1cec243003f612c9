//! Projects and chapters.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ChapterId, ProjectId};

/// Kind of production a project is set up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    /// Image + voice explanation video built per sentence.
    #[default]
    Narrative,
    /// Multi-shot stylized film built from scripts, shots and transitions.
    Movie,
}

impl ProjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Narrative => "narrative",
            ProjectKind::Movie => "movie",
        }
    }
}

/// A user-owned container for chapters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: String,
    pub name: String,
    pub kind: ProjectKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Production status of a chapter.
///
/// The status advances monotonically along this enum; the only backward
/// transition is an explicit admin reset. `Failed` is a sink reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    Draft,
    Parsed,
    ScriptGenerated,
    MaterialsPrepared,
    Completed,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Draft => "draft",
            PipelineStatus::Parsed => "parsed",
            PipelineStatus::ScriptGenerated => "script_generated",
            PipelineStatus::MaterialsPrepared => "materials_prepared",
            PipelineStatus::Completed => "completed",
            PipelineStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PipelineStatus::Draft),
            "parsed" => Some(PipelineStatus::Parsed),
            "script_generated" => Some(PipelineStatus::ScriptGenerated),
            "materials_prepared" => Some(PipelineStatus::MaterialsPrepared),
            "completed" => Some(PipelineStatus::Completed),
            "failed" => Some(PipelineStatus::Failed),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PipelineStatus::Draft => 0,
            PipelineStatus::Parsed => 1,
            PipelineStatus::ScriptGenerated => 2,
            PipelineStatus::MaterialsPrepared => 3,
            PipelineStatus::Completed => 4,
            PipelineStatus::Failed => 5,
        }
    }

    /// Whether a transition to `next` is allowed without an admin reset.
    ///
    /// Forward moves along the ordered enum are allowed, as is dropping
    /// into `Failed` from any non-terminal state. `Completed` and
    /// `Failed` are terminal.
    pub fn can_advance_to(&self, next: PipelineStatus) -> bool {
        match (self, next) {
            (PipelineStatus::Completed, _) | (PipelineStatus::Failed, _) => false,
            (_, PipelineStatus::Failed) => true,
            (cur, nxt) => nxt.rank() > cur.rank(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStatus::Completed | PipelineStatus::Failed)
    }
}

/// An ordered slice of text belonging to a project; the unit of production.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Chapter {
    pub id: ChapterId,
    pub project_id: ProjectId,
    pub title: String,
    /// Chapter source text.
    pub content: String,
    pub chapter_number: i32,
    pub pipeline_status: PipelineStatus,
    /// Final assembled video, if produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    /// Final video duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_duration_secs: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_status_is_monotonic() {
        assert!(PipelineStatus::Draft.can_advance_to(PipelineStatus::Parsed));
        assert!(PipelineStatus::Parsed.can_advance_to(PipelineStatus::Completed));
        assert!(!PipelineStatus::ScriptGenerated.can_advance_to(PipelineStatus::Parsed));
        assert!(!PipelineStatus::Parsed.can_advance_to(PipelineStatus::Parsed));
    }

    #[test]
    fn failed_is_reachable_but_terminal() {
        assert!(PipelineStatus::Parsed.can_advance_to(PipelineStatus::Failed));
        assert!(!PipelineStatus::Failed.can_advance_to(PipelineStatus::Draft));
        assert!(!PipelineStatus::Completed.can_advance_to(PipelineStatus::Failed));
    }
}
