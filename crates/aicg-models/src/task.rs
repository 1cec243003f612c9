//! Executor tasks and their payloads.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    CharacterId, ChapterId, ErrorKind, JobId, SceneId, SentenceId, ShotId, Stage, TaskId,
    TransitionId, VideoTaskId,
};

/// Resource class of a task, used for concurrency caps, retry limits
/// and progress weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Text,
    Image,
    Tts,
    VideoSubmit,
    VideoPoll,
    Assembly,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Text => "text",
            TaskKind::Image => "image",
            TaskKind::Tts => "tts",
            TaskKind::VideoSubmit => "video_submit",
            TaskKind::VideoPoll => "video_poll",
            TaskKind::Assembly => "assembly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(TaskKind::Text),
            "image" => Some(TaskKind::Image),
            "tts" => Some(TaskKind::Tts),
            "video_submit" => Some(TaskKind::VideoSubmit),
            "video_poll" => Some(TaskKind::VideoPoll),
            "assembly" => Some(TaskKind::Assembly),
            _ => None,
        }
    }

    /// Cost weight for job progress rollup.
    pub fn weight(&self) -> u32 {
        match self {
            TaskKind::Text => 1,
            TaskKind::Image => 2,
            TaskKind::Tts => 1,
            TaskKind::VideoSubmit | TaskKind::VideoPoll => 8,
            TaskKind::Assembly => 10,
        }
    }

    /// Default per-process concurrency cap. `VideoPoll` is unbounded
    /// (`None`); assembly is additionally serialized per chapter by the
    /// handler.
    pub fn default_concurrency(&self) -> Option<usize> {
        match self {
            TaskKind::Text => Some(3),
            TaskKind::Image => Some(5),
            TaskKind::Tts => Some(5),
            TaskKind::VideoSubmit => Some(5),
            TaskKind::VideoPoll => None,
            TaskKind::Assembly => Some(1),
        }
    }

    /// Maximum retries before the task fails terminally. `None` means
    /// unbounded (long-poll tasks keep polling).
    pub fn max_retries(&self) -> Option<u32> {
        match self {
            TaskKind::Text => Some(3),
            TaskKind::Image => Some(2),
            TaskKind::Tts => Some(3),
            TaskKind::VideoSubmit => Some(2),
            TaskKind::VideoPoll => None,
            TaskKind::Assembly => Some(1),
        }
    }

    /// Overall deadline applied per attempt, in seconds.
    pub fn deadline_secs(&self) -> u64 {
        match self {
            TaskKind::Text => 120,
            TaskKind::Image => 180,
            TaskKind::Tts => 60,
            TaskKind::VideoSubmit => 60,
            TaskKind::VideoPoll => 30,
            TaskKind::Assembly => 1800,
        }
    }

    /// Environment variable that overrides the concurrency cap.
    pub fn concurrency_env(&self) -> &'static str {
        match self {
            TaskKind::Text => "WORKER_CONCURRENCY_TEXT",
            TaskKind::Image => "WORKER_CONCURRENCY_IMAGE",
            TaskKind::Tts => "WORKER_CONCURRENCY_TTS",
            TaskKind::VideoSubmit => "WORKER_CONCURRENCY_VIDEO_SUBMIT",
            TaskKind::VideoPoll => "WORKER_CONCURRENCY_VIDEO_POLL",
            TaskKind::Assembly => "WORKER_CONCURRENCY_ASSEMBLY",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed unit of executor work.
///
/// Each variant names the artifact it produces; provider credentials
/// and model selection come from the owning job. The dispatcher
/// pattern-matches on this enum, so adding a stage means adding a
/// variant and a handler.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    ExtractCharacters { chapter_id: ChapterId },
    ExtractScenes { chapter_id: ChapterId },
    ExtractShots { scene_id: SceneId },
    GenerateSceneImage { scene_id: SceneId },
    GenerateCharacterAvatar { character_id: CharacterId },
    GenerateKeyframe { shot_id: ShotId },
    CreateTransition { from_shot_id: ShotId, to_shot_id: ShotId, order_index: i32 },
    SubmitTransitionVideo { transition_id: TransitionId },
    PollTransitionVideo { transition_id: TransitionId },
    GenerateSentencePrompts { sentence_id: SentenceId },
    GenerateSentenceImage { sentence_id: SentenceId },
    SynthesizeSentenceAudio { sentence_id: SentenceId },
    ComposeVideo { video_task_id: VideoTaskId },
}

impl TaskPayload {
    /// Resource class this payload belongs to.
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::ExtractCharacters { .. }
            | TaskPayload::ExtractScenes { .. }
            | TaskPayload::ExtractShots { .. }
            | TaskPayload::CreateTransition { .. }
            | TaskPayload::GenerateSentencePrompts { .. } => TaskKind::Text,
            TaskPayload::GenerateSceneImage { .. }
            | TaskPayload::GenerateCharacterAvatar { .. }
            | TaskPayload::GenerateKeyframe { .. }
            | TaskPayload::GenerateSentenceImage { .. } => TaskKind::Image,
            TaskPayload::SynthesizeSentenceAudio { .. } => TaskKind::Tts,
            TaskPayload::SubmitTransitionVideo { .. } => TaskKind::VideoSubmit,
            TaskPayload::PollTransitionVideo { .. } => TaskKind::VideoPoll,
            TaskPayload::ComposeVideo { .. } => TaskKind::Assembly,
        }
    }

    /// Stage this payload implements.
    pub fn stage(&self) -> Stage {
        match self {
            TaskPayload::ExtractCharacters { .. } => Stage::ExtractCharacters,
            TaskPayload::ExtractScenes { .. } => Stage::ExtractScenes,
            TaskPayload::ExtractShots { .. } => Stage::ExtractShots,
            TaskPayload::GenerateSceneImage { .. } => Stage::GenerateSceneImages,
            TaskPayload::GenerateCharacterAvatar { .. } => Stage::GenerateCharacterAvatars,
            TaskPayload::GenerateKeyframe { .. } => Stage::GenerateKeyframes,
            TaskPayload::CreateTransition { .. } => Stage::CreateTransitions,
            TaskPayload::SubmitTransitionVideo { .. } | TaskPayload::PollTransitionVideo { .. } => {
                Stage::GenerateTransitionVideos
            }
            TaskPayload::GenerateSentencePrompts { .. } => Stage::GenerateSentencePrompts,
            TaskPayload::GenerateSentenceImage { .. } => Stage::GenerateSentenceImages,
            TaskPayload::SynthesizeSentenceAudio { .. } => Stage::SynthesizeSentenceAudio,
            TaskPayload::ComposeVideo { .. } => Stage::ComposeVideo,
        }
    }

    /// Deduplication key: one live task per (payload, target artifact).
    pub fn idempotency_key(&self) -> String {
        match self {
            TaskPayload::ExtractCharacters { chapter_id } => {
                format!("extract_characters:{chapter_id}")
            }
            TaskPayload::ExtractScenes { chapter_id } => format!("extract_scenes:{chapter_id}"),
            TaskPayload::ExtractShots { scene_id } => format!("extract_shots:{scene_id}"),
            TaskPayload::GenerateSceneImage { scene_id } => format!("scene_image:{scene_id}"),
            TaskPayload::GenerateCharacterAvatar { character_id } => {
                format!("character_avatar:{character_id}")
            }
            TaskPayload::GenerateKeyframe { shot_id } => format!("keyframe:{shot_id}"),
            TaskPayload::CreateTransition { from_shot_id, to_shot_id, .. } => {
                format!("transition:{from_shot_id}:{to_shot_id}")
            }
            TaskPayload::SubmitTransitionVideo { transition_id } => {
                format!("transition_video:{transition_id}")
            }
            TaskPayload::PollTransitionVideo { transition_id } => {
                format!("transition_poll:{transition_id}")
            }
            TaskPayload::GenerateSentencePrompts { sentence_id } => {
                format!("sentence_prompts:{sentence_id}")
            }
            TaskPayload::GenerateSentenceImage { sentence_id } => {
                format!("sentence_image:{sentence_id}")
            }
            TaskPayload::SynthesizeSentenceAudio { sentence_id } => {
                format!("sentence_audio:{sentence_id}")
            }
            TaskPayload::ComposeVideo { video_task_id } => format!("compose:{video_task_id}"),
        }
    }
}

/// Task state in the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
    /// Resolved without work because the artifact already existed.
    Skipped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "success" => Some(TaskStatus::Success),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Skipped
        )
    }
}

/// Durable task record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub kind: TaskKind,
    pub stage: Stage,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    pub retries: u32,
    pub cancel_requested: bool,
    /// Progress counters reported by the handler, rolled up to the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_current: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task for a job.
    pub fn new(job_id: JobId, payload: TaskPayload) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            job_id,
            kind: payload.kind(),
            stage: payload.stage(),
            payload,
            status: TaskStatus::Pending,
            retries: 0,
            cancel_requested: false,
            progress_current: None,
            progress_total: None,
            result: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_kind_and_stage_agree() {
        let p = TaskPayload::GenerateKeyframe { shot_id: ShotId::new() };
        assert_eq!(p.kind(), TaskKind::Image);
        assert_eq!(p.stage(), Stage::GenerateKeyframes);

        let p = TaskPayload::SubmitTransitionVideo { transition_id: TransitionId::new() };
        assert_eq!(p.kind(), TaskKind::VideoSubmit);
        assert_eq!(p.stage(), Stage::GenerateTransitionVideos);
    }

    #[test]
    fn payload_serde_is_tagged() {
        let p = TaskPayload::ExtractShots { scene_id: SceneId::from_string("s1") };
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"type\":\"extract_shots\""));
        let back: TaskPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.idempotency_key(), "extract_shots:s1");
    }

    #[test]
    fn weights_match_cost_estimates() {
        assert_eq!(TaskKind::Text.weight(), 1);
        assert_eq!(TaskKind::Image.weight(), 2);
        assert_eq!(TaskKind::VideoSubmit.weight(), 8);
        assert_eq!(TaskKind::Assembly.weight(), 10);
    }

    #[test]
    fn video_poll_is_unbounded() {
        assert_eq!(TaskKind::VideoPoll.default_concurrency(), None);
        assert_eq!(TaskKind::VideoPoll.max_retries(), None);
    }
}
