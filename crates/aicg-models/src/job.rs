//! Pipeline jobs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ApiKeyId, ChapterId, ErrorKind, JobId, Stage};

/// Job state in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "success" => Some(JobStatus::Success),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// Task-outcome counters rolled up on the job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobStatistics {
    pub total: u32,
    pub success: u32,
    pub failed: u32,
    /// Tasks skipped because the artifact already existed (resume).
    pub skipped: u32,
}

impl JobStatistics {
    pub fn settled(&self) -> u32 {
        self.success + self.failed + self.skipped
    }
}

/// A user-submitted request to drive part of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub user_id: String,
    pub chapter_id: ChapterId,
    /// The stage the chapter should reach; all transitive upstream
    /// stages run as needed.
    pub target_stage: Stage,
    /// Credential used for provider calls spawned by this job.
    pub api_key_id: ApiKeyId,
    /// Model override applied to every provider call; unknown names
    /// are passed through to the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Release downstream stages even when a stage finished with
    /// partial failures.
    #[serde(default)]
    pub continue_on_partial: bool,
    pub status: JobStatus,
    /// Weighted completion in `[0, 1]`, nondecreasing until terminal.
    pub progress: f32,
    pub statistics: JobStatistics,
    /// Cooperative cancellation flag; workers observe it at suspension
    /// points.
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        user_id: impl Into<String>,
        chapter_id: ChapterId,
        target_stage: Stage,
        api_key_id: ApiKeyId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            chapter_id,
            target_stage,
            api_key_id,
            model: None,
            continue_on_partial: false,
            status: JobStatus::Pending,
            progress: 0.0,
            statistics: JobStatistics::default(),
            cancel_requested: false,
            result_ref: None,
            error_code: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_continue_on_partial(mut self, enabled: bool) -> Self {
        self.continue_on_partial = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_is_pending_with_zero_progress() {
        let job = Job::new("u1", ChapterId::new(), Stage::ComposeVideo, ApiKeyId::new());
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0.0);
        assert!(!job.cancel_requested);
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
