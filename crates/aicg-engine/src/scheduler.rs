//! Job lifecycle and frontier advancement.
//!
//! The scheduler materializes stage fan-out dynamically: a stage's
//! tasks are created the moment its gate dependencies complete,
//! parameterized by the artifacts that now exist. Tasks whose target
//! artifact already exists are recorded as skipped (idempotent
//! resume). Frontier passes are serialized per job with an advisory
//! lock so workers and the sweeper never double-materialize.

use std::collections::HashMap;

use metrics::counter;
use tracing::{info, warn};

use aicg_db::{
    AdvisoryLock, ChapterRepo, CharacterRepo, JobRepo, ProjectRepo, SceneRepo, ScriptRepo,
    SentenceRepo, ShotRepo, StageCounts, TaskRepo, TransitionRepo, VideoTaskRepo,
};
use aicg_models::{
    Chapter, ErrorKind, GenSettings, Job, JobId, JobStatus, PipelineStatus, Project, ProjectKind,
    Stage, Task, TaskKind, TaskPayload, TaskStatus, Transition, VideoTask,
};
use aicg_queue::{QueueError, TaskMessage};

use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::stage::{required_stages, spec_for, StageSpec};

/// Per-task readiness verdict.
enum Readiness {
    Ready,
    /// Upstream artifacts still in flight.
    Wait,
    /// Upstream settled without producing the needed artifact.
    Dead(String),
}

/// One fan-out unit of a stage: the payload plus whether its target
/// artifact already exists.
struct FanoutUnit {
    payload: TaskPayload,
    satisfied: bool,
}

/// Drives jobs through the stage graph.
#[derive(Clone)]
pub struct Scheduler {
    ctx: EngineContext,
}

impl Scheduler {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Validate and persist a new job, then run the first frontier
    /// pass (which materializes and enqueues the initially-ready
    /// stages).
    pub async fn submit_job(&self, job: Job) -> EngineResult<Job> {
        let chapter = ChapterRepo::get(&self.ctx.pool, &job.chapter_id).await?;
        let project = ProjectRepo::get(&self.ctx.pool, &chapter.project_id).await?;

        if spec_for(project.kind, job.target_stage).is_none() {
            return Err(EngineError::validation(format!(
                "stage {} does not exist in the {} pipeline",
                job.target_stage,
                project.kind.as_str()
            )));
        }

        JobRepo::create(&self.ctx.pool, &job).await?;
        info!(job_id = %job.id, chapter_id = %job.chapter_id, target = %job.target_stage, "Job submitted");

        self.advance(&job.id).await?;
        Ok(JobRepo::get(&self.ctx.pool, &job.id).await?)
    }

    /// Request cooperative cancellation.
    pub async fn cancel_job(&self, job_id: &JobId) -> EngineResult<bool> {
        let accepted = JobRepo::request_cancel(&self.ctx.pool, job_id).await?;
        if accepted {
            self.advance(job_id).await?;
        }
        Ok(accepted)
    }

    /// Run one frontier pass for a job. Called after submission and
    /// after every task settles (worker or sweeper).
    pub async fn advance(&self, job_id: &JobId) -> EngineResult<()> {
        let _guard = AdvisoryLock::acquire(&self.ctx.pool, job_id.as_str()).await?;
        self.advance_locked(job_id).await
    }

    async fn advance_locked(&self, job_id: &JobId) -> EngineResult<()> {
        let job = JobRepo::get(&self.ctx.pool, job_id).await?;
        if job.status.is_terminal() {
            return Ok(());
        }

        if job.cancel_requested {
            return self.drain_cancelled(&job).await;
        }

        JobRepo::mark_running(&self.ctx.pool, job_id).await?;

        let chapter = ChapterRepo::get(&self.ctx.pool, &job.chapter_id).await?;
        let project = ProjectRepo::get(&self.ctx.pool, &chapter.project_id).await?;
        let stages = required_stages(project.kind, job.target_stage);

        // Stage -> fully complete (released downstream). Graph order
        // guarantees deps are evaluated before their dependents.
        let mut complete: HashMap<Stage, bool> = HashMap::new();
        let mut any_dead_stage = false;

        for stage in &stages {
            let spec = spec_for(project.kind, *stage).expect("stage in graph");
            let counts = TaskRepo::stage_counts(&self.ctx.pool, &job.id, *stage).await?;

            if counts.total == 0 {
                let gates_open = spec.gate_deps.iter().all(|d| complete.get(d).copied().unwrap_or(false));
                if !gates_open {
                    complete.insert(*stage, false);
                    continue;
                }

                let units = self.fan_out(&job, &project, &chapter, spec).await?;
                if units.is_empty() {
                    // Nothing to do at this stage (e.g. a single-shot
                    // chapter has no transitions).
                    complete.insert(*stage, true);
                    continue;
                }
                self.materialize(&job, spec, units).await?;
            }

            self.release_ready(&job, &project, spec, &complete).await?;

            // Re-read: materialization and dead-blocked kills both
            // change the counts.
            let counts = TaskRepo::stage_counts(&self.ctx.pool, &job.id, *stage).await?;

            let stage_done = stage_complete(&counts, job.continue_on_partial);
            complete.insert(*stage, stage_done);

            if counts.settled() == counts.total && !stage_done {
                any_dead_stage = true;
            }
        }

        self.advance_chapter(&project, &chapter, &complete).await?;

        let progress = TaskRepo::weighted_progress(&self.ctx.pool, &job.id).await?;
        JobRepo::update_progress(&self.ctx.pool, &job.id, progress).await?;

        let all_complete = stages.iter().all(|s| complete.get(s).copied().unwrap_or(false));
        if all_complete {
            let result_ref = ChapterRepo::get(&self.ctx.pool, &job.chapter_id)
                .await?
                .video_url;
            JobRepo::finalize(
                &self.ctx.pool,
                &job.id,
                JobStatus::Success,
                result_ref.as_deref(),
                None,
            )
            .await?;
            return Ok(());
        }

        if any_dead_stage && TaskRepo::all_settled(&self.ctx.pool, &job.id).await? {
            let stats = JobRepo::get(&self.ctx.pool, &job.id).await?.statistics;
            let message = format!(
                "pipeline stalled: {} of {} tasks failed",
                stats.failed, stats.total
            );
            JobRepo::finalize(
                &self.ctx.pool,
                &job.id,
                JobStatus::Failed,
                None,
                Some((ErrorKind::IncompleteMaterials, message.as_str())),
            )
            .await?;
            if chapter.pipeline_status.can_advance_to(PipelineStatus::Failed) {
                ChapterRepo::advance_status(&self.ctx.pool, &chapter.id, PipelineStatus::Failed)
                    .await?;
            }
        }

        Ok(())
    }

    /// Cancel pending tasks and finalize once running ones drain.
    async fn drain_cancelled(&self, job: &Job) -> EngineResult<()> {
        for task in TaskRepo::list_by_job(&self.ctx.pool, &job.id).await? {
            if task.status == TaskStatus::Pending {
                TaskRepo::mark_cancelled(&self.ctx.pool, &task.id).await?;
            }
        }
        if TaskRepo::all_settled(&self.ctx.pool, &job.id).await? {
            JobRepo::finalize(&self.ctx.pool, &job.id, JobStatus::Cancelled, None, None).await?;
        }
        Ok(())
    }

    /// Create task rows for a stage's fan-out units. Units whose
    /// artifact already exists become skipped rows; the rest start
    /// pending.
    async fn materialize(
        &self,
        job: &Job,
        spec: &StageSpec,
        units: Vec<FanoutUnit>,
    ) -> EngineResult<()> {
        let mut tasks = Vec::with_capacity(units.len());
        let mut skipped = 0u32;
        for unit in units {
            let mut task = Task::new(job.id.clone(), unit.payload);
            if unit.satisfied {
                task.status = TaskStatus::Skipped;
                skipped += 1;
            }
            tasks.push(task);
        }

        TaskRepo::create_many(&self.ctx.pool, &tasks).await?;
        JobRepo::add_counts(&self.ctx.pool, &job.id, tasks.len() as u32, skipped).await?;
        counter!("aicg_tasks_materialized_total", "stage" => spec.stage.as_str())
            .increment(tasks.len() as u64);

        info!(
            job_id = %job.id,
            stage = %spec.stage,
            total = tasks.len(),
            skipped,
            "Stage materialized"
        );
        Ok(())
    }

    /// Enqueue the stage's pending tasks whose fine-grained
    /// dependencies are satisfied, in submission order. Poll tasks are
    /// never enqueued; the sweeper drives them.
    async fn release_ready(
        &self,
        job: &Job,
        project: &Project,
        spec: &StageSpec,
        complete: &HashMap<Stage, bool>,
    ) -> EngineResult<()> {
        let pending = TaskRepo::pending_for_stage(&self.ctx.pool, &job.id, spec.stage).await?;

        for task in pending {
            if task.kind == TaskKind::VideoPoll {
                // Sweeper-driven; resolved here only when the
                // transition can no longer make progress.
                self.resolve_poll_task(job, &task).await?;
                continue;
            }

            match self.task_readiness(project, &task, complete).await? {
                Readiness::Ready => {
                    let msg = TaskMessage::new(task.id.clone(), task.kind);
                    match self.ctx.queue.enqueue(&msg).await {
                        Ok(_) => {}
                        // Already on the stream from a previous pass.
                        Err(QueueError::EnqueueFailed { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Readiness::Wait => {}
                Readiness::Dead(reason) => {
                    warn!(task_id = %task.id, reason, "Task dead-blocked, failing");
                    TaskRepo::mark_failed(
                        &self.ctx.pool,
                        &task.id,
                        ErrorKind::IncompleteMaterials,
                        &reason,
                    )
                    .await?;
                    JobRepo::record_task_outcome(&self.ctx.pool, &job.id, false).await?;
                }
            }
        }
        Ok(())
    }

    /// Settle a pending poll-bookkeeping task whose transition is
    /// already terminal. Completed clips resolve it; a failed
    /// transition with no live submit path fails it.
    async fn resolve_poll_task(&self, job: &Job, task: &Task) -> EngineResult<()> {
        let TaskPayload::PollTransitionVideo { transition_id } = &task.payload else {
            return Ok(());
        };

        let transition = TransitionRepo::get(&self.ctx.pool, transition_id).await?;
        match transition.status {
            aicg_models::TransitionStatus::Completed if transition.video_url.is_some() => {
                let result = serde_json::json!({ "video_url": transition.video_url });
                TaskRepo::mark_success(&self.ctx.pool, &task.id, Some(&result)).await?;
                JobRepo::record_task_outcome(&self.ctx.pool, &job.id, true).await?;
            }
            // Submitted and in flight: the sweeper owns it.
            aicg_models::TransitionStatus::Processing
                if transition.external_task_id.is_some() => {}
            // Failed, or never handed to the provider: once the submit
            // path is exhausted this poll can never resolve.
            _ => {
                let open_submits =
                    TaskRepo::open_submit_tasks(&self.ctx.pool, transition_id.as_str()).await?;
                if open_submits.is_empty() {
                    let reason = transition
                        .error_message
                        .unwrap_or_else(|| "transition video was never submitted".to_string());
                    TaskRepo::mark_failed(
                        &self.ctx.pool,
                        &task.id,
                        ErrorKind::Provider,
                        &reason,
                    )
                    .await?;
                    JobRepo::record_task_outcome(&self.ctx.pool, &job.id, false).await?;
                }
            }
        }
        Ok(())
    }

    /// Fine-grained readiness for one pending task.
    ///
    /// The only fine-grained edge in the graphs is keyframe →
    /// referenced characters' avatars; everything else is ready the
    /// moment its stage materializes.
    async fn task_readiness(
        &self,
        project: &Project,
        task: &Task,
        complete: &HashMap<Stage, bool>,
    ) -> EngineResult<Readiness> {
        let TaskPayload::GenerateKeyframe { shot_id } = &task.payload else {
            return Ok(Readiness::Ready);
        };

        let shot = ShotRepo::get(&self.ctx.pool, shot_id).await?;
        let avatars_settled = complete
            .get(&Stage::GenerateCharacterAvatars)
            .copied()
            .unwrap_or(false);

        for name in &shot.character_refs {
            match CharacterRepo::find_by_name(&self.ctx.pool, &project.id, name).await? {
                Some(character) => {
                    if character.avatar_url.is_none() {
                        if avatars_settled {
                            return Ok(Readiness::Dead(format!(
                                "character '{name}' has no avatar after avatar stage settled"
                            )));
                        }
                        return Ok(Readiness::Wait);
                    }
                }
                None => {
                    // Dangling names are tolerated; the keyframe falls
                    // back to scene context.
                    warn!(shot_id = %shot.id, name, "Shot references unknown character");
                }
            }
        }

        Ok(Readiness::Ready)
    }

    /// Compute a stage's fan-out units from the current artifacts.
    async fn fan_out(
        &self,
        job: &Job,
        project: &Project,
        chapter: &Chapter,
        spec: &StageSpec,
    ) -> EngineResult<Vec<FanoutUnit>> {
        let pool = &self.ctx.pool;
        let mut units = Vec::new();

        match spec.stage {
            Stage::ExtractCharacters => {
                let existing = CharacterRepo::list_by_project(pool, &project.id).await?;
                units.push(FanoutUnit {
                    payload: TaskPayload::ExtractCharacters { chapter_id: chapter.id.clone() },
                    satisfied: !existing.is_empty(),
                });
            }
            Stage::ExtractScenes => {
                let satisfied = match ScriptRepo::get_by_chapter(pool, &chapter.id).await? {
                    Some(script) => !SceneRepo::list_by_script(pool, &script.id).await?.is_empty(),
                    None => false,
                };
                units.push(FanoutUnit {
                    payload: TaskPayload::ExtractScenes { chapter_id: chapter.id.clone() },
                    satisfied,
                });
            }
            Stage::ExtractShots => {
                let script = self.require_script(chapter).await?;
                for scene in SceneRepo::list_by_script(pool, &script.id).await? {
                    let satisfied = !ShotRepo::list_by_scene(pool, &scene.id).await?.is_empty();
                    units.push(FanoutUnit {
                        payload: TaskPayload::ExtractShots { scene_id: scene.id },
                        satisfied,
                    });
                }
            }
            Stage::GenerateSceneImages => {
                let script = self.require_script(chapter).await?;
                for scene in SceneRepo::list_by_script(pool, &script.id).await? {
                    let satisfied = scene.scene_image_url.is_some();
                    units.push(FanoutUnit {
                        payload: TaskPayload::GenerateSceneImage { scene_id: scene.id },
                        satisfied,
                    });
                }
            }
            Stage::GenerateCharacterAvatars => {
                for character in CharacterRepo::list_by_project(pool, &project.id).await? {
                    let satisfied = character.avatar_url.is_some();
                    units.push(FanoutUnit {
                        payload: TaskPayload::GenerateCharacterAvatar { character_id: character.id },
                        satisfied,
                    });
                }
            }
            Stage::GenerateKeyframes => {
                for shot in ShotRepo::list_by_chapter(pool, &chapter.id).await? {
                    let satisfied = shot.keyframe_url.is_some();
                    units.push(FanoutUnit {
                        payload: TaskPayload::GenerateKeyframe { shot_id: shot.id },
                        satisfied,
                    });
                }
            }
            Stage::CreateTransitions => {
                let shots: Vec<_> = ShotRepo::list_by_chapter(pool, &chapter.id)
                    .await?
                    .into_iter()
                    .filter(|s| s.keyframe_url.is_some())
                    .collect();
                for (index, pair) in shots.windows(2).enumerate() {
                    let existing =
                        TransitionRepo::find_by_pair(pool, &pair[0].id, &pair[1].id).await?;
                    let satisfied =
                        existing.as_ref().is_some_and(|t| t.video_prompt.is_some());
                    units.push(FanoutUnit {
                        payload: TaskPayload::CreateTransition {
                            from_shot_id: pair[0].id.clone(),
                            to_shot_id: pair[1].id.clone(),
                            order_index: (index + 1) as i32,
                        },
                        satisfied,
                    });
                }
            }
            Stage::GenerateTransitionVideos => {
                for transition in TransitionRepo::list_by_chapter(pool, &chapter.id).await? {
                    units.push(FanoutUnit {
                        payload: TaskPayload::SubmitTransitionVideo {
                            transition_id: transition.id.clone(),
                        },
                        satisfied: transition_submitted(&transition),
                    });
                    units.push(FanoutUnit {
                        payload: TaskPayload::PollTransitionVideo {
                            transition_id: transition.id.clone(),
                        },
                        satisfied: transition.video_url.is_some(),
                    });
                }
            }
            Stage::GenerateSentencePrompts => {
                for (sentence_id, asset) in SentenceRepo::list_assets(pool, &chapter.id).await? {
                    let satisfied = asset.image_prompt.is_some() && asset.subtitle_text.is_some();
                    units.push(FanoutUnit {
                        payload: TaskPayload::GenerateSentencePrompts { sentence_id },
                        satisfied,
                    });
                }
            }
            Stage::GenerateSentenceImages => {
                for (sentence_id, asset) in SentenceRepo::list_assets(pool, &chapter.id).await? {
                    units.push(FanoutUnit {
                        payload: TaskPayload::GenerateSentenceImage { sentence_id },
                        satisfied: asset.image_url.is_some(),
                    });
                }
            }
            Stage::SynthesizeSentenceAudio => {
                for (sentence_id, asset) in SentenceRepo::list_assets(pool, &chapter.id).await? {
                    let satisfied = asset.audio_url.is_some() && asset.duration_ms.is_some();
                    units.push(FanoutUnit {
                        payload: TaskPayload::SynthesizeSentenceAudio { sentence_id },
                        satisfied,
                    });
                }
            }
            Stage::ComposeVideo => {
                let satisfied = chapter.video_url.is_some();
                let video_task = match VideoTaskRepo::latest_for_chapter(pool, &chapter.id).await? {
                    Some(existing) if !existing.status.is_terminal() => existing,
                    _ => {
                        let task = VideoTask::new(
                            chapter.id.clone(),
                            job.user_id.clone(),
                            GenSettings::default(),
                        );
                        VideoTaskRepo::create(pool, &task).await?;
                        task
                    }
                };
                units.push(FanoutUnit {
                    payload: TaskPayload::ComposeVideo { video_task_id: video_task.id },
                    satisfied,
                });
            }
        }

        Ok(units)
    }

    async fn require_script(&self, chapter: &Chapter) -> EngineResult<aicg_models::Script> {
        ScriptRepo::get_by_chapter(&self.ctx.pool, &chapter.id)
            .await?
            .ok_or_else(|| EngineError::not_found("Script", chapter.id.as_str()))
    }

    /// Advance the chapter's pipeline status to the highest milestone
    /// the completed stages support.
    async fn advance_chapter(
        &self,
        project: &Project,
        chapter: &Chapter,
        complete: &HashMap<Stage, bool>,
    ) -> EngineResult<()> {
        let done = |stage: Stage| complete.get(&stage).copied().unwrap_or(false);

        let milestone = match project.kind {
            ProjectKind::Movie => {
                if done(Stage::ComposeVideo) {
                    Some(PipelineStatus::Completed)
                } else if done(Stage::GenerateTransitionVideos) {
                    Some(PipelineStatus::MaterialsPrepared)
                } else if done(Stage::ExtractShots) {
                    Some(PipelineStatus::ScriptGenerated)
                } else if done(Stage::ExtractScenes) {
                    Some(PipelineStatus::Parsed)
                } else {
                    None
                }
            }
            ProjectKind::Narrative => {
                if done(Stage::ComposeVideo) {
                    Some(PipelineStatus::Completed)
                } else if done(Stage::GenerateSentenceImages)
                    && done(Stage::SynthesizeSentenceAudio)
                {
                    Some(PipelineStatus::MaterialsPrepared)
                } else if done(Stage::GenerateSentencePrompts) {
                    Some(PipelineStatus::Parsed)
                } else {
                    None
                }
            }
        };

        if let Some(milestone) = milestone {
            if chapter.pipeline_status.can_advance_to(milestone) {
                ChapterRepo::advance_status(&self.ctx.pool, &chapter.id, milestone).await?;
            }
        }
        Ok(())
    }
}

/// Whether the stage releases its dependents.
fn stage_complete(counts: &StageCounts, continue_on_partial: bool) -> bool {
    if counts.settled() != counts.total {
        return false;
    }
    if counts.failed == 0 && counts.cancelled == 0 {
        return true;
    }
    continue_on_partial && (counts.success + counts.skipped) > 0
}

/// A transition already handed to the provider (or finished).
fn transition_submitted(t: &Transition) -> bool {
    t.video_url.is_some() || (t.external_task_id.is_some() && t.status == aicg_models::TransitionStatus::Processing)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(total: u32, success: u32, failed: u32, skipped: u32) -> StageCounts {
        StageCounts { total, success, failed, cancelled: 0, skipped }
    }

    #[test]
    fn clean_stage_releases_downstream() {
        assert!(stage_complete(&counts(3, 3, 0, 0), false));
        assert!(stage_complete(&counts(3, 0, 0, 3), false));
    }

    #[test]
    fn unsettled_stage_never_releases() {
        assert!(!stage_complete(&counts(3, 2, 0, 0), true));
    }

    #[test]
    fn partial_stage_needs_explicit_policy() {
        // 2 of 3 succeeded, 1 failed: downstream held back by default.
        assert!(!stage_complete(&counts(3, 2, 1, 0), false));
        assert!(stage_complete(&counts(3, 2, 1, 0), true));
    }

    #[test]
    fn zero_success_stage_never_releases() {
        assert!(!stage_complete(&counts(2, 0, 2, 0), false));
        assert!(!stage_complete(&counts(2, 0, 2, 0), true));
    }
}
