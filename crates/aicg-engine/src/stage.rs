//! Per-project-type stage graphs.

use aicg_models::{ProjectKind, Stage, TaskKind};

/// One node of the production DAG.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub stage: Stage,
    /// Full upstream edges, used to compute the transitive stage set a
    /// job must run.
    pub deps: &'static [Stage],
    /// Edges that must be complete before this stage fans out. Usually
    /// identical to `deps`; keyframes fan out as soon as shots exist,
    /// with the character-avatar edge enforced per task at enqueue
    /// time (the fine-grained dependency).
    pub gate_deps: &'static [Stage],
    pub kind: TaskKind,
}

const MOVIE_STAGES: &[StageSpec] = &[
    StageSpec {
        stage: Stage::ExtractCharacters,
        deps: &[],
        gate_deps: &[],
        kind: TaskKind::Text,
    },
    StageSpec {
        stage: Stage::ExtractScenes,
        deps: &[Stage::ExtractCharacters],
        gate_deps: &[Stage::ExtractCharacters],
        kind: TaskKind::Text,
    },
    StageSpec {
        stage: Stage::ExtractShots,
        deps: &[Stage::ExtractScenes],
        gate_deps: &[Stage::ExtractScenes],
        kind: TaskKind::Text,
    },
    StageSpec {
        stage: Stage::GenerateSceneImages,
        deps: &[Stage::ExtractScenes],
        gate_deps: &[Stage::ExtractScenes],
        kind: TaskKind::Image,
    },
    StageSpec {
        stage: Stage::GenerateCharacterAvatars,
        deps: &[Stage::ExtractCharacters],
        gate_deps: &[Stage::ExtractCharacters],
        kind: TaskKind::Image,
    },
    StageSpec {
        stage: Stage::GenerateKeyframes,
        deps: &[Stage::ExtractShots, Stage::GenerateCharacterAvatars],
        gate_deps: &[Stage::ExtractShots],
        kind: TaskKind::Image,
    },
    StageSpec {
        stage: Stage::CreateTransitions,
        deps: &[Stage::ExtractShots, Stage::GenerateKeyframes],
        gate_deps: &[Stage::ExtractShots, Stage::GenerateKeyframes],
        kind: TaskKind::Text,
    },
    StageSpec {
        stage: Stage::GenerateTransitionVideos,
        deps: &[Stage::CreateTransitions],
        gate_deps: &[Stage::CreateTransitions],
        kind: TaskKind::VideoSubmit,
    },
    StageSpec {
        stage: Stage::ComposeVideo,
        deps: &[Stage::GenerateTransitionVideos],
        gate_deps: &[Stage::GenerateTransitionVideos],
        kind: TaskKind::Assembly,
    },
];

const NARRATIVE_STAGES: &[StageSpec] = &[
    StageSpec {
        stage: Stage::GenerateSentencePrompts,
        deps: &[],
        gate_deps: &[],
        kind: TaskKind::Text,
    },
    StageSpec {
        stage: Stage::GenerateSentenceImages,
        deps: &[Stage::GenerateSentencePrompts],
        gate_deps: &[Stage::GenerateSentencePrompts],
        kind: TaskKind::Image,
    },
    StageSpec {
        stage: Stage::SynthesizeSentenceAudio,
        deps: &[Stage::GenerateSentencePrompts],
        gate_deps: &[Stage::GenerateSentencePrompts],
        kind: TaskKind::Tts,
    },
    StageSpec {
        stage: Stage::ComposeVideo,
        deps: &[Stage::GenerateSentenceImages, Stage::SynthesizeSentenceAudio],
        gate_deps: &[Stage::GenerateSentenceImages, Stage::SynthesizeSentenceAudio],
        kind: TaskKind::Assembly,
    },
];

/// The ordered stage list for a project type.
pub fn stage_graph(kind: ProjectKind) -> &'static [StageSpec] {
    match kind {
        ProjectKind::Movie => MOVIE_STAGES,
        ProjectKind::Narrative => NARRATIVE_STAGES,
    }
}

/// Look up a stage's spec within a graph.
pub fn spec_for(kind: ProjectKind, stage: Stage) -> Option<&'static StageSpec> {
    stage_graph(kind).iter().find(|s| s.stage == stage)
}

/// The transitive set of stages that must run to reach `target`,
/// in graph order.
pub fn required_stages(kind: ProjectKind, target: Stage) -> Vec<Stage> {
    let graph = stage_graph(kind);
    let mut required: Vec<Stage> = Vec::new();
    let mut pending = vec![target];

    while let Some(stage) = pending.pop() {
        if required.contains(&stage) {
            continue;
        }
        let Some(spec) = graph.iter().find(|s| s.stage == stage) else {
            continue;
        };
        required.push(stage);
        pending.extend(spec.deps.iter().copied());
    }

    // Report in graph order for deterministic materialization.
    graph
        .iter()
        .map(|s| s.stage)
        .filter(|s| required.contains(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movie_compose_requires_every_stage() {
        let stages = required_stages(ProjectKind::Movie, Stage::ComposeVideo);
        assert_eq!(stages.len(), MOVIE_STAGES.len());
        assert_eq!(stages[0], Stage::ExtractCharacters);
        assert_eq!(*stages.last().unwrap(), Stage::ComposeVideo);
    }

    #[test]
    fn partial_target_prunes_downstream() {
        let stages = required_stages(ProjectKind::Movie, Stage::GenerateKeyframes);
        assert!(stages.contains(&Stage::ExtractShots));
        assert!(stages.contains(&Stage::GenerateCharacterAvatars));
        assert!(!stages.contains(&Stage::CreateTransitions));
        assert!(!stages.contains(&Stage::ComposeVideo));
    }

    #[test]
    fn scene_images_do_not_require_shots() {
        let stages = required_stages(ProjectKind::Movie, Stage::GenerateSceneImages);
        assert!(stages.contains(&Stage::ExtractScenes));
        assert!(!stages.contains(&Stage::ExtractShots));
    }

    #[test]
    fn keyframes_fan_out_before_avatars_finish() {
        let spec = spec_for(ProjectKind::Movie, Stage::GenerateKeyframes).unwrap();
        assert!(spec.deps.contains(&Stage::GenerateCharacterAvatars));
        assert!(!spec.gate_deps.contains(&Stage::GenerateCharacterAvatars));
    }

    #[test]
    fn graphs_are_topologically_ordered() {
        for kind in [ProjectKind::Movie, ProjectKind::Narrative] {
            let graph = stage_graph(kind);
            for (i, spec) in graph.iter().enumerate() {
                for dep in spec.deps {
                    let dep_pos = graph.iter().position(|s| s.stage == *dep).unwrap();
                    assert!(dep_pos < i, "{dep:?} must precede {:?}", spec.stage);
                }
            }
        }
    }
}
