//! Postgres repository integration tests.
//!
//! Run against a disposable database:
//! `DATABASE_URL=postgres://localhost/aicg_test cargo test -- --ignored`

use chrono::Utc;

use aicg_db::{
    ChapterRepo, CharacterRepo, DbError, DbPool, GenerationMeta, HistoryRepo, JobRepo,
    ProjectRepo, SceneRepo, ScriptRepo, ShotRepo, TaskRepo,
};
use aicg_models::{
    ApiKeyId, Chapter, ChapterId, Character, CharacterId, ErrorKind, Job, PipelineStatus, Project,
    ProjectId, ProjectKind, ResourceType, Scene, SceneId, Script, ScriptId, Shot, ShotId, Stage,
    Task, TaskPayload,
};

async fn pool() -> DbPool {
    dotenvy::dotenv().ok();
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
    let pool = aicg_db::create_pool(&url).await.expect("connect");
    aicg_db::migrate(&pool).await.expect("migrate");
    pool
}

async fn seed_chapter(pool: &DbPool, kind: ProjectKind) -> (Project, Chapter) {
    let project = Project {
        id: ProjectId::new(),
        owner_id: "test-user".into(),
        name: "test project".into(),
        kind,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    ProjectRepo::create(pool, &project).await.expect("create project");

    let chapter = Chapter {
        id: ChapterId::new(),
        project_id: project.id.clone(),
        title: "chapter one".into(),
        content: "Scene1: Alice enters the room. Scene2: Alice sits.".into(),
        chapter_number: 1,
        pipeline_status: PipelineStatus::Draft,
        video_url: None,
        video_duration_secs: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    ChapterRepo::create(pool, &chapter).await.expect("create chapter");
    (project, chapter)
}

async fn seed_shot(pool: &DbPool, chapter: &Chapter) -> Shot {
    let script = Script {
        id: ScriptId::new(),
        chapter_id: chapter.id.clone(),
        status: Default::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    ScriptRepo::create(pool, &script).await.expect("create script");

    let scene = Scene {
        id: SceneId::new(),
        script_id: script.id.clone(),
        order_index: 1,
        location: None,
        time_of_day: None,
        atmosphere: None,
        description: Some("a room".into()),
        scene_image_url: None,
        scene_image_prompt: None,
        version: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    SceneRepo::create_many(pool, std::slice::from_ref(&scene))
        .await
        .expect("create scene");

    let shot = Shot {
        id: ShotId::new(),
        scene_id: scene.id,
        order_index: 1,
        visual_description: "Alice enters".into(),
        camera_movement: None,
        dialogue: None,
        character_refs: vec![],
        keyframe_url: None,
        keyframe_prompt: None,
        error_message: None,
        version: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    ShotRepo::create_many(pool, std::slice::from_ref(&shot))
        .await
        .expect("create shot");
    shot
}

/// History invariant: first write leaves no history, every rewrite
/// appends exactly one row, and select-history pushes the live URL
/// back (Scenario F).
#[tokio::test]
#[ignore = "requires Postgres"]
async fn keyframe_history_rewrite_and_select() {
    let pool = pool().await;
    let (_, chapter) = seed_chapter(&pool, ProjectKind::Movie).await;
    let shot = seed_shot(&pool, &chapter).await;
    let meta = GenerationMeta {
        prompt: Some("prompt v1".into()),
        model: Some("img-model".into()),
        api_key_id: None,
    };

    // v1: no prior URL, so no history row.
    ShotRepo::record_keyframe(&pool, &shot.id, "p/keyframes/v1.png", &meta)
        .await
        .expect("record v1");
    let count = HistoryRepo::count(&pool, ResourceType::ShotKeyframe, shot.id.as_str())
        .await
        .expect("count");
    assert_eq!(count, 0);

    // v2: v1 moves into history.
    ShotRepo::record_keyframe(&pool, &shot.id, "p/keyframes/v2.png", &meta)
        .await
        .expect("record v2");
    let entries = HistoryRepo::list(&pool, ResourceType::ShotKeyframe, shot.id.as_str())
        .await
        .expect("list");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].result_url, "p/keyframes/v1.png");

    let current = ShotRepo::get(&pool, &shot.id).await.expect("get shot");
    assert_eq!(current.keyframe_url.as_deref(), Some("p/keyframes/v2.png"));
    let version_after_two_writes = current.version;

    // Select v1: current becomes v1, v2 is pushed back, count = 2.
    let v1_entry = entries[0].id.clone();
    let live = ShotRepo::select_keyframe_history(&pool, &shot.id, &v1_entry)
        .await
        .expect("select history");
    assert_eq!(live, "p/keyframes/v1.png");

    let count = HistoryRepo::count(&pool, ResourceType::ShotKeyframe, shot.id.as_str())
        .await
        .expect("count");
    assert_eq!(count, 2);

    let current = ShotRepo::get(&pool, &shot.id).await.expect("get shot");
    assert_eq!(current.keyframe_url.as_deref(), Some("p/keyframes/v1.png"));
    assert!(current.version > version_after_two_writes);
}

/// Selecting an entry that already matches the live URL leaves the
/// current URL unchanged and appends nothing.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn select_history_is_idempotent_for_identical_content() {
    let pool = pool().await;
    let (_, chapter) = seed_chapter(&pool, ProjectKind::Movie).await;
    let shot = seed_shot(&pool, &chapter).await;
    let meta = GenerationMeta::default();

    ShotRepo::record_keyframe(&pool, &shot.id, "p/k/a.png", &meta).await.expect("v1");
    ShotRepo::record_keyframe(&pool, &shot.id, "p/k/b.png", &meta).await.expect("v2");

    let entries = HistoryRepo::list(&pool, ResourceType::ShotKeyframe, shot.id.as_str())
        .await
        .expect("list");
    let a_entry = entries[0].id.clone();

    ShotRepo::select_keyframe_history(&pool, &shot.id, &a_entry).await.expect("select a");
    let count_after_first = HistoryRepo::count(&pool, ResourceType::ShotKeyframe, shot.id.as_str())
        .await
        .expect("count");

    // Re-selecting the same entry: live URL already equals it.
    ShotRepo::select_keyframe_history(&pool, &shot.id, &a_entry).await.expect("select a again");
    let count_after_second = HistoryRepo::count(&pool, ResourceType::ShotKeyframe, shot.id.as_str())
        .await
        .expect("count");

    assert_eq!(count_after_first, count_after_second);
    let current = ShotRepo::get(&pool, &shot.id).await.expect("get");
    assert_eq!(current.keyframe_url.as_deref(), Some("p/k/a.png"));
}

/// Character names are unique per project, exact-string.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn duplicate_character_name_conflicts() {
    let pool = pool().await;
    let (project, _) = seed_chapter(&pool, ProjectKind::Movie).await;

    let character = |name: &str| Character {
        id: CharacterId::new(),
        project_id: project.id.clone(),
        name: name.into(),
        role_description: None,
        visual_traits: None,
        key_visual_traits: None,
        avatar_url: None,
        generated_prompt: None,
        version: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    CharacterRepo::create(&pool, &character("Alice")).await.expect("first");
    match CharacterRepo::create(&pool, &character("Alice")).await {
        Err(DbError::Conflict(_)) => {}
        other => panic!("expected conflict, got {other:?}"),
    }
    // Different case is a different character.
    CharacterRepo::create(&pool, &character("alice")).await.expect("case-sensitive");

    assert!(CharacterRepo::find_by_name(&pool, &project.id, "Alice")
        .await
        .expect("lookup")
        .is_some());
    assert!(CharacterRepo::find_by_name(&pool, &project.id, "ALICE")
        .await
        .expect("lookup")
        .is_none());
}

/// Chapter status only moves forward.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn chapter_status_is_monotonic() {
    let pool = pool().await;
    let (_, chapter) = seed_chapter(&pool, ProjectKind::Movie).await;

    ChapterRepo::advance_status(&pool, &chapter.id, PipelineStatus::Parsed)
        .await
        .expect("forward");
    ChapterRepo::advance_status(&pool, &chapter.id, PipelineStatus::MaterialsPrepared)
        .await
        .expect("skip ahead");

    match ChapterRepo::advance_status(&pool, &chapter.id, PipelineStatus::Parsed).await {
        Err(DbError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }

    // Explicit admin reset is the only way back.
    ChapterRepo::admin_reset(&pool, &chapter.id).await.expect("reset");
    let chapter = ChapterRepo::get(&pool, &chapter.id).await.expect("get");
    assert_eq!(chapter.pipeline_status, PipelineStatus::Draft);
}

/// A task can be claimed exactly once, and cancellation blocks claims.
#[tokio::test]
#[ignore = "requires Postgres"]
async fn task_claim_and_cancel() {
    let pool = pool().await;
    let (_, chapter) = seed_chapter(&pool, ProjectKind::Movie).await;

    let job = Job::new("u", chapter.id.clone(), Stage::ExtractCharacters, ApiKeyId::new());
    JobRepo::create(&pool, &job).await.expect("create job");

    let task = Task::new(
        job.id.clone(),
        TaskPayload::ExtractCharacters { chapter_id: chapter.id.clone() },
    );
    let pending = Task::new(
        job.id.clone(),
        TaskPayload::ExtractScenes { chapter_id: chapter.id.clone() },
    );
    TaskRepo::create_many(&pool, &[task.clone(), pending.clone()])
        .await
        .expect("create tasks");

    let claimed = TaskRepo::claim(&pool, &task.id).await.expect("claim");
    assert!(claimed.is_some());
    // Second claim loses.
    assert!(TaskRepo::claim(&pool, &task.id).await.expect("reclaim").is_none());

    TaskRepo::mark_failed(&pool, &task.id, ErrorKind::Provider, "boom")
        .await
        .expect("fail");
    JobRepo::record_task_outcome(&pool, &job.id, false).await.expect("outcome");

    let job = JobRepo::get(&pool, &job.id).await.expect("get job");
    assert_eq!(job.statistics.failed, 1);

    // Cancellation flags every live task; terminal ones are left be.
    assert!(JobRepo::request_cancel(&pool, &job.id).await.expect("cancel"));
    assert!(TaskRepo::is_cancel_requested(&pool, &pending.id).await.expect("flag"));
    assert!(TaskRepo::claim(&pool, &pending.id).await.expect("claim cancelled").is_none());
}
