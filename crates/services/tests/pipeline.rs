use std::sync::Arc;
use std::time::Duration;

use buds_core::model::{
    ChildId, EndTrigger, ModuleId, ParentId, ProgressKey, Score, SyncTable,
};
use buds_core::time::fixed_clock;
use services::{
    AppServices, GameResult, PipelineConfig, ProgressError, SaveOutcome, SessionContext,
};
use storage::remote::{DocumentStore, InMemoryDocumentStore, collections};
use storage::repository::{ProgressCacheRepository, Storage, SyncQueueRepository};
use tokio::sync::watch;

fn parent() -> ParentId {
    ParentId::new("parent-1").unwrap()
}

fn child() -> ChildId {
    ChildId::for_slot(&parent(), 1).unwrap()
}

fn ctx() -> SessionContext {
    SessionContext::new(parent(), child())
}

fn later(ms: i64) -> services::Clock {
    let mut clock = fixed_clock();
    clock.advance(chrono::Duration::milliseconds(ms));
    clock
}

struct Harness {
    store: InMemoryDocumentStore,
    storage: Storage,
    app: AppServices,
}

fn harness(config: PipelineConfig) -> Harness {
    let store = InMemoryDocumentStore::new();
    let storage = Storage::in_memory();
    let app = AppServices::new(fixed_clock(), &storage, Arc::new(store.clone()), config);
    Harness {
        store,
        storage,
        app,
    }
}

#[tokio::test]
async fn lifecycle_callbacks_write_exactly_once() {
    let h = harness(PipelineConfig::default());
    let mut tracker = h.app.tracker(ctx(), ModuleId::MemoryMatch);
    tracker.start();
    tracker.record_hit();
    tracker.record_hit();

    let mut results = Vec::new();
    for trigger in [EndTrigger::Pause, EndTrigger::Destroy, EndTrigger::ExitButton] {
        results.push(tracker.end(trigger).await.unwrap());
    }
    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(results[0].as_ref().unwrap().outcome.trigger, EndTrigger::Pause);

    let key = ProgressKey::new(child(), ModuleId::MemoryMatch);
    let summary = h.app.sync().fetch_summary(&key).await.unwrap().unwrap();
    assert_eq!(summary.plays, 1);
    assert_eq!(summary.score.value(), 20);
}

#[tokio::test]
async fn eight_of_ten_in_45_seconds_scores_80_and_completes() {
    let h = harness(PipelineConfig::default());
    let mut tracker = h.app.tracker(ctx(), ModuleId::WordBuilder);
    tracker.start();
    for i in 0..10 {
        tracker.record_word(i % 2 == 0, i < 8);
    }
    tracker.set_clock(later(45_000));

    let ended = tracker.end(EndTrigger::Finished).await.unwrap().unwrap();
    assert_eq!(ended.saved, SaveOutcome::Synced);
    assert_eq!(ended.outcome.scored.score.value(), 80);
    assert_eq!(ended.outcome.scored.stars, 2);

    let doc = h
        .store
        .get(collections::CHILD_PROGRESS, &format!("{}_word_builder", child()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc.get_u64("score"), Some(80));
    assert_eq!(doc.get_bool("completionStatus"), Some(true));
    assert_eq!(doc.get_str("status"), Some("completed"));
    assert_eq!(doc.get_u64("timeSpent"), Some(45_000));
    assert_eq!(doc.get_u64("correct"), Some(8));
    assert_eq!(doc.get_u64("incorrect"), Some(2));
}

#[tokio::test]
async fn every_call_path_converges_on_one_document_per_key() {
    let h = harness(PipelineConfig::default());
    let progress = h.app.progress();
    let result = GameResult {
        score: Score::new(50),
        time_spent_ms: 10_000,
        stars: 5,
        correct: 5,
        incorrect: 0,
    };
    progress
        .record_game_session(&ctx(), ModuleId::FeedMonster, result)
        .await
        .unwrap();
    progress
        .mark_module_completed(&ctx(), ModuleId::FeedMonster, Score::new(90))
        .await
        .unwrap();
    progress
        .set_completion_percentage(&ctx(), ModuleId::FeedMonster, 100)
        .await
        .unwrap();
    progress
        .record_game_session(&ctx(), ModuleId::FeedMonster, result)
        .await
        .unwrap();

    assert_eq!(h.store.len(collections::CHILD_PROGRESS), 1);
    let key = ProgressKey::new(child(), ModuleId::FeedMonster);
    let summary = h.app.sync().fetch_summary(&key).await.unwrap().unwrap();
    assert_eq!(summary.plays, 2);
    assert_eq!(summary.total_time_ms, 20_000);
}

#[tokio::test]
async fn offline_sessions_are_drained_once_the_store_returns() {
    let h = harness(PipelineConfig::default());
    h.store.set_offline(true);
    for module in [ModuleId::AbcSong, ModuleId::NumbersSong] {
        let outcome = h
            .app
            .progress()
            .log_video_play(&ctx(), module, Score::new(100), 90_000, 1, true)
            .await
            .unwrap();
        assert_eq!(outcome, SaveOutcome::SavedLocally);
    }
    assert_eq!(h.storage.progress.unsynced_progress().await.unwrap().len(), 2);

    let report = h.app.drain().drain_once(10).await.unwrap();
    assert_eq!(report.pushed, 0);
    assert_eq!(report.failed, 1);

    h.store.set_offline(false);
    let report = h.app.drain().drain_once(10).await.unwrap();
    assert_eq!(report.pushed, 2);
    assert!(h.storage.progress.unsynced_progress().await.unwrap().is_empty());
    assert!(h.storage.sync_queue.pending(10).await.unwrap().is_empty());

    let profile = h
        .store
        .get(collections::CHILD_PROFILES, child().as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.get_u64("completedModules"), Some(2));
    assert_eq!(profile.get_u64("progress"), Some(29));
    assert_eq!(profile.get_u64("stars"), Some(1));

    let key = ProgressKey::new(child(), ModuleId::AbcSong);
    let song = h.app.sync().fetch_summary(&key).await.unwrap().unwrap();
    assert_eq!(song.plays, 1);
    assert_eq!(song.total_time_ms, 90_000);

    let idle = h.app.drain().drain_once(10).await.unwrap();
    assert!(idle.is_idle());
}

#[tokio::test]
async fn offline_game_counts_survive_the_drain() {
    let h = harness(PipelineConfig::default());
    h.store.set_offline(true);
    let result = GameResult {
        score: Score::new(80),
        time_spent_ms: 45_000,
        stars: 2,
        correct: 8,
        incorrect: 2,
    };
    h.app
        .progress()
        .record_game_session(&ctx(), ModuleId::FeedMonster, result)
        .await
        .unwrap();

    h.store.set_offline(false);
    h.app.drain().drain_once(10).await.unwrap();
    // A second pass must not push the same play again.
    h.app.drain().drain_once(10).await.unwrap();

    let key = ProgressKey::new(child(), ModuleId::FeedMonster);
    let summary = h.app.sync().fetch_summary(&key).await.unwrap().unwrap();
    assert_eq!(summary.plays, 1);
    assert_eq!(summary.total_time_ms, 45_000);
    assert_eq!((summary.correct, summary.incorrect), (8, 2));
}

#[tokio::test]
async fn long_outage_keeps_one_queue_item_per_record() {
    let config = PipelineConfig::default();
    let passes = config.max_sync_attempts + 3;
    let h = harness(config);
    h.store.set_offline(true);
    h.app
        .progress()
        .log_video_play(&ctx(), ModuleId::ShapesSong, Score::new(100), 30_000, 1, true)
        .await
        .unwrap();

    for _ in 0..passes {
        let report = h.app.drain().drain_once(10).await.unwrap();
        assert_eq!(report.failed, 1);
    }
    // Parked after max attempts, never duplicated.
    assert!(h.storage.sync_queue.pending(10).await.unwrap().is_empty());
    let key = ProgressKey::new(child(), ModuleId::ShapesSong);
    let live = h
        .storage
        .sync_queue
        .clear_record(SyncTable::ChildProgress, &key.to_string())
        .await
        .unwrap();
    assert_eq!(live, 1);

    // The cached row is still pushed once the store is back.
    h.store.set_offline(false);
    let report = h.app.drain().drain_once(10).await.unwrap();
    assert_eq!(report.pushed, 1);
    let summary = h.app.sync().fetch_summary(&key).await.unwrap().unwrap();
    assert_eq!(summary.plays, 1);
    assert_eq!(summary.total_time_ms, 30_000);
}

#[tokio::test]
async fn missing_identifiers_are_rejected_before_any_write() {
    let h = harness(PipelineConfig::default());
    let anonymous = SessionContext {
        parent_id: None,
        child_id: Some(child()),
    };
    let err = h
        .app
        .progress()
        .mark_module_completed(&anonymous, ModuleId::MatchLetter, Score::new(80))
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressError::NotAuthenticated));

    let no_child = SessionContext {
        parent_id: Some(parent()),
        child_id: None,
    };
    let err = h
        .app
        .progress()
        .set_completion_percentage(&no_child, ModuleId::FamilyModule, 100)
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressError::MissingIdentifier(_)));

    assert_eq!(h.store.write_count(), 0);
    assert!(h.storage.progress.unsynced_progress().await.unwrap().is_empty());
}

#[tokio::test]
async fn worker_drains_until_shutdown() {
    let config = PipelineConfig {
        sync_interval: Duration::from_millis(10),
        ..PipelineConfig::default()
    };
    let h = harness(config);
    h.store.set_offline(true);
    h.app
        .progress()
        .log_video_play(&ctx(), ModuleId::ShapesSong, Score::new(100), 60_000, 1, true)
        .await
        .unwrap();
    h.store.set_offline(false);

    let (tx, rx) = watch::channel(false);
    let handle = h.app.spawn_sync_worker(rx);
    for _ in 0..100 {
        if h.storage.progress.unsynced_progress().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.storage.progress.unsynced_progress().await.unwrap().is_empty());

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker stops")
        .unwrap();
}

#[tokio::test]
async fn sqlite_backed_services_report_recorded_sessions() {
    let storage = Storage::sqlite("sqlite:file:memdb_pipeline_report?mode=memory&cache=shared")
        .await
        .unwrap();
    let app = AppServices::new(
        fixed_clock(),
        &storage,
        Arc::new(InMemoryDocumentStore::new()),
        PipelineConfig::default(),
    );

    let slots = app.children().ensure_default_slots(&parent()).await.unwrap();
    assert_eq!(slots.len(), 5);

    let mut tracker = app.tracker(ctx(), ModuleId::MatchLetter);
    tracker.start();
    for hit in [true, true, false, true] {
        if hit {
            tracker.record_hit();
        } else {
            tracker.record_miss();
        }
    }
    tracker.set_clock(later(20_000));
    tracker.end(EndTrigger::ExitButton).await.unwrap().unwrap();

    let report = app.reports().child_report(&child()).await.unwrap();
    assert_eq!(report.modules.len(), 1);
    assert_eq!(report.modules[0].best_score, 30);
    assert!((report.overall_accuracy - 0.75).abs() < 1e-9);

    let overview = app.reports().parent_overview(&parent()).await.unwrap();
    assert_eq!(overview.children.len(), 5);
    assert_eq!(overview.children[0].plays, 1);
}

#[tokio::test]
async fn without_a_remote_sessions_stay_queued_locally() {
    let app = AppServices::new_sqlite(
        "sqlite:file:memdb_pipeline_local_only?mode=memory&cache=shared",
        None,
        fixed_clock(),
        PipelineConfig::default(),
    )
    .await
    .unwrap();

    let saved = app
        .progress()
        .mark_module_completed(&ctx(), ModuleId::MatchLetter, Score::new(80))
        .await
        .unwrap();
    assert_eq!(saved, SaveOutcome::SavedLocally);

    let report = app.drain().drain_once(10).await.unwrap();
    assert_eq!(report.pushed, 0);
    assert_eq!(report.failed, 1);
}
