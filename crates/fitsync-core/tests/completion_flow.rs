//! End-to-end completion flow through an assembled engine.

mod common;

use common::FakeRemote;
use fitsync_core::{
    CompletionKey, CompletionRequest, MemoryStore, SessionState, SyncEngine,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;

fn engine_with(remote: Arc<FakeRemote>) -> SyncEngine {
    SyncEngine::new(Arc::new(MemoryStore::new()), remote)
}

#[tokio::test]
async fn test_bench_press_end_to_end() {
    let remote = Arc::new(FakeRemote::new());
    let engine = engine_with(remote.clone());
    let key = CompletionKey::new("u1", "bench-press");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let seen = seen.clone();
        engine
            .hub
            .subscribe(key, move |update| seen.lock().push(update.clone()))
    };

    let request = CompletionRequest::new("u1", "bench-press", "Bench Press", 1, 4, 10)
        .with_weight_kg(40.0);

    // First completion succeeds and lands as exactly one record.
    let update = engine.tracker.complete(request.clone()).await.unwrap();
    assert_eq!(update.completed_sets, BTreeSet::from([1]));
    assert!(!update.is_complete);
    assert_eq!(remote.documents_in("workout_completions").len(), 1);

    // Identical same-day call: still success, still one record.
    let update = engine.tracker.complete(request).await.unwrap();
    assert_eq!(update.completed_sets, BTreeSet::from([1]));
    assert_eq!(remote.documents_in("workout_completions").len(), 1);

    // Both publishes reached the observer, in order.
    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].completed_sets, BTreeSet::from([1]));
    assert_eq!(seen[1].completed_sets, BTreeSet::from([1]));
}

#[tokio::test]
async fn test_full_session_and_removal() {
    let remote = Arc::new(FakeRemote::new());
    let engine = engine_with(remote.clone());

    for set in 1..=4 {
        let request = CompletionRequest::new("u1", "bench-press", "Bench Press", set, 4, 10)
            .with_weight_kg(40.0)
            .with_rest_label("90s");
        engine.tracker.complete(request).await.unwrap();
    }

    assert!(matches!(
        engine.tracker.session_state("u1", "bench-press"),
        SessionState::Complete(_)
    ));
    assert_eq!(remote.documents_in("workout_completions").len(), 4);

    // Undoing one set reopens the session.
    let update = engine
        .tracker
        .remove_completion("u1", "bench-press", 4)
        .await
        .unwrap();
    assert_eq!(update.completed_sets, BTreeSet::from([1, 2, 3]));
    assert!(!update.is_complete);
    assert!(matches!(
        engine.tracker.session_state("u1", "bench-press"),
        SessionState::Active(_)
    ));
    assert_eq!(remote.documents_in("workout_completions").len(), 3);
}

#[tokio::test]
async fn test_completed_today_reflects_remote_truth() {
    let remote = Arc::new(FakeRemote::new());
    let engine = engine_with(remote.clone());

    engine
        .tracker
        .complete(CompletionRequest::new(
            "u1", "squat", "Back Squat", 1, 5, 5,
        ))
        .await
        .unwrap();
    engine
        .tracker
        .complete(CompletionRequest::new(
            "u1", "squat", "Back Squat", 3, 5, 5,
        ))
        .await
        .unwrap();

    let today = engine.tracker.completed_today("u1", "squat").await.unwrap();
    assert_eq!(today, BTreeSet::from([1, 3]));

    // Another user's sets stay invisible.
    let other = engine.tracker.completed_today("u2", "squat").await.unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn test_users_and_exercises_are_isolated() {
    let remote = Arc::new(FakeRemote::new());
    let engine = engine_with(remote.clone());

    let bench_seen = Arc::new(Mutex::new(0usize));
    let _sub = {
        let seen = bench_seen.clone();
        engine.hub.subscribe(
            CompletionKey::new("u1", "bench-press"),
            move |_| *seen.lock() += 1,
        )
    };

    engine
        .tracker
        .complete(CompletionRequest::new("u1", "squat", "Back Squat", 1, 5, 5))
        .await
        .unwrap();
    engine
        .tracker
        .complete(CompletionRequest::new(
            "u2",
            "bench-press",
            "Bench Press",
            1,
            4,
            10,
        ))
        .await
        .unwrap();

    // Neither publish was for (u1, bench-press).
    assert_eq!(*bench_seen.lock(), 0);
    assert_eq!(remote.documents_in("workout_completions").len(), 2);
}
