//! Namespace project binding under concurrent writers

use cloud_resource_controller::constants::PROJECT_ID_ANNOTATION;
use cloud_resource_controller::controller::guard::{ensure_namespace_project, GuardError, GuardPolicy};
use cloud_resource_controller::memory::InMemoryNamespaceStore;
use std::sync::Arc;
use std::time::Duration;

fn policy() -> GuardPolicy {
    GuardPolicy {
        max_attempts: 10,
        max_jitter: Duration::from_millis(1000),
    }
}

#[tokio::test(start_paused = true)]
async fn test_racing_writers_of_same_project_both_succeed() {
    let store = Arc::new(InMemoryNamespaceStore::new());
    store.create_namespace("team-a");
    store.synchronize_reads(2);
    let policy = policy();

    let (first, second) = tokio::join!(
        ensure_namespace_project(store.as_ref(), &policy, "team-a", "proj-123"),
        ensure_namespace_project(store.as_ref(), &policy, "team-a", "proj-123"),
    );

    first.unwrap();
    second.unwrap();
    assert_eq!(
        store.annotation("team-a", PROJECT_ID_ANNOTATION).as_deref(),
        Some("proj-123")
    );
    assert_eq!(store.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_racing_writers_of_different_projects_one_wins() {
    let store = Arc::new(InMemoryNamespaceStore::new());
    store.create_namespace("team-a");
    store.synchronize_reads(2);
    let policy = policy();

    let (first, second) = tokio::join!(
        ensure_namespace_project(store.as_ref(), &policy, "team-a", "proj-123"),
        ensure_namespace_project(store.as_ref(), &policy, "team-a", "proj-456"),
    );

    let winner = store.annotation("team-a", PROJECT_ID_ANNOTATION).unwrap();
    let (ok, conflict) = if winner == "proj-123" { (first, second) } else { (second, first) };
    ok.unwrap();
    match conflict.unwrap_err() {
        GuardError::SemanticConflict { existing, desired, .. } => {
            assert_eq!(existing, winner);
            assert_ne!(desired, winner);
        }
        other => panic!("expected a semantic conflict, got {other:?}"),
    }
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn test_bound_namespace_rejects_other_project_immediately() {
    let store = InMemoryNamespaceStore::new();
    store.set_annotation("team-a", PROJECT_ID_ANNOTATION, "proj-123");
    // Would exhaust the retry budget if the conflict were retried
    store.inject_conflicts(u32::MAX);

    let err = ensure_namespace_project(&store, &policy(), "team-a", "proj-456")
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("proj-123"), "{message}");
    assert!(message.contains("proj-456"), "{message}");
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_bound_namespace_accepts_same_project() {
    let store = InMemoryNamespaceStore::new();
    store.set_annotation("team-a", PROJECT_ID_ANNOTATION, "proj-123");

    ensure_namespace_project(&store, &policy(), "team-a", "proj-123")
        .await
        .unwrap();
    assert_eq!(store.write_count(), 0);
}
