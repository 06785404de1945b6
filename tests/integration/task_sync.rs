//! Integration tests for the tracked write paths.
//!
//! Drives task creation, update, and commenting through a full session
//! and watches the write ledger settle against live snapshots: pending on
//! dispatch, confirmed when the mirror catches up, failed when the
//! backend rejects, never retried.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use tasksync::query::TaskFilter;
use tasksync::session::{NewAccount, Session, SessionError};
use tasksync::store::{StoreError, StoreEvent, SyncConfig, WriteId, WriteState};
use tasksync_backend::{MemoryBackend, MemoryIdentity, RecordingSink};
use tasksync_model::{Priority, Role, TaskDraft, TaskId, TaskPatch, TaskStatus, UserId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

type DemoSession = Session<MemoryIdentity, MemoryBackend, RecordingSink>;
type Harness = (
    DemoSession,
    mpsc::Receiver<StoreEvent>,
    Arc<MemoryBackend>,
    Arc<RecordingSink>,
);

/// Signs a provider up on a fresh backend.
async fn provider_session() -> Harness {
    let identity = Arc::new(MemoryIdentity::new());
    let backend = Arc::new(MemoryBackend::new());
    let telemetry = Arc::new(RecordingSink::new());
    let (session, events) = Session::sign_up(
        identity,
        Arc::clone(&backend),
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        NewAccount {
            email: "priya@example.com",
            password: "hunter2",
            display_name: "Priya",
            role: Role::Provider,
        },
    )
    .await
    .expect("sign up");
    (session, events, backend, telemetry)
}

/// A draft authored by the session's viewer, assigned to `assignee`.
fn draft(session: &DemoSession, title: &str, assignee: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: "integration".to_string(),
        created_by: session.viewer().id.clone(),
        assigned_to: UserId::new(assignee),
        client_id: UserId::new(assignee),
        deadline: None,
        priority: Priority::Medium,
        status: TaskStatus::Pending,
    }
}

/// Polls `condition` until it holds or the deadline passes.
async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

/// Collects the state transitions of one write until it settles.
async fn settled_states(
    events: &mut mpsc::Receiver<StoreEvent>,
    write_id: &WriteId,
) -> Vec<WriteState> {
    let mut states = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for write state")
            .expect("event channel closed");
        if let StoreEvent::WriteStateChanged { write_id: id, state } = event
            && &id == write_id
        {
            let settled = !matches!(state, WriteState::Pending);
            states.push(state);
            if settled {
                return states;
            }
        }
    }
}

// ===========================================================================
// Create
// ===========================================================================

#[tokio::test]
async fn created_task_settles_and_carries_server_timestamps() {
    let (session, mut events, _backend, _telemetry) = provider_session().await;
    let store = Arc::clone(session.store());

    let (provisional, write_id) = store
        .create_task(draft(&session, "Descale tankless heater", "client-1"))
        .await
        .expect("create");

    // The provisional projection is usable immediately.
    assert_eq!(provisional.title, "Descale tankless heater");
    assert!(provisional.created_at.is_some());

    let states = settled_states(&mut events, &write_id).await;
    assert_eq!(states, vec![WriteState::Pending, WriteState::Confirmed]);

    let mirrored = store.task_by_id(&provisional.id).expect("mirrored");
    assert_eq!(mirrored.title, "Descale tankless heater");
    let created_at = mirrored.created_at.expect("server createdAt");
    let updated_at = mirrored.updated_at.expect("server updatedAt");
    assert!(updated_at >= created_at);
    assert_eq!(store.pending_write_count(), 0);
}

#[tokio::test]
async fn rejected_create_marks_the_ledger_failed() {
    let (session, mut events, backend, telemetry) = provider_session().await;
    let store = Arc::clone(session.store());
    backend.set_fail_writes(true);

    let err = store
        .create_task(draft(&session, "Doomed", "client-1"))
        .await
        .expect_err("rejected");
    assert!(matches!(err, StoreError::Write(_)));

    // The failure event names the write; the ledger keeps the reason.
    let failed_write = loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        if let StoreEvent::WriteStateChanged {
            write_id,
            state: WriteState::Failed(_),
        } = event
        {
            break write_id;
        }
    };
    assert!(matches!(
        store.write_state(&failed_write),
        Some(WriteState::Failed(_))
    ));
    assert!(store.last_error().is_some());

    // Nothing landed on either side, and nothing is retried once the
    // backend recovers.
    backend.set_fail_writes(false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.tasks_by_filter(&TaskFilter::default()).is_empty());
    assert!(
        !telemetry.names().iter().any(|n| n == "create_task"),
        "telemetry must not record a rejected create"
    );
}

#[tokio::test]
async fn validation_failures_never_reach_the_ledger() {
    let (session, _events, _backend, _telemetry) = provider_session().await;
    let store = Arc::clone(session.store());

    let mut bad = draft(&session, "x", "client-1");
    bad.title = " ".to_string();
    let err = store.create_task(bad).await.expect_err("invalid");
    assert!(matches!(err, StoreError::InvalidTask(_)));
    assert_eq!(store.pending_write_count(), 0);
}

// ===========================================================================
// Update
// ===========================================================================

#[tokio::test]
async fn updates_merge_into_the_mirror() {
    let (session, _events, _backend, _telemetry) = provider_session().await;
    let store = Arc::clone(session.store());

    let (created, _) = store
        .create_task(draft(&session, "Swap furnace filter", "client-1"))
        .await
        .expect("create");
    wait_until(|| store.task_by_id(&created.id).is_some()).await;

    let patch = TaskPatch {
        priority: Some(Priority::High),
        status: Some(TaskStatus::InProgress),
        ..TaskPatch::default()
    };
    let (projection, write_id) = store.update_task(&created.id, patch).await.expect("update");
    assert_eq!(projection.title, "Swap furnace filter");
    assert_eq!(projection.priority, Priority::High);

    wait_until(|| {
        store
            .task_by_id(&created.id)
            .is_some_and(|t| t.status == TaskStatus::InProgress)
    })
    .await;
    wait_until(|| store.write_state(&write_id) == Some(WriteState::Confirmed)).await;

    let mirrored = store.task_by_id(&created.id).expect("mirrored");
    assert_eq!(mirrored.priority, Priority::High);
    // Untouched fields survive the partial update.
    assert_eq!(mirrored.description, "integration");
}

#[tokio::test]
async fn updating_an_unknown_task_fails_without_retry() {
    let (session, _events, _backend, _telemetry) = provider_session().await;
    let store = Arc::clone(session.store());

    let ghost = TaskId::new("no-such-task");
    let err = store
        .update_task(&ghost, TaskPatch::default())
        .await
        .expect_err("missing");
    assert!(matches!(err, StoreError::Write(_)));
    assert_eq!(store.pending_write_count(), 0);
}

// ===========================================================================
// Comments and telemetry
// ===========================================================================

#[tokio::test]
async fn comments_settle_like_any_other_write() {
    let (session, _events, _backend, _telemetry) = provider_session().await;
    let store = Arc::clone(session.store());

    let (created, _) = store
        .create_task(draft(&session, "Bleed the radiators", "client-1"))
        .await
        .expect("create");
    let (comment, write_id) = store
        .add_comment(&created.id, &session.viewer().id, "Top floor first.")
        .await
        .expect("comment");

    wait_until(|| store.write_state(&write_id) == Some(WriteState::Confirmed)).await;
    let thread = store.comments_by_task(&created.id);
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].id, comment.id);
    assert_eq!(thread[0].text, "Top floor first.");
    assert!(thread[0].created_at.is_some(), "server stamped the comment");
}

#[tokio::test]
async fn telemetry_carries_the_acted_on_ids() {
    let (session, _events, _backend, telemetry) = provider_session().await;
    let store = Arc::clone(session.store());

    let (created, _) = store
        .create_task(draft(&session, "Patch drywall", "client-1"))
        .await
        .expect("create");
    let (comment, _) = store
        .add_comment(&created.id, &session.viewer().id, "Mud is drying.")
        .await
        .expect("comment");

    let recorded = telemetry.recorded();
    let create_event = recorded
        .iter()
        .find(|e| e.name == "create_task")
        .expect("create_task event");
    assert_eq!(
        create_event.properties.get("taskId").and_then(|v| v.as_str()),
        Some(created.id.as_str())
    );
    let comment_event = recorded
        .iter()
        .find(|e| e.name == "add_comment")
        .expect("add_comment event");
    assert_eq!(
        comment_event.properties.get("taskId").and_then(|v| v.as_str()),
        Some(created.id.as_str())
    );
    assert_eq!(
        comment_event
            .properties
            .get("commentId")
            .and_then(|v| v.as_str()),
        Some(comment.id.as_str())
    );
}

// ===========================================================================
// Two sessions, one backend
// ===========================================================================

#[tokio::test]
async fn a_second_session_sees_the_first_ones_writes() {
    let identity = Arc::new(MemoryIdentity::new());
    let backend = Arc::new(MemoryBackend::new());
    let telemetry = Arc::new(RecordingSink::new());

    let (provider, _provider_events) = Session::sign_up(
        Arc::clone(&identity),
        Arc::clone(&backend),
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        NewAccount {
            email: "priya@example.com",
            password: "hunter2",
            display_name: "Priya",
            role: Role::Provider,
        },
    )
    .await
    .expect("provider sign up");
    let (client, _client_events) = Session::sign_up(
        identity,
        Arc::clone(&backend),
        telemetry,
        &SyncConfig::default(),
        NewAccount {
            email: "marcus@example.com",
            password: "hunter2",
            display_name: "Marcus",
            role: Role::Client,
        },
    )
    .await
    .expect("client sign up");

    let assignment = TaskDraft {
        title: "Inspect sump pump".to_string(),
        description: "After the storm.".to_string(),
        created_by: provider.viewer().id.clone(),
        assigned_to: client.viewer().id.clone(),
        client_id: client.viewer().id.clone(),
        deadline: None,
        priority: Priority::High,
        status: TaskStatus::Pending,
    };
    provider
        .store()
        .create_task(assignment)
        .await
        .expect("create");

    // Both scopes contain the task: the provider created it, the client
    // is assigned to it.
    let provider_store = Arc::clone(provider.store());
    let client_store = Arc::clone(client.store());
    wait_until(|| provider_store.tasks_by_filter(&TaskFilter::default()).len() == 1).await;
    wait_until(|| client_store.tasks_by_filter(&TaskFilter::default()).len() == 1).await;

    let seen = client_store.tasks_by_filter(&TaskFilter::default());
    assert_eq!(seen[0].title, "Inspect sump pump");
}

// ===========================================================================
// Ledger bookkeeping
// ===========================================================================

#[tokio::test]
async fn unknown_writes_report_no_state() {
    let (session, _events, _backend, _telemetry) = provider_session().await;
    assert_eq!(session.store().write_state(&WriteId::new()), None);
}

#[tokio::test]
async fn session_errors_do_not_produce_a_store() {
    let identity = Arc::new(MemoryIdentity::new());
    let backend = Arc::new(MemoryBackend::new());
    let telemetry = Arc::new(RecordingSink::new());

    let err = Session::sign_in(
        identity,
        backend,
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        "nobody@example.com",
        "wrong",
    )
    .await
    .expect_err("no such account");
    assert!(matches!(err, SessionError::Auth(_)));
    assert!(telemetry.names().is_empty());
}
