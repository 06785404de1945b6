//! Integration tests for session establishment and teardown.
//!
//! Exercises sign-up and sign-in against the in-memory identity
//! provider, profile role resolution, the telemetry trail, and the
//! subscription pumps a session keeps running until sign-out.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use tasksync::query::TaskFilter;
use tasksync::session::{NewAccount, Session, SessionError, USERS_COLLECTION};
use tasksync::store::{StoreEvent, SyncConfig, TASKS_COLLECTION};
use tasksync_backend::{
    DocumentStore, FieldValue, Fields, IdentityProvider, MemoryBackend, MemoryIdentity,
    RecordingSink, SessionState,
};
use tasksync_model::Role;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

type Services = (Arc<MemoryIdentity>, Arc<MemoryBackend>, Arc<RecordingSink>);

fn services() -> Services {
    (
        Arc::new(MemoryIdentity::new()),
        Arc::new(MemoryBackend::new()),
        Arc::new(RecordingSink::new()),
    )
}

fn provider_account() -> NewAccount<'static> {
    NewAccount {
        email: "priya@example.com",
        password: "hunter2",
        display_name: "Priya",
        role: Role::Provider,
    }
}

/// Receives store events until one matches, failing the test if none
/// arrives in time.
async fn wait_for_event<F>(events: &mut mpsc::Receiver<StoreEvent>, mut pred: F) -> StoreEvent
where
    F: FnMut(&StoreEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for store event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

/// Polls until a condition holds, failing the test if it never does.
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

/// A task document as some other writer would have stored it.
fn seeded_task_fields(title: &str, created_by: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("title".to_string(), FieldValue::text(title));
    fields.insert("description".to_string(), FieldValue::text("pre-seeded"));
    fields.insert("createdBy".to_string(), FieldValue::text(created_by));
    fields.insert("assignedTo".to_string(), FieldValue::text("someone"));
    fields.insert("clientId".to_string(), FieldValue::text("someone"));
    fields.insert("priority".to_string(), FieldValue::text("medium"));
    fields.insert("status".to_string(), FieldValue::text("pending"));
    fields.insert("createdAt".to_string(), FieldValue::ServerTimestamp);
    fields.insert("updatedAt".to_string(), FieldValue::ServerTimestamp);
    fields
}

// ===========================================================================
// Sign-up and sign-in
// ===========================================================================

#[tokio::test]
async fn sign_up_then_sign_in_preserves_the_profile_role() {
    let (identity, backend, telemetry) = services();

    let (session, _events) = Session::sign_up(
        Arc::clone(&identity),
        Arc::clone(&backend),
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        provider_account(),
    )
    .await
    .expect("sign up");
    let user_id = session.viewer().id.clone();
    session.sign_out().await;

    let (session, _events) = Session::sign_in(
        identity,
        backend,
        telemetry,
        &SyncConfig::default(),
        "priya@example.com",
        "hunter2",
    )
    .await
    .expect("sign in");

    assert_eq!(session.viewer().id, user_id);
    assert_eq!(session.viewer().role, Role::Provider);
    assert_eq!(session.viewer().name, "Priya");
}

#[tokio::test]
async fn sign_in_with_wrong_password_is_rejected() {
    let (identity, backend, telemetry) = services();
    identity
        .sign_up("priya@example.com", "hunter2", "Priya")
        .await
        .expect("register");
    identity.sign_out().await;

    let err = Session::sign_in(
        identity,
        backend,
        telemetry,
        &SyncConfig::default(),
        "priya@example.com",
        "not-the-password",
    )
    .await
    .expect_err("rejected");
    assert!(matches!(err, SessionError::Auth(_)));
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let (identity, backend, telemetry) = services();

    let (first, _events) = Session::sign_up(
        Arc::clone(&identity),
        Arc::clone(&backend),
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        provider_account(),
    )
    .await
    .expect("first registration");
    first.sign_out().await;

    let err = Session::sign_up(
        identity,
        backend,
        telemetry,
        &SyncConfig::default(),
        provider_account(),
    )
    .await
    .expect_err("second registration");
    assert!(matches!(err, SessionError::Auth(_)));
}

#[tokio::test]
async fn missing_profile_defaults_to_the_client_role() {
    let (identity, backend, telemetry) = services();
    // Registered directly with the identity provider, so no profile
    // document exists.
    identity
        .sign_up("ghost@example.com", "hunter2", "Ghost")
        .await
        .expect("register");
    identity.sign_out().await;

    let (session, _events) = Session::sign_in(
        identity,
        Arc::clone(&backend),
        telemetry,
        &SyncConfig::default(),
        "ghost@example.com",
        "hunter2",
    )
    .await
    .expect("sign in");

    assert_eq!(session.viewer().role, Role::Client);
    assert!(
        backend
            .get(USERS_COLLECTION, session.viewer().id.as_str())
            .await
            .expect("get")
            .is_none()
    );
}

#[tokio::test]
async fn telemetry_records_the_auth_trail() {
    let (identity, backend, telemetry) = services();

    let (session, _events) = Session::sign_up(
        Arc::clone(&identity),
        Arc::clone(&backend),
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        provider_account(),
    )
    .await
    .expect("sign up");
    session.sign_out().await;

    let (session, _events) = Session::sign_in(
        identity,
        backend,
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        "priya@example.com",
        "hunter2",
    )
    .await
    .expect("sign in");
    drop(session);

    assert_eq!(telemetry.names(), vec!["sign_up", "logout", "login"]);
}

// ===========================================================================
// Pumps and live data
// ===========================================================================

#[tokio::test]
async fn session_mirrors_documents_that_existed_before_sign_in() {
    let (identity, backend, telemetry) = services();

    let (session, _events) = Session::sign_up(
        Arc::clone(&identity),
        Arc::clone(&backend),
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        provider_account(),
    )
    .await
    .expect("sign up");
    let user_id = session.viewer().id.clone();
    session.sign_out().await;

    // Another device writes a task while nobody is signed in here.
    backend
        .add(
            TASKS_COLLECTION,
            seeded_task_fields("Grease the garage door", user_id.as_str()),
        )
        .await
        .expect("add");

    let (session, _events) = Session::sign_in(
        identity,
        backend,
        telemetry,
        &SyncConfig::default(),
        "priya@example.com",
        "hunter2",
    )
    .await
    .expect("sign in");
    let store = Arc::clone(session.store());

    wait_until(|| store.tasks_by_filter(&TaskFilter::default()).len() == 1).await;
    let tasks = store.tasks_by_filter(&TaskFilter::default());
    assert_eq!(tasks[0].title, "Grease the garage door");
    // Server-resolved timestamps came through the snapshot.
    assert!(tasks[0].created_at.is_some());
    assert!(tasks[0].updated_at.is_some());
}

#[tokio::test]
async fn subscription_failure_reaches_the_store() {
    let (identity, backend, telemetry) = services();

    let (session, mut events) = Session::sign_up(
        Arc::clone(&identity),
        Arc::clone(&backend),
        telemetry,
        &SyncConfig::default(),
        provider_account(),
    )
    .await
    .expect("sign up");
    let store = Arc::clone(session.store());

    backend
        .inject_subscription_error(TASKS_COLLECTION, "stream torn down")
        .await;

    let event = wait_for_event(&mut events, |e| matches!(e, StoreEvent::SyncError { .. })).await;
    if let StoreEvent::SyncError {
        collection,
        message,
    } = event
    {
        assert_eq!(collection, TASKS_COLLECTION);
        assert_eq!(message, "stream torn down");
    }
    assert_eq!(store.last_error(), Some("stream torn down".to_string()));
}

#[tokio::test]
async fn signing_out_updates_the_session_stream() {
    let (identity, backend, telemetry) = services();
    let mut session_changes = identity.session_changes();
    assert!(matches!(
        *session_changes.borrow(),
        SessionState::SignedOut
    ));

    let (session, _events) = Session::sign_up(
        Arc::clone(&identity),
        backend,
        Arc::clone(&telemetry),
        &SyncConfig::default(),
        provider_account(),
    )
    .await
    .expect("sign up");
    session_changes.changed().await.expect("signed-in change");
    assert!(matches!(
        *session_changes.borrow_and_update(),
        SessionState::SignedIn(_)
    ));

    session.sign_out().await;
    session_changes.changed().await.expect("signed-out change");
    assert!(matches!(
        *session_changes.borrow_and_update(),
        SessionState::SignedOut
    ));
    assert_eq!(
        telemetry.names().last().map(String::as_str),
        Some("logout")
    );
}
