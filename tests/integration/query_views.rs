//! Integration tests for the read side: role scoping, filters, sorts,
//! and snapshot mapping resilience, all exercised over live sessions
//! rather than bare vectors.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use tasksync::query::{DateRange, TaskFilter, TaskSort, sort_tasks};
use tasksync::session::{NewAccount, Session};
use tasksync::store::{StoreEvent, SyncConfig};
use tasksync_backend::{
    DocumentStore, FieldValue, Fields, MemoryBackend, MemoryIdentity, RecordingSink,
};
use tasksync_model::{Priority, Role, Task, TaskDraft, TaskStatus, Timestamp, UserId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

type DemoSession = Session<MemoryIdentity, MemoryBackend, RecordingSink>;
type Harness = (
    DemoSession,
    mpsc::Receiver<StoreEvent>,
    Arc<MemoryIdentity>,
    Arc<MemoryBackend>,
);

const DAY: u64 = 86_400_000;

async fn provider_session() -> Harness {
    let identity = Arc::new(MemoryIdentity::new());
    let backend = Arc::new(MemoryBackend::new());
    let telemetry = Arc::new(RecordingSink::new());
    let (session, events) = Session::sign_up(
        Arc::clone(&identity),
        Arc::clone(&backend),
        telemetry,
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
    (session, events, identity, backend)
}

/// A fully specified draft for view tests.
fn draft(
    session: &DemoSession,
    title: &str,
    assignee: &str,
    priority: Priority,
    status: TaskStatus,
    deadline: Option<Timestamp>,
) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: String::new(),
        created_by: session.viewer().id.clone(),
        assigned_to: UserId::new(assignee),
        client_id: UserId::new(assignee),
        deadline,
        priority,
        status,
    }
}

/// Creates `drafts` through the store and waits until all are mirrored.
async fn create_all(session: &DemoSession, drafts: Vec<TaskDraft>) {
    let expected = drafts.len();
    let store = session.store();
    for d in drafts {
        store.create_task(d).await.expect("create");
    }
    let store = Arc::clone(store);
    wait_until(move || store.tasks_by_filter(&TaskFilter::default()).len() == expected).await;
}

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

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.title.as_str()).collect()
}

// ===========================================================================
// Role scoping
// ===========================================================================

#[tokio::test]
async fn provider_and_client_see_disjoint_scopes() {
    let (provider, _events, identity, backend) = provider_session().await;
    let (client, _client_events) = Session::sign_up(
        identity,
        backend,
        Arc::new(RecordingSink::new()),
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

    let mine = client.viewer().id.as_str().to_string();
    create_all(
        &provider,
        vec![
            draft(&provider, "Flush water heater", &mine, Priority::Medium, TaskStatus::Pending, None),
            draft(&provider, "Check crawlspace", &mine, Priority::Low, TaskStatus::Pending, None),
            draft(&provider, "Quote new roof", "someone-else", Priority::High, TaskStatus::Pending, None),
        ],
    )
    .await;

    // The provider created all three; the client is assigned two.
    let provider_view = provider.store().tasks_by_filter(&TaskFilter::default());
    assert_eq!(provider_view.len(), 3);

    let client_store = Arc::clone(client.store());
    wait_until(move || client_store.tasks_by_filter(&TaskFilter::default()).len() == 2).await;
    let client_view = client.store().tasks_by_filter(&TaskFilter::default());
    assert!(client_view.iter().all(|t| t.assigned_to.as_str() == mine));
}

// ===========================================================================
// Filters
// ===========================================================================

#[tokio::test]
async fn filters_compose_over_the_mirror() {
    let (session, _events, _identity, _backend) = provider_session().await;
    create_all(
        &session,
        vec![
            draft(&session, "Fix furnace igniter", "c1", Priority::High, TaskStatus::Pending, None),
            draft(&session, "Clean furnace burner", "c1", Priority::Low, TaskStatus::Completed, None),
            draft(&session, "Fix kitchen sink", "c1", Priority::High, TaskStatus::Pending, None),
        ],
    )
    .await;

    // Status and search must both hold.
    let filter = TaskFilter {
        status: Some(TaskStatus::Pending),
        search: Some("furnace".to_string()),
        ..TaskFilter::default()
    };
    let hits = session.store().tasks_by_filter(&filter);
    assert_eq!(titles(&hits), vec!["Fix furnace igniter"]);
}

#[tokio::test]
async fn date_range_keeps_only_dated_tasks_inside_the_window() {
    let (session, _events, _identity, _backend) = provider_session().await;
    create_all(
        &session,
        vec![
            draft(
                &session,
                "Inside the window",
                "c1",
                Priority::Medium,
                TaskStatus::Pending,
                Some(Timestamp::from_millis(2 * DAY)),
            ),
            draft(
                &session,
                "Past the window",
                "c1",
                Priority::Medium,
                TaskStatus::Pending,
                Some(Timestamp::from_millis(9 * DAY)),
            ),
            draft(&session, "No deadline at all", "c1", Priority::Medium, TaskStatus::Pending, None),
        ],
    )
    .await;

    let filter = TaskFilter {
        date_range: Some(DateRange {
            start: Timestamp::from_millis(DAY),
            end: Timestamp::from_millis(3 * DAY),
        }),
        ..TaskFilter::default()
    };
    let hits = session.store().tasks_by_filter(&filter);
    assert_eq!(titles(&hits), vec!["Inside the window"]);
}

// ===========================================================================
// Sorts
// ===========================================================================

#[tokio::test]
async fn the_three_sort_orders_disagree_on_the_same_mirror() {
    let (session, _events, _identity, _backend) = provider_session().await;
    create_all(
        &session,
        vec![
            draft(
                &session,
                "Alpha",
                "c1",
                Priority::Low,
                TaskStatus::Completed,
                Some(Timestamp::from_millis(DAY)),
            ),
            draft(
                &session,
                "Bravo",
                "c1",
                Priority::High,
                TaskStatus::Pending,
                Some(Timestamp::from_millis(2 * DAY)),
            ),
            draft(&session, "Charlie", "c1", Priority::Medium, TaskStatus::InProgress, None),
        ],
    )
    .await;
    let base = session.store().tasks_by_filter(&TaskFilter::default());

    // Earliest deadline first, undated last.
    let mut by_deadline = base.clone();
    sort_tasks(&mut by_deadline, TaskSort::Deadline);
    assert_eq!(titles(&by_deadline), vec!["Alpha", "Bravo", "Charlie"]);

    // Most urgent first.
    let mut by_priority = base.clone();
    sort_tasks(&mut by_priority, TaskSort::Priority);
    assert_eq!(titles(&by_priority), vec!["Bravo", "Charlie", "Alpha"]);

    // Workflow order: completed, in progress, pending.
    let mut by_status = base;
    sort_tasks(&mut by_status, TaskSort::Status);
    assert_eq!(titles(&by_status), vec!["Alpha", "Charlie", "Bravo"]);
}

// ===========================================================================
// Snapshot mapping
// ===========================================================================

#[tokio::test]
async fn malformed_documents_are_skipped_not_fatal() {
    let (session, mut events, _identity, backend) = provider_session().await;
    let creator = session.viewer().id.as_str().to_string();
    let task_fields = |title: &str| {
        Fields::from([
            ("title".to_string(), FieldValue::text(title)),
            ("createdBy".to_string(), FieldValue::text(&creator)),
            ("assignedTo".to_string(), FieldValue::text("c1")),
            ("clientId".to_string(), FieldValue::text("c1")),
            ("priority".to_string(), FieldValue::text("medium")),
            ("status".to_string(), FieldValue::text("pending")),
            ("createdAt".to_string(), FieldValue::ServerTimestamp),
            ("updatedAt".to_string(), FieldValue::ServerTimestamp),
        ])
    };

    backend
        .add("tasks", task_fields("Good document"))
        .await
        .expect("add");
    let mut no_title = task_fields("doomed");
    no_title.remove("title");
    backend.add("tasks", no_title).await.expect("add");
    let mut bad_priority = task_fields("Bad priority");
    bad_priority.insert("priority".to_string(), FieldValue::text("urgent"));
    backend.add("tasks", bad_priority).await.expect("add");

    // Only the mappable document lands; the snapshot as a whole applies.
    let store = Arc::clone(session.store());
    {
        let store = Arc::clone(&store);
        wait_until(move || store.tasks_by_filter(&TaskFilter::default()).len() == 1).await;
    }
    let view = store.tasks_by_filter(&TaskFilter::default());
    assert_eq!(titles(&view), vec!["Good document"]);

    // Mapping failures are per-document noise, not sync errors.
    assert!(store.last_error().is_none());
    tokio::time::sleep(Duration::from_millis(30)).await;
    while let Ok(event) = events.try_recv() {
        assert!(
            !matches!(event, StoreEvent::SyncError { .. }),
            "unmappable documents must not raise sync errors"
        );
    }
}

#[tokio::test]
async fn comments_keep_insertion_order() {
    let (session, _events, _identity, _backend) = provider_session().await;
    let store = Arc::clone(session.store());
    let (task, _) = store
        .create_task(draft(&session, "Tune the boiler", "c1", Priority::Medium, TaskStatus::Pending, None))
        .await
        .expect("create");

    for text in ["First visit booked.", "Parts ordered.", "All done."] {
        store
            .add_comment(&task.id, &session.viewer().id, text)
            .await
            .expect("comment");
    }

    {
        let store = Arc::clone(&store);
        let id = task.id.clone();
        wait_until(move || store.comments_by_task(&id).len() == 3).await;
    }
    let thread = store.comments_by_task(&task.id);
    let texts: Vec<&str> = thread.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, vec!["First visit booked.", "Parts ordered.", "All done."]);
}
