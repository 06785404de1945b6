//! Demo data for local runs.
//!
//! Registers a provider and a client account and fills the store with a
//! small spread of field-service tasks and comments, enough to exercise
//! every status, priority, and sort order. Seeding expects a fresh
//! backend; registering over existing demo accounts is an error.

use thiserror::Error;

use tasksync_backend::{AuthError, BackendError, DocumentStore, IdentityProvider, Principal};
use tasksync_model::{Priority, Role, TaskDraft, TaskId, TaskStatus, Timestamp, UserId};

use crate::session::{USERS_COLLECTION, profile_fields};
use crate::store::mirror;
use crate::store::{COMMENTS_COLLECTION, TASKS_COLLECTION};

/// Email of the seeded provider account.
pub const PROVIDER_EMAIL: &str = "priya@tasksync.demo";
/// Email of the seeded client account.
pub const CLIENT_EMAIL: &str = "marcus@tasksync.demo";
/// Password both demo accounts share.
pub const DEMO_PASSWORD: &str = "demo-password";

const DAY_MILLIS: u64 = 24 * 60 * 60 * 1000;

/// The accounts seeding registered.
#[derive(Debug, Clone)]
pub struct SeedAccounts {
    /// The demo provider.
    pub provider: Principal,
    /// The demo client.
    pub client: Principal,
}

/// Errors while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    /// A demo account could not be registered.
    #[error("could not register demo account: {0}")]
    Auth(#[from] AuthError),
    /// A demo document could not be written.
    #[error("could not write demo data: {0}")]
    Backend(#[from] BackendError),
}

/// Seeds the demo accounts, tasks, and comments, leaving the identity
/// provider signed out.
///
/// # Errors
///
/// Returns [`SeedError::Auth`] when a demo email is already registered,
/// or [`SeedError::Backend`] when a document write is rejected.
pub async fn seed_demo_data<I, B>(identity: &I, backend: &B) -> Result<SeedAccounts, SeedError>
where
    I: IdentityProvider,
    B: DocumentStore,
{
    // Step 1: the two demo accounts with their profile documents.
    let provider = identity
        .sign_up(PROVIDER_EMAIL, DEMO_PASSWORD, "Priya Natarajan")
        .await?;
    backend
        .set(
            USERS_COLLECTION,
            &provider.user_id,
            profile_fields("Priya Natarajan", PROVIDER_EMAIL, Role::Provider, None),
        )
        .await?;
    let client = identity
        .sign_up(CLIENT_EMAIL, DEMO_PASSWORD, "Marcus Webb")
        .await?;
    backend
        .set(
            USERS_COLLECTION,
            &client.user_id,
            profile_fields("Marcus Webb", CLIENT_EMAIL, Role::Client, None),
        )
        .await?;
    identity.sign_out().await;

    // Step 2: a spread of tasks covering every status and priority.
    let created_by = UserId::new(provider.user_id.clone());
    let assigned_to = UserId::new(client.user_id.clone());
    let mut task_ids = Vec::new();
    for draft in demo_drafts(&created_by, &assigned_to, Timestamp::now()) {
        let id = backend
            .add(TASKS_COLLECTION, mirror::draft_fields(&draft))
            .await?;
        task_ids.push(TaskId::new(id));
    }

    // Step 3: short comment threads on two of the tasks.
    let threads = [
        (0, &created_by, "Parts arrived; scheduling for Thursday."),
        (
            0,
            &assigned_to,
            "Thursday works. Roof access is from the east stairwell.",
        ),
        (2, &assigned_to, "Inspection certificate received, thanks."),
    ];
    for (index, author, text) in threads {
        backend
            .add(
                COMMENTS_COLLECTION,
                mirror::comment_fields(&task_ids[index], author, text),
            )
            .await?;
    }

    tracing::info!(
        tasks = task_ids.len(),
        comments = threads.len(),
        "demo data seeded"
    );
    Ok(SeedAccounts { provider, client })
}

fn demo_drafts(created_by: &UserId, assigned_to: &UserId, now: Timestamp) -> Vec<TaskDraft> {
    let base = |title: &str, description: &str| TaskDraft {
        title: title.to_string(),
        description: description.to_string(),
        created_by: created_by.clone(),
        assigned_to: assigned_to.clone(),
        client_id: assigned_to.clone(),
        deadline: None,
        priority: Priority::Medium,
        status: TaskStatus::Pending,
    };

    let mut hvac = base(
        "Service rooftop HVAC unit",
        "Quarterly service visit; compressor has been short-cycling.",
    );
    hvac.priority = Priority::High;
    hvac.status = TaskStatus::InProgress;
    hvac.deadline = Some(now.saturating_add_millis(2 * DAY_MILLIS));

    let mut faucet = base(
        "Replace kitchen faucet",
        "Client reports a slow drip under the sink.",
    );
    faucet.deadline = Some(now.saturating_add_millis(5 * DAY_MILLIS));

    let mut boiler = base(
        "Annual boiler inspection",
        "Certificate renewal; photos filed with the report.",
    );
    boiler.priority = Priority::Low;
    boiler.status = TaskStatus::Completed;
    boiler.deadline = Some(Timestamp::from_millis(
        now.as_millis().saturating_sub(DAY_MILLIS),
    ));

    let mut subpanel = base(
        "Rewire garage subpanel",
        "Awaiting permit; no visit scheduled yet.",
    );
    subpanel.priority = Priority::High;

    vec![hvac, faucet, boiler, subpanel]
}
