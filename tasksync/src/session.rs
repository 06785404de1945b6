//! Signed-in session lifecycle.
//!
//! A [`Session`] binds one authenticated user to a running
//! [`TaskStore`]: it signs the user in, loads their profile document,
//! opens the live task and comment subscriptions, and pumps their
//! snapshots into the store until sign-out. Dropping a session stops the
//! pumps; the remote store sees no further reads from it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use tasksync_backend::{
    AuthError, BackendError, CollectionEvent, Document, DocumentStore, FieldValue, Fields,
    IdentityProvider, Principal, Subscription, TelemetryEvent, TelemetrySink,
};
use tasksync_model::{Role, User, UserId};

use crate::store::{COMMENTS_COLLECTION, StoreEvent, SyncConfig, TASKS_COLLECTION, TaskStore};

/// Collection holding user profile documents.
pub const USERS_COLLECTION: &str = "users";

/// What a fresh registration needs, beyond the service handles.
#[derive(Debug, Clone, Copy)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub display_name: &'a str,
    pub role: Role,
}

/// Errors establishing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The identity provider rejected the credentials or the new account.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    /// Authentication succeeded but the profile could not be read or
    /// written.
    #[error("profile unavailable: {0}")]
    Profile(#[from] BackendError),
}

/// One signed-in user's connection to the task system.
///
/// Created via [`Session::sign_in`] or [`Session::sign_up`], which also
/// return the store's event stream. The session owns the subscription
/// pump tasks; they stop on [`Session::sign_out`] or drop.
pub struct Session<I, B, S> {
    /// Authentication service.
    identity: Arc<I>,
    /// Product telemetry sink.
    telemetry: Arc<S>,
    /// The store this session feeds.
    store: Arc<TaskStore<B, S>>,
    /// Profile of the signed-in user.
    viewer: User,
    /// Background snapshot pumps (kept for the session's lifetime).
    pumps: Vec<tokio::task::JoinHandle<()>>,
}

impl<I, B, S> Session<I, B, S>
where
    I: IdentityProvider,
    B: DocumentStore + 'static,
    S: TelemetrySink + 'static,
{
    /// Signs an existing user in and starts live synchronization.
    ///
    /// Performs the following steps:
    /// 1. Authenticates against the identity provider
    /// 2. Loads the user's profile document (role, display name, avatar)
    /// 3. Opens live subscriptions to the task and comment collections
    /// 4. Spawns the pumps that feed their snapshots into the store
    ///
    /// # Errors
    ///
    /// - [`SessionError::Auth`] for rejected credentials.
    /// - [`SessionError::Profile`] if the profile read fails outright. A
    ///   merely missing profile is not an error; the role defaults to
    ///   client.
    pub async fn sign_in(
        identity: Arc<I>,
        backend: Arc<B>,
        telemetry: Arc<S>,
        config: &SyncConfig,
        email: &str,
        password: &str,
    ) -> Result<(Self, mpsc::Receiver<StoreEvent>), SessionError> {
        let principal = identity.sign_in(email, password).await?;
        telemetry.log_event(TelemetryEvent::new("login"));

        let viewer = load_viewer(backend.as_ref(), &principal).await?;
        tracing::info!(user = %viewer.id, role = %viewer.role, "session established");
        Ok(Self::start(identity, backend, telemetry, config, viewer).await)
    }

    /// Registers a new account, writes its profile document, and starts
    /// live synchronization as that user.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Auth`] if the email is already registered.
    /// - [`SessionError::Profile`] if the profile write fails. The
    ///   account exists at that point; a later sign-in falls back to the
    ///   client role until a profile is written.
    pub async fn sign_up(
        identity: Arc<I>,
        backend: Arc<B>,
        telemetry: Arc<S>,
        config: &SyncConfig,
        account: NewAccount<'_>,
    ) -> Result<(Self, mpsc::Receiver<StoreEvent>), SessionError> {
        let principal = identity
            .sign_up(account.email, account.password, account.display_name)
            .await?;
        backend
            .set(
                USERS_COLLECTION,
                &principal.user_id,
                profile_fields(account.display_name, account.email, account.role, None),
            )
            .await?;
        telemetry.log_event(TelemetryEvent::new("sign_up"));

        let viewer = User {
            id: UserId::new(principal.user_id),
            name: account.display_name.to_string(),
            email: account.email.to_string(),
            role: account.role,
            avatar: None,
        };
        tracing::info!(user = %viewer.id, role = %viewer.role, "account registered");
        Ok(Self::start(identity, backend, telemetry, config, viewer).await)
    }

    async fn start(
        identity: Arc<I>,
        backend: Arc<B>,
        telemetry: Arc<S>,
        config: &SyncConfig,
        viewer: User,
    ) -> (Self, mpsc::Receiver<StoreEvent>) {
        let (store, events) = TaskStore::new(
            Arc::clone(&backend),
            Arc::clone(&telemetry),
            viewer.clone(),
            config,
        );
        let store = Arc::new(store);

        let task_sub = backend
            .subscribe(TASKS_COLLECTION, config.subscription_buffer)
            .await;
        let comment_sub = backend
            .subscribe(COMMENTS_COLLECTION, config.subscription_buffer)
            .await;
        let pumps = vec![
            tokio::spawn(pump_tasks(Arc::clone(&store), task_sub)),
            tokio::spawn(pump_comments(Arc::clone(&store), comment_sub)),
        ];

        let session = Self {
            identity,
            telemetry,
            store,
            viewer,
            pumps,
        };
        (session, events)
    }

    /// The store this session feeds. Cloning the [`Arc`] is the way to
    /// share it with other tasks.
    #[must_use]
    pub fn store(&self) -> &Arc<TaskStore<B, S>> {
        &self.store
    }

    /// Profile of the signed-in user.
    #[must_use]
    pub fn viewer(&self) -> &User {
        &self.viewer
    }

    /// Ends the session: stops the snapshot pumps, signs the user out,
    /// and records the logout.
    pub async fn sign_out(mut self) {
        self.stop_pumps();
        self.identity.sign_out().await;
        self.telemetry.log_event(TelemetryEvent::new("logout"));
        tracing::info!(user = %self.viewer.id, "session ended");
    }

    fn stop_pumps(&mut self) {
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }
}

impl<I, B, S> std::fmt::Debug for Session<I, B, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("viewer", &self.viewer)
            .finish_non_exhaustive()
    }
}

impl<I, B, S> Drop for Session<I, B, S> {
    fn drop(&mut self) {
        for pump in self.pumps.drain(..) {
            pump.abort();
        }
    }
}

/// Reads the viewer's profile document. A missing document yields a
/// client-role fallback built from the principal; only a failing read is
/// an error.
async fn load_viewer<B: DocumentStore>(
    backend: &B,
    principal: &Principal,
) -> Result<User, BackendError> {
    match backend.get(USERS_COLLECTION, &principal.user_id).await? {
        Some(doc) => Ok(viewer_from_profile(principal, &doc)),
        None => {
            tracing::warn!(
                user = %principal.user_id,
                "no profile document; defaulting to client role"
            );
            Ok(User {
                id: UserId::new(principal.user_id.clone()),
                name: principal.display_name.clone(),
                email: principal.email.clone(),
                role: Role::Client,
                avatar: None,
            })
        }
    }
}

/// Builds the viewer from a profile document, falling back field by
/// field to what authentication already established. An out-of-set role
/// string also falls back to client.
fn viewer_from_profile(principal: &Principal, doc: &Document) -> User {
    User {
        id: UserId::new(principal.user_id.clone()),
        name: doc
            .text("name")
            .unwrap_or(&principal.display_name)
            .to_string(),
        email: principal.email.clone(),
        role: doc.text("role").and_then(Role::parse).unwrap_or(Role::Client),
        avatar: doc.text("avatar").map(str::to_string),
    }
}

/// The field map a fresh profile document is written with.
pub(crate) fn profile_fields(name: &str, email: &str, role: Role, avatar: Option<&str>) -> Fields {
    let mut fields = Fields::new();
    fields.insert("name".to_string(), FieldValue::text(name));
    fields.insert("email".to_string(), FieldValue::text(email));
    fields.insert("role".to_string(), FieldValue::text(role.as_str()));
    if let Some(avatar) = avatar {
        fields.insert("avatar".to_string(), FieldValue::text(avatar));
    }
    fields.insert("createdAt".to_string(), FieldValue::ServerTimestamp);
    fields
}

async fn pump_tasks<B, S>(store: Arc<TaskStore<B, S>>, mut sub: Subscription)
where
    B: DocumentStore,
    S: TelemetrySink,
{
    while let Some(event) = sub.next_event().await {
        match event {
            CollectionEvent::Snapshot(docs) => store.apply_task_snapshot(&docs),
            CollectionEvent::Error(message) => {
                store.note_sync_error(sub.collection(), &message);
                break;
            }
        }
    }
    tracing::debug!(collection = sub.collection(), "snapshot pump stopped");
}

async fn pump_comments<B, S>(store: Arc<TaskStore<B, S>>, mut sub: Subscription)
where
    B: DocumentStore,
    S: TelemetrySink,
{
    while let Some(event) = sub.next_event().await {
        match event {
            CollectionEvent::Snapshot(docs) => store.apply_comment_snapshot(&docs),
            CollectionEvent::Error(message) => {
                store.note_sync_error(sub.collection(), &message);
                break;
            }
        }
    }
    tracing::debug!(collection = sub.collection(), "snapshot pump stopped");
}
