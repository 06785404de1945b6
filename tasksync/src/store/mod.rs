//! Task synchronization store.
//!
//! Owns the in-memory mirror of the remote `tasks` and `comments`
//! collections for one signed-in session. Live snapshots replace the
//! mirror wholesale; mutations write through to the remote store, return
//! provisional projections immediately, and are tracked in a write ledger
//! until a later snapshot reconciles them. Read accessors are synchronous
//! and never touch the network.
//!
//! The store is fed by the session's subscription pumps through
//! [`TaskStore::apply_task_snapshot`] and
//! [`TaskStore::apply_comment_snapshot`]; it emits [`StoreEvent`]s so the
//! presentation layer can react without polling.

pub mod mirror;
pub mod writes;

pub use mirror::MapError;
pub use writes::{DEFAULT_MAX_TRACKED_WRITES, WriteId, WriteRecord, WriteState, WriteTarget};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

use tasksync_backend::{BackendError, Document, DocumentStore, TelemetryEvent, TelemetrySink};
use tasksync_model::{
    Comment, CommentError, CommentId, Priority, Task, TaskDraft, TaskId, TaskPatch, TaskStatus,
    Timestamp, User, UserId, ValidationError,
};

use crate::query::{self, TaskFilter};
use writes::WriteLedger;

/// Collection holding task documents.
pub const TASKS_COLLECTION: &str = "tasks";

/// Collection holding comment documents.
pub const COMMENTS_COLLECTION: &str = "comments";

/// Default capacity of the store event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Default buffer for undelivered snapshots per live subscription.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 32;

/// Channel and ledger sizing for one synchronization session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Capacity of the store event channel.
    pub event_buffer: usize,
    /// Buffer for undelivered snapshots per live subscription.
    pub subscription_buffer: usize,
    /// Cap on retained write-ledger records.
    pub max_tracked_writes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
            max_tracked_writes: DEFAULT_MAX_TRACKED_WRITES,
        }
    }
}

/// Errors returned by store operations.
///
/// Validation failures are caught before any write is attempted; write
/// failures come back from the remote store. Subscription failures do not
/// surface here; they arrive as [`StoreEvent::SyncError`] and via
/// [`TaskStore::last_error`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A task draft or patch failed client-side validation.
    #[error("invalid task: {0}")]
    InvalidTask(#[from] ValidationError),
    /// Comment text failed client-side validation.
    #[error("invalid comment: {0}")]
    InvalidComment(#[from] CommentError),
    /// The remote store rejected the write.
    #[error("write failed: {0}")]
    Write(#[from] BackendError),
}

/// Events emitted as the mirror and the write ledger change.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A fresh snapshot replaced the task mirror.
    TasksRefreshed {
        /// Tasks now in the mirror.
        count: usize,
    },
    /// A fresh snapshot replaced the comment mirror.
    CommentsRefreshed {
        /// Comments now in the mirror, across all tasks.
        count: usize,
    },
    /// A tracked write changed state.
    WriteStateChanged {
        /// The write in question.
        write_id: WriteId,
        /// Its new state.
        state: WriteState,
    },
    /// A subscription failed, or the comment cascade left orphans behind.
    SyncError {
        /// Collection the failure belongs to.
        collection: String,
        /// Human-readable description.
        message: String,
    },
}

/// The synchronization store for one signed-in session.
///
/// Generic over the document store and the telemetry sink so tests can
/// substitute failure-injecting and recording doubles.
pub struct TaskStore<B, S> {
    /// Remote document store all writes go through.
    backend: Arc<B>,
    /// Product telemetry sink.
    telemetry: Arc<S>,
    /// The signed-in user; fixes the visibility scope of filtered reads.
    viewer: User,
    /// Task mirror, in snapshot order.
    tasks: RwLock<Vec<Task>>,
    /// Comment mirror grouped by task, arrival order within each group.
    comments: RwLock<HashMap<TaskId, Vec<Comment>>>,
    /// Ledger of locally-originated writes.
    writes: Mutex<WriteLedger>,
    /// Most recent store-level failure, for the presentation layer.
    last_error: Mutex<Option<String>>,
    /// Store event channel. Delivery is best effort: events are dropped
    /// when the receiver lags.
    event_tx: mpsc::Sender<StoreEvent>,
}

impl<B: DocumentStore, S: TelemetrySink> TaskStore<B, S> {
    /// Creates a store for `viewer` and returns it with the receiving end
    /// of its event channel.
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        telemetry: Arc<S>,
        viewer: User,
        config: &SyncConfig,
    ) -> (Self, mpsc::Receiver<StoreEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        let store = Self {
            backend,
            telemetry,
            viewer,
            tasks: RwLock::new(Vec::new()),
            comments: RwLock::new(HashMap::new()),
            writes: Mutex::new(WriteLedger::new(config.max_tracked_writes)),
            last_error: Mutex::new(None),
            event_tx,
        };
        (store, event_rx)
    }

    /// The user this store is scoped to.
    #[must_use]
    pub fn viewer(&self) -> &User {
        &self.viewer
    }

    // ------------------------------------------------------------------
    // Synchronous mirror accessors
    // ------------------------------------------------------------------

    /// Looks a task up in the mirror. Never a remote read, and not
    /// role-scoped; scoping applies to the filter path.
    #[must_use]
    pub fn task_by_id(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().iter().find(|t| &t.id == id).cloned()
    }

    /// Returns the viewer-visible tasks matching `filter`, in mirror
    /// order. Role scoping is applied first and cannot be overridden by
    /// the filter.
    #[must_use]
    pub fn tasks_by_filter(&self, filter: &TaskFilter) -> Vec<Task> {
        query::filter_tasks(&self.viewer, &self.tasks.read(), filter)
    }

    /// Returns a task's comments in arrival order. Always a vector: a
    /// task without comments yields an empty one, never an absent value.
    #[must_use]
    pub fn comments_by_task(&self, task_id: &TaskId) -> Vec<Comment> {
        self.comments
            .read()
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Reconciliation state of a tracked write, `None` once evicted.
    #[must_use]
    pub fn write_state(&self, write_id: &WriteId) -> Option<WriteState> {
        self.writes.lock().state(write_id)
    }

    /// Number of writes still awaiting snapshot reconciliation.
    #[must_use]
    pub fn pending_write_count(&self) -> usize {
        self.writes.lock().pending_count()
    }

    /// Most recent store-level failure message, if any. Overwritten by
    /// the next failure, never auto-cleared.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    // ------------------------------------------------------------------
    // Snapshot ingestion
    // ------------------------------------------------------------------

    /// Replaces the task mirror with a fresh snapshot and settles pending
    /// writes against it. Unmappable documents are skipped.
    pub fn apply_task_snapshot(&self, docs: &[Document]) {
        let tasks = mirror::collect_tasks(docs);
        let count = tasks.len();
        let present: HashSet<TaskId> = tasks.iter().map(|t| t.id.clone()).collect();
        *self.tasks.write() = tasks;

        let confirmed = self.writes.lock().reconcile_tasks(&present);
        for write_id in confirmed {
            self.emit(StoreEvent::WriteStateChanged {
                write_id,
                state: WriteState::Confirmed,
            });
        }
        tracing::debug!(count, "task mirror replaced");
        self.emit(StoreEvent::TasksRefreshed { count });
    }

    /// Replaces the comment mirror with a fresh snapshot and settles
    /// pending comment writes against it.
    pub fn apply_comment_snapshot(&self, docs: &[Document]) {
        let grouped = mirror::collect_comments(docs);
        let count = grouped.values().map(Vec::len).sum();
        let present: HashSet<CommentId> = grouped
            .values()
            .flat_map(|group| group.iter().map(|c| c.id.clone()))
            .collect();
        *self.comments.write() = grouped;

        let confirmed = self.writes.lock().reconcile_comments(&present);
        for write_id in confirmed {
            self.emit(StoreEvent::WriteStateChanged {
                write_id,
                state: WriteState::Confirmed,
            });
        }
        tracing::debug!(count, "comment mirror replaced");
        self.emit(StoreEvent::CommentsRefreshed { count });
    }

    /// Records a failed subscription. The mirror keeps its last contents;
    /// no further snapshots will arrive for `collection`.
    pub fn note_sync_error(&self, collection: &str, message: &str) {
        tracing::error!(collection, message, "live subscription failed");
        *self.last_error.lock() = Some(message.to_string());
        self.emit(StoreEvent::SyncError {
            collection: collection.to_string(),
            message: message.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // Write operations
    // ------------------------------------------------------------------

    /// Creates a task.
    ///
    /// Returns a provisional task carrying local-clock timestamps; the
    /// next snapshot delivers the server-assigned ones.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTask`] before anything is sent, or
    /// [`StoreError::Write`] when the remote store rejects the creation,
    /// in which case the mirror is untouched.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<(Task, WriteId), StoreError> {
        // Step 1: validate client-side; invalid drafts never leave the
        // process.
        draft.validate()?;

        // Step 2: track the write before it departs.
        let write_id = WriteId::new();
        self.writes
            .lock()
            .begin(write_id.clone(), WriteTarget::TaskCreate(None));
        self.emit(StoreEvent::WriteStateChanged {
            write_id: write_id.clone(),
            state: WriteState::Pending,
        });

        // Step 3: send the creation; both timestamps are server-assigned
        // sentinels.
        let remote_id = match self
            .backend
            .add(TASKS_COLLECTION, mirror::draft_fields(&draft))
            .await
        {
            Ok(id) => id,
            Err(err) => return Err(self.fail_write(&write_id, err)),
        };
        let task_id = TaskId::new(remote_id);

        // Step 4: record the assigned id; settle immediately if the
        // snapshot raced ahead of us.
        let already_mirrored = self.tasks.read().iter().any(|t| t.id == task_id);
        let confirmed = {
            let mut writes = self.writes.lock();
            writes.assign_task_id(&write_id, task_id.clone());
            already_mirrored && writes.confirm(&write_id)
        };
        if confirmed {
            self.emit(StoreEvent::WriteStateChanged {
                write_id: write_id.clone(),
                state: WriteState::Confirmed,
            });
        }

        // Step 5: telemetry, then the provisional return value.
        self.telemetry
            .log_event(TelemetryEvent::new("create_task").with("taskId", task_id.as_str()));
        let provisional = draft.into_provisional(task_id, Timestamp::now());
        tracing::info!(id = %provisional.id, "task created");
        Ok((provisional, write_id))
    }

    /// Applies a partial update to a task.
    ///
    /// Unsupplied fields stay untouched remotely; `updatedAt` is always
    /// server-refreshed, even for an empty patch. Returns a locally
    /// merged projection, provisional until the next snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTask`] for an invalid patch, or
    /// [`StoreError::Write`] when the task does not exist remotely or the
    /// write is rejected.
    pub async fn update_task(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> Result<(Task, WriteId), StoreError> {
        patch.validate()?;

        let write_id = WriteId::new();
        self.writes
            .lock()
            .begin(write_id.clone(), WriteTarget::TaskUpdate(id.clone()));
        self.emit(StoreEvent::WriteStateChanged {
            write_id: write_id.clone(),
            state: WriteState::Pending,
        });

        if let Err(err) = self
            .backend
            .update(TASKS_COLLECTION, id.as_str(), mirror::patch_fields(&patch))
            .await
        {
            return Err(self.fail_write(&write_id, err));
        }

        let base = self.task_by_id(id);
        if base.is_none() {
            tracing::debug!(%id, "update target not yet mirrored; projecting from the patch alone");
        }
        let projection = merged_projection(base, id, &patch, Timestamp::now());
        tracing::info!(%id, "task updated");
        Ok((projection, write_id))
    }

    /// Deletes a task, then its comments as one atomic batch.
    ///
    /// The two steps are not atomic with each other: if the comment batch
    /// fails after the task delete committed, the comments are orphaned.
    /// That anomaly is logged loudly, surfaced as
    /// [`StoreEvent::SyncError`], and returned as the call's error; it is
    /// never silently repaired. The ledger record tracks the task
    /// document's delete; the cascade outcome is surfaced separately.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Write`] when the task delete is rejected, or
    /// when the dependent-comment query or batch delete fails after it.
    pub async fn delete_task(&self, id: &TaskId) -> Result<WriteId, StoreError> {
        let write_id = WriteId::new();
        self.writes
            .lock()
            .begin(write_id.clone(), WriteTarget::TaskDelete(id.clone()));
        self.emit(StoreEvent::WriteStateChanged {
            write_id: write_id.clone(),
            state: WriteState::Pending,
        });

        // Step 1: the task document itself.
        if let Err(err) = self.backend.delete(TASKS_COLLECTION, id.as_str()).await {
            return Err(self.fail_write(&write_id, err));
        }

        // Step 2: its comments. From here on the task is already gone.
        let dependents = match self
            .backend
            .query_where(
                COMMENTS_COLLECTION,
                mirror::TASK_ID,
                &mirror::task_ref_value(id),
            )
            .await
        {
            Ok(docs) => docs,
            Err(err) => return Err(self.cascade_anomaly(id, err)),
        };
        if !dependents.is_empty() {
            let ids: Vec<String> = dependents.iter().map(|d| d.id.clone()).collect();
            if let Err(err) = self.backend.delete_batch(COMMENTS_COLLECTION, &ids).await {
                return Err(self.cascade_anomaly(id, err));
            }
        }

        self.telemetry
            .log_event(TelemetryEvent::new("delete_task").with("taskId", id.as_str()));
        tracing::info!(%id, comments = dependents.len(), "task deleted with comment cascade");
        Ok(write_id)
    }

    /// Adds a comment to a task.
    ///
    /// Does not check task existence client-side: the mirror may trail
    /// the remote store, so such a check would reject valid writes.
    /// Returns a provisional comment with a local-clock timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidComment`] for blank text, or
    /// [`StoreError::Write`] when the remote store rejects the write.
    pub async fn add_comment(
        &self,
        task_id: &TaskId,
        user_id: &UserId,
        text: &str,
    ) -> Result<(Comment, WriteId), StoreError> {
        Comment::validate_text(text)?;

        let write_id = WriteId::new();
        self.writes
            .lock()
            .begin(write_id.clone(), WriteTarget::CommentAdd(None));
        self.emit(StoreEvent::WriteStateChanged {
            write_id: write_id.clone(),
            state: WriteState::Pending,
        });

        let remote_id = match self
            .backend
            .add(
                COMMENTS_COLLECTION,
                mirror::comment_fields(task_id, user_id, text),
            )
            .await
        {
            Ok(id) => id,
            Err(err) => return Err(self.fail_write(&write_id, err)),
        };
        let comment_id = CommentId::new(remote_id);

        let already_mirrored = self
            .comments
            .read()
            .values()
            .any(|group| group.iter().any(|c| c.id == comment_id));
        let confirmed = {
            let mut writes = self.writes.lock();
            writes.assign_comment_id(&write_id, comment_id.clone());
            already_mirrored && writes.confirm(&write_id)
        };
        if confirmed {
            self.emit(StoreEvent::WriteStateChanged {
                write_id: write_id.clone(),
                state: WriteState::Confirmed,
            });
        }

        self.telemetry.log_event(
            TelemetryEvent::new("add_comment")
                .with("taskId", task_id.as_str())
                .with("commentId", comment_id.as_str()),
        );
        let provisional = Comment {
            id: comment_id,
            task_id: task_id.clone(),
            user_id: user_id.clone(),
            text: text.to_string(),
            created_at: Some(Timestamp::now()),
        };
        tracing::info!(id = %provisional.id, task = %task_id, "comment added");
        Ok((provisional, write_id))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn emit(&self, event: StoreEvent) {
        let _ = self.event_tx.try_send(event);
    }

    fn fail_write(&self, write_id: &WriteId, err: BackendError) -> StoreError {
        let reason = err.to_string();
        self.writes.lock().fail(write_id, reason.clone());
        *self.last_error.lock() = Some(reason.clone());
        self.emit(StoreEvent::WriteStateChanged {
            write_id: write_id.clone(),
            state: WriteState::Failed(reason),
        });
        tracing::warn!(%err, "write rejected");
        StoreError::Write(err)
    }

    fn cascade_anomaly(&self, task_id: &TaskId, err: BackendError) -> StoreError {
        // The task document is already deleted; its comments remain
        // behind until repaired out of band.
        tracing::error!(
            task = %task_id,
            %err,
            "comment cascade failed after task delete; orphaned comments remain"
        );
        let message = format!("comment cascade for task {task_id} failed: {err}");
        *self.last_error.lock() = Some(message.clone());
        self.emit(StoreEvent::SyncError {
            collection: COMMENTS_COLLECTION.to_string(),
            message,
        });
        StoreError::Write(err)
    }
}

/// The locally merged projection an update returns. Falls back to a
/// skeleton when the target is not in the mirror yet, mirroring the
/// source of truth as closely as the local state allows.
fn merged_projection(
    base: Option<Task>,
    id: &TaskId,
    patch: &TaskPatch,
    now: Timestamp,
) -> Task {
    let mut task = base.unwrap_or_else(|| Task {
        id: id.clone(),
        title: String::new(),
        description: String::new(),
        created_by: UserId::new(""),
        assigned_to: UserId::new(""),
        client_id: UserId::new(""),
        deadline: None,
        priority: Priority::Medium,
        status: TaskStatus::Pending,
        created_at: None,
        updated_at: None,
    });
    patch.apply_to(&mut task);
    task.updated_at = Some(now);
    task
}
