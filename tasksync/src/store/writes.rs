//! Write ledger: tracks every locally-originated mutation until the
//! authoritative snapshot reconciles it.
//!
//! A write is [`Pending`](WriteState::Pending) from the moment it is
//! attempted. A create or update confirms when a later snapshot contains
//! the target id; a delete confirms when a later snapshot no longer does.
//! A rejected write is marked failed immediately. Records are kept after
//! settling so callers can still query them, up to a cap.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tasksync_model::{CommentId, TaskId};

/// Default cap on retained ledger records.
pub const DEFAULT_MAX_TRACKED_WRITES: usize = 1024;

/// Unique identifier for a locally-originated write, based on UUID v7 for
/// time-ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteId(Uuid);

impl WriteId {
    /// Creates a new time-ordered write identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `WriteId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for WriteId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WriteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reconciliation state of one tracked write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteState {
    /// Sent to the remote store; not yet seen in a snapshot.
    Pending,
    /// A later snapshot reflects the mutation.
    Confirmed,
    /// The remote store rejected the write; terminal.
    Failed(String),
}

/// What a tracked write was trying to do.
///
/// Create targets carry `None` until the remote store has assigned an id,
/// which is also the terminal form for a rejected create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// Task creation.
    TaskCreate(Option<TaskId>),
    /// Partial task update.
    TaskUpdate(TaskId),
    /// Task deletion (the comment cascade is surfaced separately).
    TaskDelete(TaskId),
    /// Comment creation.
    CommentAdd(Option<CommentId>),
}

/// One ledger record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    /// What the write targets.
    pub target: WriteTarget,
    /// Current reconciliation state.
    pub state: WriteState,
}

/// The ledger itself. Callers hold it behind the store's lock.
#[derive(Debug)]
pub(crate) struct WriteLedger {
    records: HashMap<WriteId, WriteRecord>,
    max_tracked: usize,
}

impl WriteLedger {
    pub(crate) fn new(max_tracked: usize) -> Self {
        Self {
            records: HashMap::new(),
            max_tracked: max_tracked.max(1),
        }
    }

    /// Starts tracking a write as pending.
    pub(crate) fn begin(&mut self, id: WriteId, target: WriteTarget) {
        if self.records.len() >= self.max_tracked {
            // Settled records are evicted first; pending ones are never
            // dropped.
            self.records
                .retain(|_, record| record.state == WriteState::Pending);
        }
        self.records.insert(
            id,
            WriteRecord {
                target,
                state: WriteState::Pending,
            },
        );
    }

    /// Fills in the remote-assigned id on a create target.
    pub(crate) fn assign_task_id(&mut self, id: &WriteId, task_id: TaskId) {
        if let Some(record) = self.records.get_mut(id) {
            record.target = WriteTarget::TaskCreate(Some(task_id));
        }
    }

    /// Fills in the remote-assigned id on a comment-create target.
    pub(crate) fn assign_comment_id(&mut self, id: &WriteId, comment_id: CommentId) {
        if let Some(record) = self.records.get_mut(id) {
            record.target = WriteTarget::CommentAdd(Some(comment_id));
        }
    }

    /// Marks a write as rejected. Terminal.
    pub(crate) fn fail(&mut self, id: &WriteId, reason: String) {
        if let Some(record) = self.records.get_mut(id) {
            record.state = WriteState::Failed(reason);
        }
    }

    /// Marks a single pending write confirmed, returning whether it changed.
    pub(crate) fn confirm(&mut self, id: &WriteId) -> bool {
        match self.records.get_mut(id) {
            Some(record) if record.state == WriteState::Pending => {
                record.state = WriteState::Confirmed;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn state(&self, id: &WriteId) -> Option<WriteState> {
        self.records.get(id).map(|record| record.state.clone())
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.records
            .values()
            .filter(|record| record.state == WriteState::Pending)
            .count()
    }

    /// Settles pending task writes against the task ids present in a fresh
    /// snapshot. Returns the ids of newly confirmed writes.
    pub(crate) fn reconcile_tasks(&mut self, present: &HashSet<TaskId>) -> Vec<WriteId> {
        let mut confirmed = Vec::new();
        for (id, record) in &mut self.records {
            if record.state != WriteState::Pending {
                continue;
            }
            let settled = match &record.target {
                WriteTarget::TaskCreate(Some(task_id)) | WriteTarget::TaskUpdate(task_id) => {
                    present.contains(task_id)
                }
                WriteTarget::TaskDelete(task_id) => !present.contains(task_id),
                WriteTarget::TaskCreate(None) | WriteTarget::CommentAdd(_) => false,
            };
            if settled {
                record.state = WriteState::Confirmed;
                confirmed.push(id.clone());
            }
        }
        confirmed
    }

    /// Settles pending comment writes against the comment ids present in a
    /// fresh snapshot. Returns the ids of newly confirmed writes.
    pub(crate) fn reconcile_comments(&mut self, present: &HashSet<CommentId>) -> Vec<WriteId> {
        let mut confirmed = Vec::new();
        for (id, record) in &mut self.records {
            if record.state != WriteState::Pending {
                continue;
            }
            if let WriteTarget::CommentAdd(Some(comment_id)) = &record.target
                && present.contains(comment_id)
            {
                record.state = WriteState::Confirmed;
                confirmed.push(id.clone());
            }
        }
        confirmed
    }
}
