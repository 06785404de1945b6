//! Task entity, drafts, partial updates, and field validation.
//!
//! Tasks live in the remote `tasks` collection and are mirrored locally by
//! the synchronization store. [`TaskDraft`] is what a create call supplies
//! (everything except the server-assigned id and timestamps); [`TaskPatch`]
//! is a partial update where absent fields are left untouched remotely.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::Timestamp;
use crate::user::UserId;

/// Maximum allowed task title length in characters.
pub const MAX_TITLE_LENGTH: usize = 256;

/// Unique identifier for a task.
///
/// Opaque string assigned by the remote store on creation, immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task id from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task urgency level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Routine work.
    Low,
    /// Default urgency.
    Medium,
    /// Needs attention first.
    High,
}

impl Priority {
    /// Numeric severity used by the priority sort: higher is more urgent.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    /// Parses the stored string form of a priority.
    ///
    /// Any other string is a mapping failure for the document carrying it.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    /// Returns the stored string form of this priority.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a task sits in its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Created, not yet started.
    Pending,
    /// Actively being worked.
    InProgress,
    /// Finished.
    Completed,
    /// Abandoned without completion.
    Cancelled,
}

impl TaskStatus {
    /// Position in the status sort order: completed, in-progress, pending,
    /// cancelled.
    #[must_use]
    pub const fn workflow_rank(self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::InProgress => 1,
            Self::Pending => 2,
            Self::Cancelled => 3,
        }
    }

    /// Parses the stored string form of a status.
    ///
    /// Any other string is a mapping failure for the document carrying it.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns the stored string form of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validation failures caught client-side before any write is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max {MAX_TITLE_LENGTH} characters)")]
    TitleTooLong,
}

/// A task as mirrored from the remote store.
///
/// The two server-assigned timestamps are `None` when a snapshot arrives
/// before the server has resolved them; the next snapshot fills them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Remote-assigned identifier, unique within the collection.
    pub id: TaskId,
    /// Short summary, never empty.
    pub title: String,
    /// Free-form details, may be empty.
    pub description: String,
    /// User who created the task.
    pub created_by: UserId,
    /// User currently responsible for the task.
    pub assigned_to: UserId,
    /// Client account the task is performed for.
    pub client_id: UserId,
    /// Due date, absent when the task has none.
    pub deadline: Option<Timestamp>,
    /// Urgency level.
    pub priority: Priority,
    /// Workflow position.
    pub status: TaskStatus,
    /// Server-assigned creation time, never changed afterwards.
    pub created_at: Option<Timestamp>,
    /// Server-refreshed on every mutation.
    pub updated_at: Option<Timestamp>,
}

/// Fields supplied when creating a task.
///
/// Excludes the id and both timestamps, which the remote store assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    /// Short summary, validated non-empty.
    pub title: String,
    /// Free-form details.
    pub description: String,
    /// Creating user.
    pub created_by: UserId,
    /// Initially responsible user.
    pub assigned_to: UserId,
    /// Client account the task is performed for.
    pub client_id: UserId,
    /// Optional due date.
    pub deadline: Option<Timestamp>,
    /// Urgency level.
    pub priority: Priority,
    /// Initial workflow position.
    pub status: TaskStatus,
}

impl TaskDraft {
    /// Validates the draft's fields.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TitleEmpty`] for a blank title and
    /// [`ValidationError::TitleTooLong`] past [`MAX_TITLE_LENGTH`] characters.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)
    }

    /// Builds the locally-constructed task a create call returns before the
    /// authoritative snapshot arrives, stamping both timestamps from the
    /// local clock.
    #[must_use]
    pub fn into_provisional(self, id: TaskId, now: Timestamp) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            created_by: self.created_by,
            assigned_to: self.assigned_to,
            client_id: self.client_id,
            deadline: self.deadline,
            priority: self.priority,
            status: self.status,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// A partial update to a task.
///
/// `None` fields are left untouched remotely. The patch cannot clear an
/// existing deadline, and the creator is never reassigned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Replacement title, validated non-empty when present.
    pub title: Option<String>,
    /// Replacement description.
    pub description: Option<String>,
    /// Reassignment target.
    pub assigned_to: Option<UserId>,
    /// Replacement client account.
    pub client_id: Option<UserId>,
    /// New due date.
    pub deadline: Option<Timestamp>,
    /// New urgency level.
    pub priority: Option<Priority>,
    /// New workflow position.
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    /// Validates the fields present in the patch.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TitleEmpty`] or
    /// [`ValidationError::TitleTooLong`] when a supplied title is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        Ok(())
    }

    /// Applies every present field onto `task`, leaving the rest untouched.
    ///
    /// Does not touch `updated_at`; the caller stamps it, mirroring the
    /// server-side refresh.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(assigned_to) = &self.assigned_to {
            task.assigned_to = assigned_to.clone();
        }
        if let Some(client_id) = &self.client_id {
            task.client_id = client_id.clone();
        }
        if let Some(deadline) = self.deadline {
            task.deadline = Some(deadline);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
    }

    /// Returns `true` when the patch carries no fields.
    ///
    /// An empty patch is still a legal update: the remote store refreshes
    /// `updated_at` regardless of which fields changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.assigned_to.is_none()
            && self.client_id.is_none()
            && self.deadline.is_none()
            && self.priority.is_none()
            && self.status.is_none()
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::TitleEmpty);
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TitleTooLong);
    }
    Ok(())
}
