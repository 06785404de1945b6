//! Comments attached to tasks.
//!
//! Comments are immutable once created and are destroyed only as a side
//! effect of deleting the owning task.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::TaskId;
use crate::time::Timestamp;
use crate::user::UserId;

/// Unique identifier for a comment, assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommentId(String);

impl CommentId {
    /// Creates a comment id from its string form.
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

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validation failure for a comment write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommentError {
    /// Comment text cannot be empty.
    #[error("comment text cannot be empty")]
    TextEmpty,
}

/// A comment on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Remote-assigned identifier.
    pub id: CommentId,
    /// Task this comment belongs to.
    pub task_id: TaskId,
    /// Author.
    pub user_id: UserId,
    /// Comment body, never empty.
    pub text: String,
    /// Server-assigned creation time, absent until server-resolved.
    pub created_at: Option<Timestamp>,
}

impl Comment {
    /// Validates comment text before a write is attempted.
    ///
    /// # Errors
    ///
    /// Returns [`CommentError::TextEmpty`] for blank text.
    pub fn validate_text(text: &str) -> Result<(), CommentError> {
        if text.trim().is_empty() {
            return Err(CommentError::TextEmpty);
        }
        Ok(())
    }
}
