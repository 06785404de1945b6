//! Shared domain model for `TaskSync`.

pub mod comment;
pub mod task;
pub mod time;
pub mod user;

pub use comment::{Comment, CommentError, CommentId};
pub use task::{Priority, Task, TaskDraft, TaskId, TaskPatch, TaskStatus, ValidationError};
pub use time::Timestamp;
pub use user::{Role, User, UserId};
