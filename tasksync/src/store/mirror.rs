//! Mapping between remote documents and typed entities.
//!
//! This file owns the document schema in both directions: the field maps
//! the write paths send, and the snapshot mapping that rebuilds the
//! mirror. A document that cannot be mapped is logged and skipped so the
//! rest of its snapshot still lands.

use std::collections::HashMap;

use thiserror::Error;

use tasksync_backend::{Document, FieldValue, Fields};
use tasksync_model::{
    Comment, CommentId, Priority, Task, TaskDraft, TaskId, TaskPatch, TaskStatus, Timestamp,
    UserId,
};

// Field names shared by the write and mapping paths.
const TITLE: &str = "title";
const DESCRIPTION: &str = "description";
const CREATED_BY: &str = "createdBy";
const ASSIGNED_TO: &str = "assignedTo";
const CLIENT_ID: &str = "clientId";
const DEADLINE: &str = "deadline";
const PRIORITY: &str = "priority";
const STATUS: &str = "status";
const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";
pub(crate) const TASK_ID: &str = "taskId";
const USER_ID: &str = "userId";
const TEXT: &str = "text";

/// Why one document could not be mapped to its entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    /// A required field is absent or has the wrong shape.
    #[error("missing required field `{field}`")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },
    /// An enumerated field holds a string outside its value set.
    #[error("unrecognized {field} value `{value}`")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// The string the document carried.
        value: String,
    },
}

fn required<'doc>(doc: &'doc Document, field: &'static str) -> Result<&'doc str, MapError> {
    doc.text(field).ok_or(MapError::MissingField { field })
}

/// Maps one task document.
///
/// Timestamps the server has not resolved yet map to `None`; an
/// out-of-set priority or status string fails the whole document.
///
/// # Errors
///
/// Returns [`MapError`] when a required field is missing or an enumerated
/// field is unrecognized.
pub fn map_task(doc: &Document) -> Result<Task, MapError> {
    let priority_text = required(doc, PRIORITY)?;
    let priority = Priority::parse(priority_text).ok_or_else(|| MapError::InvalidValue {
        field: PRIORITY,
        value: priority_text.to_string(),
    })?;
    let status_text = required(doc, STATUS)?;
    let status = TaskStatus::parse(status_text).ok_or_else(|| MapError::InvalidValue {
        field: STATUS,
        value: status_text.to_string(),
    })?;

    Ok(Task {
        id: TaskId::new(&doc.id),
        title: required(doc, TITLE)?.to_string(),
        description: doc.text(DESCRIPTION).unwrap_or_default().to_string(),
        created_by: UserId::new(required(doc, CREATED_BY)?),
        assigned_to: UserId::new(required(doc, ASSIGNED_TO)?),
        client_id: UserId::new(required(doc, CLIENT_ID)?),
        deadline: doc.timestamp(DEADLINE).map(Timestamp::from_millis),
        priority,
        status,
        created_at: doc.timestamp(CREATED_AT).map(Timestamp::from_millis),
        updated_at: doc.timestamp(UPDATED_AT).map(Timestamp::from_millis),
    })
}

/// Maps one comment document.
///
/// # Errors
///
/// Returns [`MapError`] when a required field is missing.
pub fn map_comment(doc: &Document) -> Result<Comment, MapError> {
    Ok(Comment {
        id: CommentId::new(&doc.id),
        task_id: TaskId::new(required(doc, TASK_ID)?),
        user_id: UserId::new(required(doc, USER_ID)?),
        text: required(doc, TEXT)?.to_string(),
        created_at: doc.timestamp(CREATED_AT).map(Timestamp::from_millis),
    })
}

/// Maps a full task snapshot, keeping snapshot order and skipping
/// documents that fail to map.
pub(crate) fn collect_tasks(docs: &[Document]) -> Vec<Task> {
    docs.iter()
        .filter_map(|doc| match map_task(doc) {
            Ok(task) => Some(task),
            Err(err) => {
                tracing::warn!(id = %doc.id, %err, "skipping unmappable task document");
                None
            }
        })
        .collect()
}

/// Maps a full comment snapshot into per-task groups, preserving arrival
/// order within each group and skipping documents that fail to map.
pub(crate) fn collect_comments(docs: &[Document]) -> HashMap<TaskId, Vec<Comment>> {
    let mut grouped: HashMap<TaskId, Vec<Comment>> = HashMap::new();
    for doc in docs {
        match map_comment(doc) {
            Ok(comment) => grouped
                .entry(comment.task_id.clone())
                .or_default()
                .push(comment),
            Err(err) => {
                tracing::warn!(id = %doc.id, %err, "skipping unmappable comment document");
            }
        }
    }
    grouped
}

/// Builds the write payload for a task creation. Both timestamps are
/// server-assigned sentinels.
pub(crate) fn draft_fields(draft: &TaskDraft) -> Fields {
    let mut fields = Fields::from([
        (TITLE.to_string(), FieldValue::text(&draft.title)),
        (
            DESCRIPTION.to_string(),
            FieldValue::text(&draft.description),
        ),
        (
            CREATED_BY.to_string(),
            FieldValue::text(draft.created_by.as_str()),
        ),
        (
            ASSIGNED_TO.to_string(),
            FieldValue::text(draft.assigned_to.as_str()),
        ),
        (
            CLIENT_ID.to_string(),
            FieldValue::text(draft.client_id.as_str()),
        ),
        (PRIORITY.to_string(), FieldValue::text(draft.priority.as_str())),
        (STATUS.to_string(), FieldValue::text(draft.status.as_str())),
        (CREATED_AT.to_string(), FieldValue::ServerTimestamp),
        (UPDATED_AT.to_string(), FieldValue::ServerTimestamp),
    ]);
    if let Some(deadline) = draft.deadline {
        fields.insert(
            DEADLINE.to_string(),
            FieldValue::Timestamp(deadline.as_millis()),
        );
    }
    fields
}

/// Builds the write payload for a partial update: only the supplied
/// fields, plus the always-refreshed `updatedAt` sentinel.
pub(crate) fn patch_fields(patch: &TaskPatch) -> Fields {
    let mut fields = Fields::new();
    if let Some(title) = &patch.title {
        fields.insert(TITLE.to_string(), FieldValue::text(title));
    }
    if let Some(description) = &patch.description {
        fields.insert(DESCRIPTION.to_string(), FieldValue::text(description));
    }
    if let Some(assigned_to) = &patch.assigned_to {
        fields.insert(
            ASSIGNED_TO.to_string(),
            FieldValue::text(assigned_to.as_str()),
        );
    }
    if let Some(client_id) = &patch.client_id {
        fields.insert(CLIENT_ID.to_string(), FieldValue::text(client_id.as_str()));
    }
    if let Some(deadline) = patch.deadline {
        fields.insert(
            DEADLINE.to_string(),
            FieldValue::Timestamp(deadline.as_millis()),
        );
    }
    if let Some(priority) = patch.priority {
        fields.insert(PRIORITY.to_string(), FieldValue::text(priority.as_str()));
    }
    if let Some(status) = patch.status {
        fields.insert(STATUS.to_string(), FieldValue::text(status.as_str()));
    }
    fields.insert(UPDATED_AT.to_string(), FieldValue::ServerTimestamp);
    fields
}

/// Builds the write payload for a new comment.
pub(crate) fn comment_fields(task_id: &TaskId, user_id: &UserId, text: &str) -> Fields {
    Fields::from([
        (TASK_ID.to_string(), FieldValue::text(task_id.as_str())),
        (USER_ID.to_string(), FieldValue::text(user_id.as_str())),
        (TEXT.to_string(), FieldValue::text(text)),
        (CREATED_AT.to_string(), FieldValue::ServerTimestamp),
    ])
}

/// Field value the cascade delete queries comments by.
pub(crate) fn task_ref_value(task_id: &TaskId) -> FieldValue {
    FieldValue::text(task_id.as_str())
}
