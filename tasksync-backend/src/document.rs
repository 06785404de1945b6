//! Untyped documents as the remote store holds them.
//!
//! The store knows nothing about tasks or comments; it moves documents with
//! named fields. Mapping documents to typed entities is the application's
//! job, which keeps one malformed document from poisoning a whole snapshot.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Field map carried by writes and documents.
pub type Fields = HashMap<String, FieldValue>;

/// A single field value in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// UTF-8 text.
    Text(String),
    /// Resolved wall-clock instant, epoch milliseconds.
    Timestamp(u64),
    /// Sentinel the store replaces with its own clock at commit time.
    ///
    /// Never appears in a stored document or a snapshot; only in write
    /// payloads.
    ServerTimestamp,
    /// Explicitly empty field.
    Null,
}

impl FieldValue {
    /// Shorthand for a text field.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }
}

/// A document: remote-assigned id plus its field map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within its collection.
    pub id: String,
    /// Named field values.
    pub fields: Fields,
}

impl Document {
    /// Creates a document from an id and its fields.
    #[must_use]
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Reads a text field, `None` when missing or not text.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Reads a resolved timestamp field, `None` when missing, unresolved,
    /// or not a timestamp.
    #[must_use]
    pub fn timestamp(&self, name: &str) -> Option<u64> {
        match self.fields.get(name) {
            Some(FieldValue::Timestamp(millis)) => Some(*millis),
            _ => None,
        }
    }
}
