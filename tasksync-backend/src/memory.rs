//! In-process reference implementation of [`DocumentStore`].
//!
//! Collections are insertion-ordered document lists behind an async lock,
//! so snapshot order is stable across deliveries. Every committed mutation
//! publishes a fresh full snapshot to each live subscriber. Failure
//! injection switches let tests exercise rejected writes, failed delete
//! batches, and broken subscriptions without a second implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::document::{Document, FieldValue, Fields};
use crate::store::{BackendError, CollectionEvent, DocumentStore, Subscription};

/// One named collection: its documents and the live subscribers watching it.
#[derive(Debug, Default)]
struct Collection {
    documents: Vec<Document>,
    subscribers: Vec<mpsc::Sender<CollectionEvent>>,
}

impl Collection {
    /// Drops subscribers whose receiving half is gone, then returns the
    /// senders and a snapshot clone to deliver after the lock is released.
    fn publish_targets(&mut self) -> (Vec<mpsc::Sender<CollectionEvent>>, Vec<Document>) {
        self.subscribers.retain(|tx| !tx.is_closed());
        (self.subscribers.clone(), self.documents.clone())
    }
}

/// In-memory document store with live snapshot subscriptions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Collection>>,
    fail_writes: AtomicBool,
    fail_batch_deletes: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test control: when set, every `add`/`set`/`update`/`delete` is
    /// rejected with [`BackendError::WriteRejected`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Test control: when set, `delete_batch` is rejected while
    /// single-document writes keep working. Lets tests break the comment
    /// cascade after the task delete has already committed.
    pub fn set_fail_batch_deletes(&self, fail: bool) {
        self.fail_batch_deletes.store(fail, Ordering::SeqCst);
    }

    /// Test control: delivers a terminal error to every live subscriber of
    /// `collection` and closes their streams.
    pub async fn inject_subscription_error(&self, collection: &str, message: &str) {
        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return;
        };
        let senders = std::mem::take(&mut entry.subscribers);
        drop(collections);

        for tx in senders {
            let _ = tx.send(CollectionEvent::Error(message.to_string())).await;
        }
    }

    /// Number of live subscribers on `collection`, after pruning ones whose
    /// receiving half is gone.
    pub async fn subscriber_count(&self, collection: &str) -> usize {
        let mut collections = self.collections.write().await;
        collections.get_mut(collection).map_or(0, |entry| {
            entry.subscribers.retain(|tx| !tx.is_closed());
            entry.subscribers.len()
        })
    }

    fn check_write_allowed(&self) -> Result<(), BackendError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::WriteRejected(
                "injected write failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn deliver(senders: Vec<mpsc::Sender<CollectionEvent>>, snapshot: Vec<Document>) {
        for tx in senders {
            let _ = tx.send(CollectionEvent::Snapshot(snapshot.clone())).await;
        }
    }
}

/// Replaces every [`FieldValue::ServerTimestamp`] sentinel with the store
/// clock, so sentinels never reach a stored document.
fn resolve_server_timestamps(fields: &mut Fields, now: u64) {
    for value in fields.values_mut() {
        if *value == FieldValue::ServerTimestamp {
            *value = FieldValue::Timestamp(now);
        }
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

impl DocumentStore for MemoryBackend {
    async fn subscribe(&self, collection: &str, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        entry.subscribers.push(tx.clone());
        let snapshot = entry.documents.clone();
        drop(collections);

        // The fresh channel always has room for the initial snapshot.
        let _ = tx.send(CollectionEvent::Snapshot(snapshot)).await;
        tracing::debug!(collection, "subscription opened");
        Subscription::new(collection, rx)
    }

    async fn add(&self, collection: &str, mut fields: Fields) -> Result<String, BackendError> {
        self.check_write_allowed()?;
        resolve_server_timestamps(&mut fields, now_millis());
        let id = Uuid::now_v7().to_string();

        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        entry.documents.push(Document::new(id.clone(), fields));
        let (senders, snapshot) = entry.publish_targets();
        drop(collections);

        tracing::debug!(collection, id = %id, "document added");
        Self::deliver(senders, snapshot).await;
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, mut fields: Fields) -> Result<(), BackendError> {
        self.check_write_allowed()?;
        resolve_server_timestamps(&mut fields, now_millis());

        let mut collections = self.collections.write().await;
        let entry = collections.entry(collection.to_string()).or_default();
        if let Some(doc) = entry.documents.iter_mut().find(|d| d.id == id) {
            doc.fields = fields;
        } else {
            entry.documents.push(Document::new(id, fields));
        }
        let (senders, snapshot) = entry.publish_targets();
        drop(collections);

        tracing::debug!(collection, id, "document set");
        Self::deliver(senders, snapshot).await;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError> {
        let collections = self.collections.read().await;
        let found = collections
            .get(collection)
            .and_then(|entry| entry.documents.iter().find(|d| d.id == id).cloned());
        Ok(found)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        mut fields: Fields,
    ) -> Result<(), BackendError> {
        self.check_write_allowed()?;
        resolve_server_timestamps(&mut fields, now_millis());

        let mut collections = self.collections.write().await;
        let Some(doc) = collections
            .get_mut(collection)
            .and_then(|entry| entry.documents.iter_mut().find(|d| d.id == id))
        else {
            return Err(BackendError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        };
        doc.fields.extend(fields);

        let (senders, snapshot) = collections
            .get_mut(collection)
            .map(Collection::publish_targets)
            .unwrap_or_default();
        drop(collections);

        tracing::debug!(collection, id, "document updated");
        Self::deliver(senders, snapshot).await;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        self.check_write_allowed()?;

        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(());
        };
        let before = entry.documents.len();
        entry.documents.retain(|d| d.id != id);
        if entry.documents.len() == before {
            // Absent document: idempotent success, nothing to publish.
            return Ok(());
        }
        let (senders, snapshot) = entry.publish_targets();
        drop(collections);

        tracing::debug!(collection, id, "document deleted");
        Self::deliver(senders, snapshot).await;
        Ok(())
    }

    async fn query_where(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<Vec<Document>, BackendError> {
        let collections = self.collections.read().await;
        let matches = collections.get(collection).map_or_else(Vec::new, |entry| {
            entry
                .documents
                .iter()
                .filter(|d| d.fields.get(field) == Some(value))
                .cloned()
                .collect()
        });
        Ok(matches)
    }

    async fn delete_batch(&self, collection: &str, ids: &[String]) -> Result<(), BackendError> {
        if self.fail_batch_deletes.load(Ordering::SeqCst) {
            return Err(BackendError::WriteRejected(
                "injected batch delete failure".to_string(),
            ));
        }
        self.check_write_allowed()?;

        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(());
        };
        let before = entry.documents.len();
        entry.documents.retain(|d| !ids.contains(&d.id));
        if entry.documents.len() == before {
            return Ok(());
        }
        let removed = before - entry.documents.len();
        let (senders, snapshot) = entry.publish_targets();
        drop(collections);

        tracing::debug!(collection, removed, "batch delete committed");
        Self::deliver(senders, snapshot).await;
        Ok(())
    }
}
