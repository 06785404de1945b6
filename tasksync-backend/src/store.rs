//! The document-store contract the synchronization core is written against.
//!
//! Modeled on a managed document database with live queries: collections of
//! documents, single-document writes, a cross-document atomic delete batch,
//! and per-collection subscriptions that deliver a full snapshot on every
//! change. Implementations decide where the documents actually live; the
//! in-process [`MemoryBackend`](crate::memory::MemoryBackend) is the
//! reference.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::document::{Document, FieldValue, Fields};

/// Errors surfaced by document-store operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The store rejected a create, update, or delete.
    #[error("write rejected: {0}")]
    WriteRejected(String),
    /// The addressed document does not exist.
    #[error("document not found: {collection}/{id}")]
    NotFound {
        /// Collection that was addressed.
        collection: String,
        /// Document id that was addressed.
        id: String,
    },
    /// A read could not be served.
    #[error("read failed: {0}")]
    ReadFailed(String),
}

/// One delivery on a live subscription.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    /// Full current contents of the collection, replacing any prior view.
    /// Documents arrive in the store's insertion order.
    Snapshot(Vec<Document>),
    /// The subscription failed. No further snapshots will be delivered.
    Error(String),
}

/// An open live subscription to one collection.
///
/// The subscription is the unsubscribe handle: calling [`cancel`] or
/// dropping the value ends delivery and releases the store-side slot.
///
/// [`cancel`]: Subscription::cancel
#[derive(Debug)]
pub struct Subscription {
    collection: String,
    events: mpsc::Receiver<CollectionEvent>,
}

impl Subscription {
    /// Wraps a receiving channel as a subscription. Store implementations
    /// keep the sending half.
    #[must_use]
    pub fn new(collection: impl Into<String>, events: mpsc::Receiver<CollectionEvent>) -> Self {
        Self {
            collection: collection.into(),
            events,
        }
    }

    /// The collection this subscription watches.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Waits for the next delivery. `None` once the subscription has ended,
    /// whether cancelled here or closed by the store.
    pub async fn next_event(&mut self) -> Option<CollectionEvent> {
        self.events.recv().await
    }

    /// Stops delivery. Already-buffered events may still be drained with
    /// [`next_event`](Self::next_event); after that the stream ends.
    pub fn cancel(&mut self) {
        self.events.close();
    }
}

/// Remote document store with live-query subscriptions.
///
/// All writes resolve [`FieldValue::ServerTimestamp`] sentinels against the
/// store's clock at commit time. Reads used by the synchronization core go
/// through subscriptions, not ad-hoc queries; [`get`](Self::get) and
/// [`query_where`](Self::query_where) exist for the profile directory and
/// the cascade delete.
pub trait DocumentStore: Send + Sync {
    /// Opens a live subscription to `collection`, buffering up to `buffer`
    /// undelivered events. The current contents arrive as the first
    /// snapshot.
    fn subscribe(
        &self,
        collection: &str,
        buffer: usize,
    ) -> impl std::future::Future<Output = Subscription> + Send;

    /// Creates a document with a store-assigned id; returns the id.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WriteRejected`] when the store refuses the
    /// write.
    fn add(
        &self,
        collection: &str,
        fields: Fields,
    ) -> impl std::future::Future<Output = Result<String, BackendError>> + Send;

    /// Creates or replaces the document at a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WriteRejected`] when the store refuses the
    /// write.
    fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;

    /// Fetches one document by id, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ReadFailed`] when the store cannot serve the
    /// read; the reference backend's reads are infallible.
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Document>, BackendError>> + Send;

    /// Merges `fields` into an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] when the document does not exist
    /// and [`BackendError::WriteRejected`] when the store refuses the write.
    fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;

    /// Deletes one document. Deleting an absent document is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WriteRejected`] when the store refuses the
    /// write.
    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;

    /// Returns every document whose `field` equals `value`, in insertion
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::ReadFailed`] when the store cannot serve the
    /// read.
    fn query_where(
        &self,
        collection: &str,
        field: &str,
        value: &FieldValue,
    ) -> impl std::future::Future<Output = Result<Vec<Document>, BackendError>> + Send;

    /// Deletes the given documents as one atomic batch: either all deletes
    /// commit or none do. Absent ids are skipped, matching
    /// [`delete`](Self::delete).
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::WriteRejected`] when the batch is refused;
    /// on error no document has been deleted.
    fn delete_batch(
        &self,
        collection: &str,
        ids: &[String],
    ) -> impl std::future::Future<Output = Result<(), BackendError>> + Send;
}
