//! Backend collaborator contracts for `TaskSync`.
//!
//! The application core talks to three external services: a document store
//! with live-query subscriptions, an identity provider, and a telemetry
//! sink. Each is a trait here, together with an in-process reference
//! implementation used by tests and the demo binary.

pub mod document;
pub mod identity;
pub mod memory;
pub mod store;
pub mod telemetry;

pub use document::{Document, FieldValue, Fields};
pub use identity::{AuthError, IdentityProvider, MemoryIdentity, Principal, SessionState};
pub use memory::MemoryBackend;
pub use store::{BackendError, CollectionEvent, DocumentStore, Subscription};
pub use telemetry::{NullSink, RecordingSink, TelemetryEvent, TelemetrySink, TracingSink};
