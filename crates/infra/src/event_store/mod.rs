//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id and hold events of a single aggregate
//! type. Storage is abstracted behind [`EventStore`]; the in-memory
//! implementation is what the façade and tests run against.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
