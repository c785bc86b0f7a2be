//! Domain events and the in-process message bus.
//!
//! Domain crates implement [`Event`] for their event enums; the event store
//! records their metadata next to the payload. [`Notification`]s are the
//! integration-level messages the notifier fans out over an [`EventBus`].

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod notification;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use notification::Notification;
