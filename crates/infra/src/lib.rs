//! Infrastructure layer: storage seams, the command dispatcher and the
//! marketplace façade wiring domain aggregates to them.

pub mod command_dispatcher;
pub mod config_store;
pub mod event_store;
pub mod marketplace;
pub mod notifier;
pub mod order_store;
pub mod vendor_directory;

mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, Decision, DispatchError};
pub use config_store::{ConfigStoreError, ConfigurationStore, InMemoryConfigurationStore};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore};
pub use marketplace::{ConfigurationSummary, Marketplace, ShippingSelection};
pub use notifier::{BusNotifier, Notifier, NotifyError};
pub use order_store::{EventSourcedOrderStore, OrderStore};
pub use vendor_directory::{DirectoryError, InMemoryVendorDirectory, VendorAccount, VendorDirectory};
