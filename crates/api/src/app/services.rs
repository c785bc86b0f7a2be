//! Service wiring behind the HTTP handlers.

use std::sync::Arc;

use bazaar_events::{InMemoryEventBus, Notification};
use bazaar_infra::{BusNotifier, InMemoryVendorDirectory, Marketplace};

/// Everything a handler can reach.
///
/// The vendor directory is kept concretely so vendor accounts can be
/// administered over HTTP; the façade only sees it as a `VendorDirectory`.
#[derive(Debug)]
pub struct AppServices {
    pub market: Marketplace,
    pub vendors: Arc<InMemoryVendorDirectory>,
}

/// In-memory wiring. Notifications are published onto `bus`; whoever
/// subscribes delivers them.
pub fn build_services(bus: Arc<InMemoryEventBus<Notification>>) -> AppServices {
    let vendors = Arc::new(InMemoryVendorDirectory::new());
    let market = Marketplace::in_memory(vendors.clone(), Arc::new(BusNotifier::new(bus)));
    AppServices { market, vendors }
}
