//! Shipping zones and methods (event-sourced), plus the cost calculator.
//!
//! A zone owns its methods; quotes are computed from the zone's current
//! state and frozen into orders by the caller.

pub mod calculator;
pub mod zone;

pub use calculator::{method_cost, CostType, MethodTerms, ShippingQuote};
pub use zone::{
    AddShippingMethod, CreateShippingZone, DeleteShippingZone, RemoveShippingMethod,
    RenameShippingZone, SetShippingMethodActive, SetShippingZoneActive, ShippingMethod,
    ShippingMethodAdded, ShippingMethodRecord, ShippingMethodRemoved, ShippingMethodStatusChanged,
    ShippingMethodUpdated, ShippingZone, ShippingZoneCommand, ShippingZoneCreated,
    ShippingZoneDeleted, ShippingZoneEvent, ShippingZoneRecord, ShippingZoneRenamed,
    ShippingZoneStatusChanged, UpdateShippingMethod, AGGREGATE_TYPE,
};
