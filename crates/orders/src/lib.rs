//! Orders domain module (event-sourced).
//!
//! - `pricing`: subtotal, discount, shipping and total of a checkout
//! - `fulfillment`: per-vendor fulfillment state machine
//! - `order`: the Order aggregate holding the frozen pricing snapshot and
//!   one sub-order per vendor

pub mod fulfillment;
pub mod order;
pub mod pricing;

pub use fulfillment::{derive_order_status, FulfillmentStatus};
pub use order::{
    Order, OrderCommand, OrderEvent, OrderPlaced, PlaceOrder, TransitionOrder,
    TransitionVendorOrder, VendorOrder, VendorOrderDelivered, VendorOrderTransitioned,
    AGGREGATE_TYPE,
};
pub use pricing::{order_lines, price, AppliedPromo, LineItem, OrderLine, OrderPricingResult};
