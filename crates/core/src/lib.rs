//! `bazaar-core`: shared kernel for the marketplace economics engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! aggregate traits, the error taxonomy, strongly-typed identifiers and money.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, ErrorKind, PolicyViolation};
pub use id::{
    AggregateId, OrderId, ProductId, ShippingMethodId, ShippingZoneId, UserId, VendorId,
    WithdrawalId,
};
pub use money::{Money, Rate};
