use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{
    AggregateRoot, DomainError, Money, OrderId, Rate, ShippingMethodId, ShippingZoneId, UserId,
    VendorId,
};
use bazaar_infra::ShippingSelection;
use bazaar_orders::{AppliedPromo, FulfillmentStatus, LineItem, Order, OrderLine, VendorOrder};
use bazaar_promotions::{PromoCode, PromoTerms};
use bazaar_settlement::{PayoutDetails, VendorStatus, WithdrawalDecision};
use bazaar_shipping::{MethodTerms, ShippingMethod, ShippingQuote, ShippingZone};

use crate::app::errors;

fn active() -> bool {
    true
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreatePromoCodeRequest {
    pub code: String,
    pub terms: PromoTerms,
    #[serde(default = "active")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct EvaluatePromoRequest {
    pub code: String,
    pub subtotal: Decimal,
    pub user_id: UserId,
    /// Evaluation instant; defaults to now.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,
    #[serde(default = "active")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct AddMethodRequest {
    pub terms: MethodTerms,
    #[serde(default = "active")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub zone_id: ShippingZoneId,
    pub method_id: ShippingMethodId,
    pub subtotal: Decimal,
    #[serde(default)]
    pub weight: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct PriceOrderRequest {
    pub customer_id: UserId,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub promo_code: Option<String>,
    pub shipping: ShippingSelection,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub promo_code: Option<String>,
    pub shipping: ShippingSelection,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: FulfillmentStatus,
}

#[derive(Debug, Deserialize)]
pub struct PutVendorRequest {
    pub commission_rate: Rate,
    #[serde(default = "active_vendor")]
    pub status: VendorStatus,
}

fn active_vendor() -> VendorStatus {
    VendorStatus::Active
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalBody {
    pub amount: Decimal,
    pub payout: PayoutDetails,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub decision: WithdrawalDecision,
    #[serde(default)]
    pub note: Option<String>,
}

// -------------------------
// Response views
// -------------------------

#[derive(Debug, Serialize)]
pub struct PromoCodeView {
    pub code: String,
    pub is_active: bool,
    pub used_count: u32,
    pub terms: Option<PromoTerms>,
}

impl From<&PromoCode> for PromoCodeView {
    fn from(promo: &PromoCode) -> Self {
        Self {
            code: promo.code().to_string(),
            is_active: promo.is_active(),
            used_count: promo.used_count(),
            terms: promo.terms().cloned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShippingZoneView {
    pub id: ShippingZoneId,
    pub name: String,
    pub is_active: bool,
    pub methods: Vec<ShippingMethod>,
}

impl From<&ShippingZone> for ShippingZoneView {
    fn from(zone: &ShippingZone) -> Self {
        Self {
            id: *zone.id(),
            name: zone.name().to_string(),
            is_active: zone.is_active(),
            methods: zone.methods().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub customer_id: Option<UserId>,
    pub status: FulfillmentStatus,
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub promo: Option<AppliedPromo>,
    pub shipping: Option<ShippingQuote>,
    pub sub_orders: Vec<VendorOrder>,
    pub placed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id_typed(),
            customer_id: order.customer_id(),
            status: order.status(),
            lines: order.lines().to_vec(),
            subtotal: order.subtotal(),
            discount: order.discount(),
            shipping_cost: order.shipping_cost(),
            total: order.total(),
            promo: order.promo().cloned(),
            shipping: order.shipping().cloned(),
            sub_orders: order.sub_orders().cloned().collect(),
            placed_at: order.placed_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub vendor_id: VendorId,
    pub balance: Money,
}

// -------------------------
// Path parsing
// -------------------------

/// Parse a typed id from a path segment, or a 400 response.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(errors::domain_error_to_response)
}
