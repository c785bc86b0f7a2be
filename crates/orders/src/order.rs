use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, Money, OrderId, PolicyViolation, Rate,
    UserId, VendorId,
};
use bazaar_events::Event;
use bazaar_shipping::ShippingQuote;

use crate::fulfillment::{derive_order_status, FulfillmentStatus};
use crate::pricing::{vendor_amounts, AppliedPromo, OrderLine, OrderPricingResult};

pub const AGGREGATE_TYPE: &str = "orders.order";

/// The slice of an order fulfilled by one vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorOrder {
    pub vendor_id: VendorId,
    pub status: FulfillmentStatus,
    /// Sum of this vendor's line totals.
    pub amount: Money,
    /// Commission rate frozen when the sub-order was delivered.
    pub commission_rate: Option<Rate>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    customer_id: Option<UserId>,
    lines: Vec<OrderLine>,
    subtotal: Money,
    discount: Money,
    shipping_cost: Money,
    total: Money,
    promo: Option<AppliedPromo>,
    shipping: Option<ShippingQuote>,
    sub_orders: BTreeMap<VendorId, VendorOrder>,
    placed_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            customer_id: None,
            lines: Vec::new(),
            subtotal: Money::ZERO,
            discount: Money::ZERO,
            shipping_cost: Money::ZERO,
            total: Money::ZERO,
            promo: None,
            shipping: None,
            sub_orders: BTreeMap::new(),
            placed_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn customer_id(&self) -> Option<UserId> {
        self.customer_id
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn promo(&self) -> Option<&AppliedPromo> {
        self.promo.as_ref()
    }

    pub fn shipping(&self) -> Option<&ShippingQuote> {
        self.shipping.as_ref()
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn sub_orders(&self) -> impl Iterator<Item = &VendorOrder> {
        self.sub_orders.values()
    }

    pub fn sub_order(&self, vendor_id: VendorId) -> Option<&VendorOrder> {
        self.sub_orders.get(&vendor_id)
    }

    pub fn vendors(&self) -> impl Iterator<Item = VendorId> + '_ {
        self.sub_orders.keys().copied()
    }

    /// Order-level fulfillment status, derived from the sub-orders.
    pub fn status(&self) -> FulfillmentStatus {
        derive_order_status(self.sub_orders.values().map(|s| s.status))
            .unwrap_or(FulfillmentStatus::Pending)
    }

    fn ensure_created(&self) -> DomainResult<()> {
        if !self.created {
            return Err(DomainError::not_found("order", self.id));
        }
        Ok(())
    }

    fn ensure_sub_order(&self, vendor_id: VendorId) -> DomainResult<&VendorOrder> {
        self.sub_orders
            .get(&vendor_id)
            .ok_or_else(|| DomainError::not_found("vendor order", format!("{}/{}", self.id, vendor_id)))
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub pricing: OrderPricingResult,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionOrder (every sub-order, all or nothing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOrder {
    pub to: FulfillmentStatus,
    /// Current commission rate per vendor; required when `to` is `delivered`.
    #[serde(default)]
    pub commission_rates: BTreeMap<VendorId, Rate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionVendorOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionVendorOrder {
    pub vendor_id: VendorId,
    pub to: FulfillmentStatus,
    /// Current commission rate of the vendor; required when `to` is `delivered`.
    #[serde(default)]
    pub commission_rate: Option<Rate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    TransitionOrder(TransitionOrder),
    TransitionVendorOrder(TransitionVendorOrder),
}

/// Event: OrderPlaced. Carries the frozen pricing snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub pricing: OrderPricingResult,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VendorOrderTransitioned (any non-delivery transition).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorOrderTransitioned {
    pub order_id: OrderId,
    pub vendor_id: VendorId,
    pub from: FulfillmentStatus,
    pub to: FulfillmentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VendorOrderDelivered. Freezes the commission rate for settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorOrderDelivered {
    pub order_id: OrderId,
    pub vendor_id: VendorId,
    pub from: FulfillmentStatus,
    pub commission_rate: Rate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    VendorOrderTransitioned(VendorOrderTransitioned),
    VendorOrderDelivered(VendorOrderDelivered),
}

impl OrderEvent {
    /// `(vendor, from, to)` for fulfillment events.
    pub fn transition(&self) -> Option<(VendorId, FulfillmentStatus, FulfillmentStatus)> {
        match self {
            OrderEvent::OrderPlaced(_) => None,
            OrderEvent::VendorOrderTransitioned(e) => Some((e.vendor_id, e.from, e.to)),
            OrderEvent::VendorOrderDelivered(e) => {
                Some((e.vendor_id, e.from, FulfillmentStatus::Delivered))
            }
        }
    }
}

impl Event for OrderEvent {
    fn aggregate_type(&self) -> &'static str {
        AGGREGATE_TYPE
    }

    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::VendorOrderTransitioned(_) => "orders.order.vendor_order_transitioned",
            OrderEvent::VendorOrderDelivered(_) => "orders.order.vendor_order_delivered",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::VendorOrderTransitioned(e) => e.occurred_at,
            OrderEvent::VendorOrderDelivered(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                let p = &e.pricing;
                self.id = e.order_id;
                self.customer_id = Some(e.customer_id);
                self.lines = p.lines.clone();
                self.subtotal = p.subtotal;
                self.discount = p.discount;
                self.shipping_cost = p.shipping_cost;
                self.total = p.total;
                self.promo = p.promo.clone();
                self.shipping = Some(p.shipping.clone());
                self.sub_orders = vendor_amounts(&p.lines)
                    .into_iter()
                    .map(|(vendor_id, amount)| {
                        let sub = VendorOrder {
                            vendor_id,
                            status: FulfillmentStatus::Pending,
                            amount,
                            commission_rate: None,
                            delivered_at: None,
                            updated_at: e.occurred_at,
                        };
                        (vendor_id, sub)
                    })
                    .collect();
                self.placed_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::VendorOrderTransitioned(e) => {
                if let Some(sub) = self.sub_orders.get_mut(&e.vendor_id) {
                    sub.status = e.to;
                    sub.updated_at = e.occurred_at;
                }
                self.updated_at = Some(e.occurred_at);
            }
            OrderEvent::VendorOrderDelivered(e) => {
                if let Some(sub) = self.sub_orders.get_mut(&e.vendor_id) {
                    sub.status = FulfillmentStatus::Delivered;
                    sub.commission_rate = Some(e.commission_rate);
                    sub.delivered_at = Some(e.occurred_at);
                    sub.updated_at = e.occurred_at;
                }
                self.updated_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::TransitionOrder(cmd) => self.handle_transition_order(cmd),
            OrderCommand::TransitionVendorOrder(cmd) => self.handle_transition_vendor_order(cmd),
        }
    }
}

impl Order {
    fn handle_place(&self, cmd: &PlaceOrder) -> DomainResult<Vec<OrderEvent>> {
        if self.created {
            return Err(PolicyViolation::AlreadyExists(format!("order '{}'", self.id)).into());
        }
        if cmd.order_id != self.id {
            return Err(DomainError::validation("order_id mismatch"));
        }

        let p = &cmd.pricing;
        if p.lines.is_empty() {
            return Err(DomainError::validation("order must contain at least one line item"));
        }
        let subtotal: Money = p.lines.iter().map(OrderLine::line_total).sum();
        if subtotal != p.subtotal || p.total != p.subtotal.saturating_sub(p.discount) + p.shipping_cost {
            return Err(DomainError::validation("pricing snapshot is inconsistent"));
        }

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            pricing: cmd.pricing.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition_order(&self, cmd: &TransitionOrder) -> DomainResult<Vec<OrderEvent>> {
        self.ensure_created()?;

        // Settled sub-orders stay put; one illegal move among the rest rejects the lot.
        let in_flight: Vec<&VendorOrder> = self
            .sub_orders
            .values()
            .filter(|sub| !sub.status.is_terminal())
            .collect();
        if in_flight.is_empty() {
            return Err(DomainError::invalid_transition(self.status(), cmd.to));
        }

        in_flight
            .into_iter()
            .map(|sub| {
                let rate = cmd.commission_rates.get(&sub.vendor_id).copied();
                self.decide_transition(sub, cmd.to, rate, cmd.occurred_at)
            })
            .collect()
    }

    fn handle_transition_vendor_order(&self, cmd: &TransitionVendorOrder) -> DomainResult<Vec<OrderEvent>> {
        self.ensure_created()?;
        let sub = self.ensure_sub_order(cmd.vendor_id)?;

        Ok(vec![self.decide_transition(sub, cmd.to, cmd.commission_rate, cmd.occurred_at)?])
    }

    fn decide_transition(
        &self,
        sub: &VendorOrder,
        to: FulfillmentStatus,
        commission_rate: Option<Rate>,
        occurred_at: DateTime<Utc>,
    ) -> DomainResult<OrderEvent> {
        let from = sub.status;
        from.transition(to)?;

        if to == FulfillmentStatus::Delivered {
            let commission_rate = commission_rate.ok_or_else(|| {
                DomainError::validation(format!(
                    "commission rate of vendor '{}' is required to deliver",
                    sub.vendor_id
                ))
            })?;
            return Ok(OrderEvent::VendorOrderDelivered(VendorOrderDelivered {
                order_id: self.id,
                vendor_id: sub.vendor_id,
                from,
                commission_rate,
                occurred_at,
            }));
        }

        Ok(OrderEvent::VendorOrderTransitioned(VendorOrderTransitioned {
            order_id: self.id,
            vendor_id: sub.vendor_id,
            from,
            to,
            occurred_at,
        }))
    }
}
