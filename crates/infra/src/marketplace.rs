//! Marketplace façade: the engine's exposed operations.
//!
//! Every mutation is read-check-write against the event store. Checkout is
//! the one multi-aggregate write: the promo redemption and the order are
//! decided separately and committed in a single atomic append, so two
//! checkouts racing for the last promo use cannot both succeed.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion, Money, OrderId, PolicyViolation,
    ShippingMethodId, ShippingZoneId, UserId, VendorId, WithdrawalId,
};
use bazaar_events::{Event, Notification};
use bazaar_orders::{
    order_lines, price, FulfillmentStatus, LineItem, Order, OrderCommand, OrderEvent, OrderLine,
    OrderPricingResult, PlaceOrder, TransitionOrder, TransitionVendorOrder,
    AGGREGATE_TYPE as ORDER_TYPE,
};
use bazaar_promotions::{
    ActivatePromoCode, CreatePromoCode, DeactivatePromoCode,
    Discount, PromoCode, PromoCodeCommand, PromoCodeEvent, PromoCodeRecord, PromoTerms, RedeemPromoCode,
    UpdatePromoTerms, AGGREGATE_TYPE as PROMO_CODE_TYPE,
};
use bazaar_settlement::{
    accrued_net, balance_of, pending_transactions, statement, transactions_for, BalanceCache,
    DecideWithdrawal, HistoryFingerprint, PayoutDetails, RequestWithdrawal, Transaction,
    VendorPayouts, VendorPayoutsCommand, VendorStatement, WithdrawalDecision, WithdrawalRequest,
    WithdrawalRequestRecord, AGGREGATE_TYPE as PAYOUTS_TYPE,
};
use bazaar_shipping::{
    AddShippingMethod, CreateShippingZone, DeleteShippingZone, MethodTerms, RemoveShippingMethod,
    RenameShippingZone, SetShippingMethodActive, SetShippingZoneActive, ShippingMethod,
    ShippingMethodRecord, ShippingQuote, ShippingZone, ShippingZoneCommand, ShippingZoneRecord,
    UpdateShippingMethod, AGGREGATE_TYPE as ZONE_TYPE,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config_store::{
    load_records, to_values, ConfigurationStore, InMemoryConfigurationStore, PROMO_CODES,
    SHIPPING_METHODS, SHIPPING_ZONES, WITHDRAWAL_REQUESTS,
};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::notifier::{notify_best_effort, Notifier};
use crate::order_store::{EventSourcedOrderStore, OrderStore};
use crate::vendor_directory::VendorDirectory;

/// Shipping choice made at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSelection {
    pub zone_id: ShippingZoneId,
    pub method_id: ShippingMethodId,
    /// Parcel weight in kg; only weight-based methods read it.
    #[serde(default)]
    pub weight: Option<Decimal>,
}

/// Record counts of a configuration import or export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub promo_codes: usize,
    pub shipping_zones: usize,
    pub shipping_methods: usize,
    pub withdrawal_requests: usize,
    /// Records already present (import only).
    pub skipped: usize,
}

fn non_blank(code: Option<&str>) -> Option<&str> {
    code.filter(|code| !code.trim().is_empty())
}

/// Discount recorded by a redemption decision; `None` when nothing was redeemed.
fn redeemed_discount(events: &[PromoCodeEvent]) -> Option<Discount> {
    events.iter().find_map(|event| match event {
        PromoCodeEvent::PromoCodeRedeemed(e) => Some(Discount {
            code: e.code.clone(),
            amount: e.discount,
        }),
        _ => None,
    })
}

fn make_zone(id: AggregateId) -> ShippingZone {
    ShippingZone::empty(id.into())
}

fn make_order(id: AggregateId) -> Order {
    Order::empty(id.into())
}

fn make_payouts(id: AggregateId) -> VendorPayouts {
    VendorPayouts::empty(id.into())
}

/// Count an imported record, or a skip if it already exists.
fn tally(result: Result<(), DispatchError>, count: &mut usize, skipped: &mut usize) -> Result<(), DispatchError> {
    match result {
        Ok(()) => *count += 1,
        Err(err) if is_already_exists(&err) => *skipped += 1,
        Err(err) => return Err(err),
    }
    Ok(())
}

fn is_already_exists(err: &DispatchError) -> bool {
    matches!(
        err.domain().and_then(DomainError::policy),
        Some(PolicyViolation::AlreadyExists(_))
    )
}

pub struct Marketplace {
    dispatcher: CommandDispatcher<Arc<dyn EventStore>>,
    orders: Arc<dyn OrderStore>,
    vendors: Arc<dyn VendorDirectory>,
    config: Arc<dyn ConfigurationStore>,
    notifier: Arc<dyn Notifier>,
    balances: Mutex<BalanceCache>,
}

impl Marketplace {
    pub fn new(
        store: Arc<dyn EventStore>,
        vendors: Arc<dyn VendorDirectory>,
        config: Arc<dyn ConfigurationStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let orders: Arc<dyn OrderStore> = Arc::new(EventSourcedOrderStore::new(store.clone()));
        Self {
            dispatcher: CommandDispatcher::new(store),
            orders,
            vendors,
            config,
            notifier,
            balances: Mutex::new(BalanceCache::new()),
        }
    }

    /// Engine over in-memory event and configuration stores.
    pub fn in_memory(vendors: Arc<dyn VendorDirectory>, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            vendors,
            Arc::new(InMemoryConfigurationStore::new()),
            notifier,
        )
    }

    pub fn configuration_store(&self) -> &Arc<dyn ConfigurationStore> {
        &self.config
    }

    fn balances(&self) -> MutexGuard<'_, BalanceCache> {
        // The cache only memoizes folds; a poisoned guard is still consistent.
        self.balances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---------------------------------------------------------------------
    // Promo codes
    // ---------------------------------------------------------------------

    fn load_promo(&self, code: &str) -> Result<PromoCode, DispatchError> {
        let promo = PromoCode::named(code)?;
        Ok(self.dispatcher.load(*promo.id(), PROMO_CODE_TYPE, |_| promo)?)
    }

    fn execute_promo(&self, code: &str, command: PromoCodeCommand) -> Result<PromoCode, DispatchError> {
        let promo = PromoCode::named(code)?;
        let decision = self
            .dispatcher
            .dispatch(*promo.id(), PROMO_CODE_TYPE, &command, |_| promo)?;
        Ok(decision.state)
    }

    fn evaluate_at(
        &self,
        code: &str,
        subtotal: Money,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Discount, DispatchError> {
        Ok(self.load_promo(code)?.evaluate(subtotal, user_id, now)?)
    }

    /// Preview the discount a code grants. Records no usage.
    pub fn evaluate_promo_code(
        &self,
        code: &str,
        subtotal: Decimal,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Discount, DispatchError> {
        let subtotal = Money::new(subtotal)?;
        self.evaluate_at(code, subtotal, user_id, now)
    }

    pub fn promo_code(&self, code: &str) -> Result<PromoCode, DispatchError> {
        let promo = self.load_promo(code)?;
        if !promo.exists() {
            return Err(DomainError::not_found("promo code", promo.code()).into());
        }
        Ok(promo)
    }

    #[tracing::instrument(skip_all, fields(code = %code))]
    pub fn create_promo_code(&self, code: &str, terms: PromoTerms, is_active: bool) -> Result<PromoCode, DispatchError> {
        let promo = self.execute_promo(
            code,
            PromoCodeCommand::CreatePromoCode(CreatePromoCode {
                code: code.to_string(),
                terms,
                is_active,
                used_count: 0,
                occurred_at: Utc::now(),
            }),
        )?;
        tracing::info!(code = promo.code(), "promo code created");
        Ok(promo)
    }

    #[tracing::instrument(skip_all, fields(code = %code))]
    pub fn update_promo_terms(&self, code: &str, terms: PromoTerms) -> Result<PromoCode, DispatchError> {
        self.promo_code(code)?;
        self.execute_promo(
            code,
            PromoCodeCommand::UpdatePromoTerms(UpdatePromoTerms {
                terms,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip_all, fields(code = %code, is_active = is_active))]
    pub fn set_promo_code_active(&self, code: &str, is_active: bool) -> Result<PromoCode, DispatchError> {
        self.promo_code(code)?;
        let occurred_at = Utc::now();
        let command = if is_active {
            PromoCodeCommand::ActivatePromoCode(ActivatePromoCode { occurred_at })
        } else {
            PromoCodeCommand::DeactivatePromoCode(DeactivatePromoCode { occurred_at })
        };
        self.execute_promo(code, command)
    }

    // ---------------------------------------------------------------------
    // Shipping
    // ---------------------------------------------------------------------

    fn load_zone(&self, zone_id: ShippingZoneId) -> Result<ShippingZone, DispatchError> {
        self.dispatcher.load(zone_id.into(), ZONE_TYPE, make_zone)
    }

    fn execute_zone(&self, zone_id: ShippingZoneId, command: ShippingZoneCommand) -> Result<ShippingZone, DispatchError> {
        Ok(self
            .dispatcher
            .dispatch(zone_id.into(), ZONE_TYPE, &command, make_zone)?
            .state)
    }

    pub fn compute_shipping_cost(
        &self,
        zone_id: ShippingZoneId,
        method_id: ShippingMethodId,
        subtotal: Decimal,
        weight: Option<Decimal>,
    ) -> Result<ShippingQuote, DispatchError> {
        let subtotal = Money::new(subtotal)?;
        Ok(self.load_zone(zone_id)?.compute_cost(method_id, subtotal, weight)?)
    }

    /// Quotes for every active method of a zone.
    pub fn available_shipping_methods(
        &self,
        zone_id: ShippingZoneId,
        subtotal: Decimal,
        weight: Option<Decimal>,
    ) -> Result<Vec<ShippingQuote>, DispatchError> {
        let subtotal = Money::new(subtotal)?;
        Ok(self.load_zone(zone_id)?.available_methods(subtotal, weight)?)
    }

    pub fn shipping_zone(&self, zone_id: ShippingZoneId) -> Result<ShippingZone, DispatchError> {
        let zone = self.load_zone(zone_id)?;
        if !zone.exists() {
            return Err(DomainError::not_found("shipping zone", zone_id).into());
        }
        Ok(zone)
    }

    #[tracing::instrument(skip_all)]
    pub fn create_shipping_zone(&self, name: &str, is_active: bool) -> Result<ShippingZone, DispatchError> {
        let zone_id = ShippingZoneId::new();
        let zone = self.execute_zone(
            zone_id,
            ShippingZoneCommand::CreateShippingZone(CreateShippingZone {
                zone_id,
                name: name.to_string(),
                is_active,
                occurred_at: Utc::now(),
            }),
        )?;
        tracing::info!(%zone_id, name = zone.name(), "shipping zone created");
        Ok(zone)
    }

    #[tracing::instrument(skip_all, fields(zone_id = %zone_id))]
    pub fn rename_shipping_zone(&self, zone_id: ShippingZoneId, name: &str) -> Result<ShippingZone, DispatchError> {
        self.execute_zone(
            zone_id,
            ShippingZoneCommand::RenameShippingZone(RenameShippingZone {
                name: name.to_string(),
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip_all, fields(zone_id = %zone_id, is_active = is_active))]
    pub fn set_shipping_zone_active(&self, zone_id: ShippingZoneId, is_active: bool) -> Result<ShippingZone, DispatchError> {
        self.execute_zone(
            zone_id,
            ShippingZoneCommand::SetShippingZoneActive(SetShippingZoneActive {
                is_active,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip_all, fields(zone_id = %zone_id))]
    pub fn add_shipping_method(
        &self,
        zone_id: ShippingZoneId,
        terms: MethodTerms,
        is_active: bool,
    ) -> Result<ShippingMethod, DispatchError> {
        let method_id = ShippingMethodId::new();
        let zone = self.execute_zone(
            zone_id,
            ShippingZoneCommand::AddShippingMethod(AddShippingMethod {
                method_id,
                terms,
                is_active,
                occurred_at: Utc::now(),
            }),
        )?;
        tracing::info!(%zone_id, %method_id, "shipping method added");
        zone.method(method_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("shipping method", method_id).into())
    }

    #[tracing::instrument(skip_all, fields(zone_id = %zone_id, method_id = %method_id))]
    pub fn update_shipping_method(
        &self,
        zone_id: ShippingZoneId,
        method_id: ShippingMethodId,
        terms: MethodTerms,
    ) -> Result<ShippingZone, DispatchError> {
        self.execute_zone(
            zone_id,
            ShippingZoneCommand::UpdateShippingMethod(UpdateShippingMethod {
                method_id,
                terms,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip_all, fields(zone_id = %zone_id, method_id = %method_id, is_active = is_active))]
    pub fn set_shipping_method_active(
        &self,
        zone_id: ShippingZoneId,
        method_id: ShippingMethodId,
        is_active: bool,
    ) -> Result<ShippingZone, DispatchError> {
        self.execute_zone(
            zone_id,
            ShippingZoneCommand::SetShippingMethodActive(SetShippingMethodActive {
                method_id,
                is_active,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip_all, fields(zone_id = %zone_id, method_id = %method_id))]
    pub fn remove_shipping_method(
        &self,
        zone_id: ShippingZoneId,
        method_id: ShippingMethodId,
    ) -> Result<ShippingZone, DispatchError> {
        self.execute_zone(
            zone_id,
            ShippingZoneCommand::RemoveShippingMethod(RemoveShippingMethod {
                method_id,
                occurred_at: Utc::now(),
            }),
        )
    }

    #[tracing::instrument(skip_all, fields(zone_id = %zone_id))]
    pub fn delete_shipping_zone(&self, zone_id: ShippingZoneId) -> Result<(), DispatchError> {
        self.execute_zone(
            zone_id,
            ShippingZoneCommand::DeleteShippingZone(DeleteShippingZone {
                occurred_at: Utc::now(),
            }),
        )?;
        tracing::info!(%zone_id, "shipping zone deleted");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Checkout and fulfillment
    // ---------------------------------------------------------------------

    fn checkout_subtotal(items: &[LineItem]) -> Result<Money, DispatchError> {
        Ok(order_lines(items)?.iter().map(OrderLine::line_total).sum())
    }

    fn quote_shipping(&self, selection: &ShippingSelection, subtotal: Money) -> Result<ShippingQuote, DispatchError> {
        Ok(self
            .load_zone(selection.zone_id)?
            .compute_cost(selection.method_id, subtotal, selection.weight)?)
    }

    /// Price a checkout without placing it.
    pub fn price_order(
        &self,
        customer_id: UserId,
        items: &[LineItem],
        promo_code: Option<&str>,
        selection: &ShippingSelection,
    ) -> Result<OrderPricingResult, DispatchError> {
        let subtotal = Self::checkout_subtotal(items)?;
        let discount = non_blank(promo_code)
            .map(|code| self.evaluate_at(code, subtotal, customer_id, Utc::now()))
            .transpose()?;
        let shipping = self.quote_shipping(selection, subtotal)?;

        Ok(price(items, discount, shipping)?)
    }

    /// Price and place an order, redeeming its promo code in the same commit.
    ///
    /// The frozen discount is the one the redemption records, so the limit
    /// checks and the usage increment share one promo stream version.
    /// Order ids are caller-supplied: resubmitting a placed order returns it
    /// unchanged without counting another promo use.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, customer_id = %customer_id))]
    pub fn place_order(
        &self,
        order_id: OrderId,
        customer_id: UserId,
        items: &[LineItem],
        promo_code: Option<&str>,
        selection: &ShippingSelection,
    ) -> Result<Order, DispatchError> {
        if let Some(existing) = self.orders.get(order_id)? {
            if existing.customer_id() == Some(customer_id) {
                return Ok(existing);
            }
            return Err(DomainError::from(PolicyViolation::AlreadyExists(format!("order '{order_id}'"))).into());
        }

        let now = Utc::now();
        let subtotal = Self::checkout_subtotal(items)?;

        let mut appends = Vec::with_capacity(2);
        let mut discount = None;
        if let Some(code) = non_blank(promo_code) {
            let promo = PromoCode::named(code)?;
            let redeem = PromoCodeCommand::RedeemPromoCode(RedeemPromoCode {
                order_id,
                user_id: customer_id,
                subtotal,
                now,
            });
            let decision = self
                .dispatcher
                .decide(*promo.id(), PROMO_CODE_TYPE, &redeem, |_| promo)?;
            discount = Some(redeemed_discount(&decision.events).ok_or_else(|| {
                DispatchError::from(DomainError::conflict(format!(
                    "promo code '{}' already redeemed for order '{order_id}'",
                    decision.state.code()
                )))
            })?);
            appends.push(decision.to_append()?);
        }

        let pricing = price(items, discount, self.quote_shipping(selection, subtotal)?)?;
        let total = pricing.total;
        let place = OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            customer_id,
            pricing,
            occurred_at: now,
        });
        let placed = self
            .dispatcher
            .decide(order_id.into(), ORDER_TYPE, &place, make_order)?;
        appends.push(placed.to_append()?);

        self.dispatcher.commit(appends)?;
        tracing::info!(%order_id, %total, "order placed");
        Ok(placed.state)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order, DispatchError> {
        self.orders
            .get(order_id)?
            .ok_or_else(|| DomainError::not_found("order", order_id).into())
    }

    /// Move every sub-order of an order to `to`, all or nothing.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, to = %to))]
    pub fn transition_order(&self, order_id: OrderId, to: FulfillmentStatus) -> Result<Order, DispatchError> {
        let order = self.get_order(order_id)?;

        let mut commission_rates = BTreeMap::new();
        if to == FulfillmentStatus::Delivered {
            for sub in order.sub_orders().filter(|sub| !sub.status.is_terminal()) {
                commission_rates.insert(sub.vendor_id, self.vendors.commission_rate(sub.vendor_id)?);
            }
        }

        let command = OrderCommand::TransitionOrder(TransitionOrder {
            to,
            commission_rates,
            occurred_at: Utc::now(),
        });
        self.commit_fulfillment(order, &command)
    }

    /// Move one vendor's sub-order to `to`.
    #[tracing::instrument(skip_all, fields(order_id = %order_id, vendor_id = %vendor_id, to = %to))]
    pub fn transition_vendor_order(
        &self,
        order_id: OrderId,
        vendor_id: VendorId,
        to: FulfillmentStatus,
    ) -> Result<Order, DispatchError> {
        let order = self.get_order(order_id)?;

        let commission_rate = if to == FulfillmentStatus::Delivered {
            Some(self.vendors.commission_rate(vendor_id)?)
        } else {
            None
        };

        let command = OrderCommand::TransitionVendorOrder(TransitionVendorOrder {
            vendor_id,
            to,
            commission_rate,
            occurred_at: Utc::now(),
        });
        self.commit_fulfillment(order, &command)
    }

    fn commit_fulfillment(&self, order: Order, command: &OrderCommand) -> Result<Order, DispatchError> {
        let order_id = order.id_typed();
        let events = order.handle(command)?;
        let updated = self
            .orders
            .put(order_id, ExpectedVersion::Exact(order.version()), &events)?;

        for event in &events {
            self.after_fulfillment(order_id, event);
        }
        Ok(updated)
    }

    fn after_fulfillment(&self, order_id: OrderId, event: &OrderEvent) {
        let Some((vendor_id, from, to)) = event.transition() else {
            return;
        };
        tracing::info!(%order_id, %vendor_id, %from, %to, "sub-order transitioned");
        if to == FulfillmentStatus::Delivered {
            self.balances().invalidate(vendor_id);
        }
        notify_best_effort(
            self.notifier.as_ref(),
            Notification::FulfillmentTransitioned {
                order_id,
                vendor_id,
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
                occurred_at: event.occurred_at(),
            },
        );
    }

    // ---------------------------------------------------------------------
    // Settlement
    // ---------------------------------------------------------------------

    fn load_payouts(&self, vendor_id: VendorId) -> Result<VendorPayouts, DispatchError> {
        self.dispatcher.load(vendor_id.into(), PAYOUTS_TYPE, make_payouts)
    }

    fn execute_payouts(&self, vendor_id: VendorId, command: VendorPayoutsCommand) -> Result<VendorPayouts, DispatchError> {
        Ok(self
            .dispatcher
            .dispatch(vendor_id.into(), PAYOUTS_TYPE, &command, make_payouts)?
            .state)
    }

    /// `Σ net of delivered sub-orders − Σ approved withdrawals`, memoized per
    /// vendor until new history arrives.
    pub fn vendor_balance(&self, vendor_id: VendorId) -> Result<Money, DispatchError> {
        let delivered = self.orders.list_delivered_for_vendor(vendor_id)?;
        let payouts = self.load_payouts(vendor_id)?;
        let fingerprint = HistoryFingerprint::new(&delivered, &payouts);

        Ok(self.balances().get_or_compute(vendor_id, fingerprint, || {
            balance_of(&transactions_for(vendor_id, &delivered), &payouts)
        }))
    }

    /// Completed transactions followed by in-flight estimates at the vendor's
    /// current rate.
    pub fn vendor_transactions(&self, vendor_id: VendorId) -> Result<Vec<Transaction>, DispatchError> {
        let current_rate = self.vendors.commission_rate(vendor_id)?;
        let orders = self.orders.list_for_vendor(vendor_id)?;

        let mut txs = transactions_for(vendor_id, &orders);
        txs.extend(pending_transactions(vendor_id, &orders, current_rate));
        Ok(txs)
    }

    pub fn vendor_statement(&self, vendor_id: VendorId) -> Result<VendorStatement, DispatchError> {
        let current_rate = self.vendors.commission_rate(vendor_id)?;
        let orders = self.orders.list_for_vendor(vendor_id)?;
        let payouts = self.load_payouts(vendor_id)?;

        let completed = transactions_for(vendor_id, &orders);
        let pending = pending_transactions(vendor_id, &orders, current_rate);
        Ok(statement(vendor_id, &completed, &pending, &payouts))
    }

    /// Request a payout. Pending requests reserve balance until decided.
    #[tracing::instrument(skip_all, fields(vendor_id = %vendor_id, amount = %amount))]
    pub fn request_withdrawal(
        &self,
        vendor_id: VendorId,
        amount: Decimal,
        payout: PayoutDetails,
    ) -> Result<WithdrawalRequest, DispatchError> {
        let vendor_status = self.vendors.status(vendor_id)?;
        // Accrued net only grows, so a read that races a delivery is conservative.
        let delivered = self.orders.list_delivered_for_vendor(vendor_id)?;
        let accrued = accrued_net(&transactions_for(vendor_id, &delivered));

        let withdrawal_id = WithdrawalId::new();
        let payouts = self.execute_payouts(
            vendor_id,
            VendorPayoutsCommand::RequestWithdrawal(RequestWithdrawal {
                withdrawal_id,
                amount,
                payout,
                accrued_net: accrued,
                vendor_status,
                occurred_at: Utc::now(),
            }),
        )?;
        tracing::info!(%vendor_id, %withdrawal_id, "withdrawal requested");

        payouts
            .request(withdrawal_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("withdrawal request", withdrawal_id).into())
    }

    /// Approve or reject a pending request. Suspended vendors' requests may
    /// still be decided.
    #[tracing::instrument(skip_all, fields(withdrawal_id = %withdrawal_id, decision = ?decision))]
    pub fn decide_withdrawal(
        &self,
        withdrawal_id: WithdrawalId,
        decision: WithdrawalDecision,
        note: Option<String>,
    ) -> Result<WithdrawalRequest, DispatchError> {
        let owner = self
            .dispatcher
            .load_all(PAYOUTS_TYPE, make_payouts)?
            .into_iter()
            .find(|p| p.request(withdrawal_id).is_some())
            .ok_or_else(|| DomainError::not_found("withdrawal request", withdrawal_id))?;
        let vendor_id = *owner.id();

        let occurred_at = Utc::now();
        let payouts = self.execute_payouts(
            vendor_id,
            VendorPayoutsCommand::DecideWithdrawal(DecideWithdrawal {
                withdrawal_id,
                decision,
                note,
                occurred_at,
            }),
        )?;
        let request = payouts
            .request(withdrawal_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("withdrawal request", withdrawal_id))?;

        let approved = decision == WithdrawalDecision::Approve;
        if approved {
            self.balances().invalidate(vendor_id);
        }
        tracing::info!(%vendor_id, %withdrawal_id, approved = approved, "withdrawal decided");

        notify_best_effort(
            self.notifier.as_ref(),
            Notification::WithdrawalDecided {
                withdrawal_id,
                vendor_id,
                amount: request.amount,
                approved,
                occurred_at,
            },
        );
        Ok(request)
    }

    pub fn withdrawal_requests(&self, vendor_id: VendorId) -> Result<Vec<WithdrawalRequest>, DispatchError> {
        Ok(self.load_payouts(vendor_id)?.requests().to_vec())
    }

    // ---------------------------------------------------------------------
    // Configuration collections
    // ---------------------------------------------------------------------

    /// Snapshot current promo codes, zones, methods and withdrawal requests
    /// into the configuration store.
    #[tracing::instrument(skip_all)]
    pub fn export_configuration(&self) -> Result<ConfigurationSummary, DispatchError> {
        let promos: Vec<PromoCodeRecord> = self
            .dispatcher
            .load_all(PROMO_CODE_TYPE, PromoCode::empty)?
            .iter()
            .filter_map(PromoCode::to_record)
            .collect();

        let mut zones: Vec<ShippingZoneRecord> = Vec::new();
        let mut methods: Vec<ShippingMethodRecord> = Vec::new();
        for zone in self.dispatcher.load_all(ZONE_TYPE, make_zone)? {
            if let Some((record, zone_methods)) = zone.to_records() {
                zones.push(record);
                methods.extend(zone_methods);
            }
        }

        let withdrawals: Vec<WithdrawalRequestRecord> = self
            .dispatcher
            .load_all(PAYOUTS_TYPE, make_payouts)?
            .iter()
            .flat_map(|p| p.requests().iter().map(WithdrawalRequest::to_record))
            .collect();

        // Serialize everything before writing so the snapshot lands whole.
        let snapshot = vec![
            (PROMO_CODES, to_values(PROMO_CODES, &promos)?),
            (SHIPPING_ZONES, to_values(SHIPPING_ZONES, &zones)?),
            (SHIPPING_METHODS, to_values(SHIPPING_METHODS, &methods)?),
            (WITHDRAWAL_REQUESTS, to_values(WITHDRAWAL_REQUESTS, &withdrawals)?),
        ];
        self.config.save_all(snapshot)?;

        let summary = ConfigurationSummary {
            promo_codes: promos.len(),
            shipping_zones: zones.len(),
            shipping_methods: methods.len(),
            withdrawal_requests: withdrawals.len(),
            skipped: 0,
        };
        tracing::info!(?summary, "configuration exported");
        Ok(summary)
    }

    /// Seed promo code and shipping streams from the configuration store.
    ///
    /// Records whose code, zone or method already exists are skipped, so an
    /// interrupted import can simply be run again. Withdrawal requests are
    /// export-only.
    #[tracing::instrument(skip_all)]
    pub fn import_configuration(&self) -> Result<ConfigurationSummary, DispatchError> {
        let config = self.config.as_ref();
        let promos: Vec<PromoCodeRecord> = load_records(config, PROMO_CODES)?;
        let zones: Vec<ShippingZoneRecord> = load_records(config, SHIPPING_ZONES)?;
        let methods: Vec<ShippingMethodRecord> = load_records(config, SHIPPING_METHODS)?;

        let now = Utc::now();
        let mut summary = ConfigurationSummary::default();
        for record in promos {
            let result = self
                .execute_promo(
                    &record.code,
                    PromoCodeCommand::CreatePromoCode(CreatePromoCode {
                        code: record.code.clone(),
                        terms: record.terms(),
                        is_active: record.is_active,
                        used_count: record.used_count,
                        occurred_at: now,
                    }),
                )
                .map(|_| ());
            tally(result, &mut summary.promo_codes, &mut summary.skipped)?;
        }

        for record in zones {
            let result = self
                .execute_zone(
                    record.id,
                    ShippingZoneCommand::CreateShippingZone(CreateShippingZone {
                        zone_id: record.id,
                        name: record.name.clone(),
                        is_active: record.is_active,
                        occurred_at: now,
                    }),
                )
                .map(|_| ());
            tally(result, &mut summary.shipping_zones, &mut summary.skipped)?;
        }

        for record in methods {
            let result = self
                .execute_zone(
                    record.zone_id,
                    ShippingZoneCommand::AddShippingMethod(AddShippingMethod {
                        method_id: record.id,
                        terms: record.terms(),
                        is_active: record.is_active,
                        occurred_at: now,
                    }),
                )
                .map(|_| ());
            tally(result, &mut summary.shipping_methods, &mut summary.skipped)?;
        }

        tracing::info!(?summary, "configuration imported");
        Ok(summary)
    }
}

impl core::fmt::Debug for Marketplace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Marketplace")
            .field("cached_balances", &self.balances().len())
            .finish_non_exhaustive()
    }
}
