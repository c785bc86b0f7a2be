//! Integration tests for the marketplace façade over in-memory stores.
//!
//! Tests: Façade → CommandDispatcher → EventStore → OrderStore / ledger fold
//!
//! Verifies:
//! - Checkout prices, redeems and places atomically
//! - Settlement follows deliveries at the frozen commission rate
//! - Withdrawals reserve and consume balance
//! - Concurrent checkouts cannot over-redeem a promo code

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use bazaar_core::{AggregateRoot, ErrorKind, Money, OrderId, ProductId, Rate, UserId, VendorId, WithdrawalId};
    use bazaar_events::{EventBus, InMemoryEventBus, Notification, Subscription};
    use bazaar_orders::{FulfillmentStatus, LineItem};
    use bazaar_promotions::{promo_stream_id, DiscountType, PromoCodeEvent, PromoTerms};
    use bazaar_settlement::{PayoutDetails, TransactionStatus, VendorStatus, WithdrawalDecision, WithdrawalStatus};
    use bazaar_shipping::{CostType, MethodTerms};

    use crate::config_store::InMemoryConfigurationStore;
    use crate::event_store::{EventStore, InMemoryEventStore};
    use crate::marketplace::{Marketplace, ShippingSelection};
    use crate::notifier::{BusNotifier, Notifier, NotifyError};
    use crate::vendor_directory::{InMemoryVendorDirectory, VendorAccount};

    struct Harness {
        market: Arc<Marketplace>,
        vendors: Arc<InMemoryVendorDirectory>,
        notifications: Subscription<Notification>,
    }

    fn setup() -> Harness {
        let vendors = Arc::new(InMemoryVendorDirectory::new());
        let bus: Arc<InMemoryEventBus<Notification>> = Arc::new(InMemoryEventBus::new());
        let notifications = bus.subscribe();
        let market = Marketplace::in_memory(vendors.clone(), Arc::new(BusNotifier::new(bus)));
        Harness {
            market: Arc::new(market),
            vendors,
            notifications,
        }
    }

    fn money(v: Decimal) -> Money {
        Money::new(v).unwrap()
    }

    fn vendor(h: &Harness, rate: Decimal) -> VendorId {
        let vendor_id = VendorId::new();
        h.vendors
            .upsert(VendorAccount {
                vendor_id,
                commission_rate: Rate::new(rate).unwrap(),
                status: VendorStatus::Active,
            })
            .unwrap();
        vendor_id
    }

    fn fixed_method(cost: Decimal) -> MethodTerms {
        MethodTerms {
            name: "Reguler".into(),
            cost_type: CostType::Fixed,
            base_cost: money(cost),
            cost_per_kg: None,
            cost_percentage: None,
            max_cost: None,
            free_shipping_threshold: None,
            estimated_days: Some(3),
        }
    }

    fn courier(market: &Marketplace, cost: Decimal) -> ShippingSelection {
        let zone = market.create_shipping_zone("Jawa", true).unwrap();
        let method = market.add_shipping_method(*zone.id(), fixed_method(cost), true).unwrap();
        ShippingSelection {
            zone_id: *zone.id(),
            method_id: method.id,
            weight: None,
        }
    }

    fn percent_terms(usage_limit: u32, user_limit: u32) -> PromoTerms {
        PromoTerms {
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            min_order_amount: money(dec!(100000)),
            max_discount: Some(money(dec!(50000))),
            usage_limit,
            user_limit,
            valid_from: Utc::now() - Duration::days(1),
            valid_until: Utc::now() + Duration::days(1),
            description: Some("10% off, up to 50k".into()),
        }
    }

    fn item(vendor_id: VendorId, unit_price: Decimal) -> LineItem {
        LineItem {
            product_id: ProductId::new(),
            vendor_id,
            quantity: 1,
            unit_price,
        }
    }

    fn bank() -> PayoutDetails {
        PayoutDetails {
            bank_name: "BCA".into(),
            account_number: "1234567890".into(),
            account_holder: "Toko Maju".into(),
        }
    }

    fn deliver(market: &Marketplace, order_id: OrderId) {
        market.transition_order(order_id, FulfillmentStatus::Shipped).unwrap();
        market.transition_order(order_id, FulfillmentStatus::Delivered).unwrap();
    }

    fn place(h: &Harness, vendor_id: VendorId, amount: Decimal, selection: &ShippingSelection) -> OrderId {
        let order_id = OrderId::new();
        h.market
            .place_order(order_id, UserId::new(), &[item(vendor_id, amount)], None, selection)
            .unwrap();
        order_id
    }

    #[test]
    fn checkout_prices_redeems_and_places() {
        let h = setup();
        let v = vendor(&h, dec!(10));
        let selection = courier(&h.market, dec!(20000));
        h.market.create_promo_code("hemat10", percent_terms(100, 1), true).unwrap();

        let customer = UserId::new();
        let items = [item(v, dec!(1000000))];
        let quote = h.market.price_order(customer, &items, Some("HEMAT10"), &selection).unwrap();
        assert_eq!(quote.discount, money(dec!(50000)));
        assert_eq!(quote.shipping_cost, money(dec!(20000)));
        assert_eq!(quote.total, money(dec!(970000)));
        // Pricing alone records no usage.
        assert_eq!(h.market.promo_code("HEMAT10").unwrap().used_count(), 0);

        let order = h
            .market
            .place_order(OrderId::new(), customer, &items, Some("hemat10"), &selection)
            .unwrap();
        assert_eq!(order.total(), money(dec!(970000)));
        assert_eq!(order.status(), FulfillmentStatus::Pending);
        assert_eq!(h.market.promo_code("HEMAT10").unwrap().used_count(), 1);

        // Per-user limit of one is now reached for this customer.
        let err = h
            .market
            .evaluate_promo_code("HEMAT10", dec!(1000000), customer, Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "user_limit_reached");
    }

    #[test]
    fn placed_discount_is_the_one_the_redemption_records() {
        let vendors = Arc::new(InMemoryVendorDirectory::new());
        let v = VendorId::new();
        vendors
            .upsert(VendorAccount {
                vendor_id: v,
                commission_rate: Rate::new(dec!(10)).unwrap(),
                status: VendorStatus::Active,
            })
            .unwrap();
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let bus: Arc<InMemoryEventBus<Notification>> = Arc::new(InMemoryEventBus::new());
        let market = Marketplace::new(
            store.clone(),
            vendors,
            Arc::new(InMemoryConfigurationStore::new()),
            Arc::new(BusNotifier::new(bus)),
        );
        let selection = courier(&market, dec!(20000));
        market.create_promo_code("HEMAT", percent_terms(100, 1), true).unwrap();

        let customer = UserId::new();
        let items = [item(v, dec!(1000000))];
        let quote = market.price_order(customer, &items, Some("HEMAT"), &selection).unwrap();
        assert_eq!(quote.discount, money(dec!(50000)));

        // Terms change after the customer saw the quote.
        let mut richer = percent_terms(100, 1);
        richer.value = dec!(20);
        richer.max_discount = Some(money(dec!(80000)));
        market.update_promo_terms("HEMAT", richer).unwrap();

        let order = market
            .place_order(OrderId::new(), customer, &items, Some("HEMAT"), &selection)
            .unwrap();
        assert_eq!(order.discount(), money(dec!(80000)));
        assert_eq!(order.total(), money(dec!(940000)));

        let redeemed: Vec<Money> = store
            .load_stream(promo_stream_id("HEMAT").unwrap())
            .unwrap()
            .into_iter()
            .filter_map(|e| match serde_json::from_value(e.payload).unwrap() {
                PromoCodeEvent::PromoCodeRedeemed(r) => Some(r.discount),
                _ => None,
            })
            .collect();
        assert_eq!(redeemed, vec![order.discount()]);
    }

    #[test]
    fn resubmitted_checkout_is_idempotent() {
        let h = setup();
        let v = vendor(&h, dec!(10));
        let selection = courier(&h.market, dec!(0));
        h.market.create_promo_code("ONCE", percent_terms(10, 10), true).unwrap();

        let (order_id, customer) = (OrderId::new(), UserId::new());
        let items = [item(v, dec!(200000))];
        let first = h
            .market
            .place_order(order_id, customer, &items, Some("ONCE"), &selection)
            .unwrap();
        let again = h
            .market
            .place_order(order_id, customer, &items, Some("ONCE"), &selection)
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(h.market.promo_code("ONCE").unwrap().used_count(), 1);

        let err = h
            .market
            .place_order(order_id, UserId::new(), &items, None, &selection)
            .unwrap_err();
        assert_eq!(err.code(), "already_exists");
    }

    #[test]
    fn promo_errors_carry_kinds() {
        let h = setup();
        let err = h
            .market
            .evaluate_promo_code("NOPE", dec!(100), UserId::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        h.market.create_promo_code("HEMAT10", percent_terms(10, 1), true).unwrap();
        let err = h
            .market
            .evaluate_promo_code("HEMAT10", dec!(-1), UserId::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .market
            .evaluate_promo_code("HEMAT10", dec!(50000), UserId::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "below_minimum_order");

        h.market.set_promo_code_active("HEMAT10", false).unwrap();
        let err = h
            .market
            .evaluate_promo_code("HEMAT10", dec!(500000), UserId::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err.code(), "code_inactive");

        let err = h.market.create_promo_code("hemat10", percent_terms(10, 1), true).unwrap_err();
        assert_eq!(err.code(), "already_exists");
    }

    #[test]
    fn weight_based_shipping_and_free_threshold() {
        let h = setup();
        let zone = h.market.create_shipping_zone("Sumatra", true).unwrap();
        let zone_id = *zone.id();
        let method = h
            .market
            .add_shipping_method(
                zone_id,
                MethodTerms {
                    name: "Kargo".into(),
                    cost_type: CostType::Weight,
                    base_cost: money(dec!(10000)),
                    cost_per_kg: Some(money(dec!(5000))),
                    cost_percentage: None,
                    max_cost: None,
                    free_shipping_threshold: Some(money(dec!(500000))),
                    estimated_days: None,
                },
                true,
            )
            .unwrap();

        let quote = h
            .market
            .compute_shipping_cost(zone_id, method.id, dec!(100000), Some(dec!(3)))
            .unwrap();
        assert_eq!(quote.cost, money(dec!(25000)));

        let free = h
            .market
            .compute_shipping_cost(zone_id, method.id, dec!(600000), Some(dec!(3)))
            .unwrap();
        assert_eq!(free.cost, Money::ZERO);

        h.market.set_shipping_method_active(zone_id, method.id, false).unwrap();
        let err = h
            .market
            .available_shipping_methods(zone_id, dec!(100000), None)
            .unwrap_err();
        assert_eq!(err.code(), "no_active_methods_in_zone");
    }

    #[test]
    fn zones_with_methods_cannot_be_deleted() {
        let h = setup();
        let selection = courier(&h.market, dec!(15000));

        let err = h.market.delete_shipping_zone(selection.zone_id).unwrap_err();
        assert_eq!(err.code(), "zone_has_methods");

        h.market.remove_shipping_method(selection.zone_id, selection.method_id).unwrap();
        h.market.delete_shipping_zone(selection.zone_id).unwrap();

        let err = h
            .market
            .compute_shipping_cost(selection.zone_id, selection.method_id, dec!(1), None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn delivery_settles_at_the_frozen_rate() {
        let h = setup();
        let v = vendor(&h, dec!(10));
        let selection = courier(&h.market, dec!(20000));
        let order_id = place(&h, v, dec!(1000000), &selection);

        // In-flight orders are estimates and never count toward the balance.
        assert_eq!(h.market.vendor_balance(v).unwrap(), Money::ZERO);
        let txs = h.market.vendor_transactions(v).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].status, TransactionStatus::Pending);

        deliver(&h.market, order_id);
        assert_eq!(h.market.vendor_balance(v).unwrap(), money(dec!(900000)));

        // A later rate change leaves the settled transaction alone.
        h.vendors.set_commission_rate(v, Rate::new(dec!(20)).unwrap()).unwrap();
        let txs = h.market.vendor_transactions(v).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].status, TransactionStatus::Completed);
        assert_eq!(txs[0].commission, money(dec!(100000)));
        assert_eq!(txs[0].net_amount, money(dec!(900000)));
        assert_eq!(h.market.vendor_balance(v).unwrap(), money(dec!(900000)));

        let transitions: Vec<_> = h
            .notifications
            .drain()
            .into_iter()
            .filter_map(|n| match n {
                Notification::FulfillmentTransitioned { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![
                ("pending".to_string(), "shipped".to_string()),
                ("shipped".to_string(), "delivered".to_string())
            ]
        );
    }

    #[test]
    fn sub_orders_move_independently() {
        let h = setup();
        let (a, b) = (vendor(&h, dec!(10)), vendor(&h, dec!(5)));
        let selection = courier(&h.market, dec!(0));
        let order_id = OrderId::new();
        h.market
            .place_order(
                order_id,
                UserId::new(),
                &[item(a, dec!(100000)), item(b, dec!(40000))],
                None,
                &selection,
            )
            .unwrap();

        h.market
            .transition_vendor_order(order_id, a, FulfillmentStatus::Shipped)
            .unwrap();
        h.market
            .transition_vendor_order(order_id, a, FulfillmentStatus::Delivered)
            .unwrap();
        let order = h
            .market
            .transition_vendor_order(order_id, b, FulfillmentStatus::Cancelled)
            .unwrap();

        assert_eq!(order.sub_order(a).unwrap().status, FulfillmentStatus::Delivered);
        assert_eq!(order.sub_order(b).unwrap().status, FulfillmentStatus::Cancelled);
        assert_eq!(h.market.vendor_balance(a).unwrap(), money(dec!(90000)));
        assert_eq!(h.market.vendor_balance(b).unwrap(), Money::ZERO);
        assert!(h.market.vendor_transactions(b).unwrap().is_empty());
    }

    fn place_mixed(h: &Harness, a: VendorId, b: VendorId, selection: &ShippingSelection) -> OrderId {
        let order_id = OrderId::new();
        h.market
            .place_order(
                order_id,
                UserId::new(),
                &[item(a, dec!(100000)), item(b, dec!(40000))],
                None,
                selection,
            )
            .unwrap();
        h.market.transition_order(order_id, FulfillmentStatus::Shipped).unwrap();
        h.market
            .transition_vendor_order(order_id, a, FulfillmentStatus::Delivered)
            .unwrap();
        order_id
    }

    #[test]
    fn order_wide_moves_leave_settled_sub_orders_alone() {
        let h = setup();
        let (a, b) = (vendor(&h, dec!(10)), vendor(&h, dec!(5)));
        let selection = courier(&h.market, dec!(0));

        let first = place_mixed(&h, a, b, &selection);
        assert_eq!(h.market.get_order(first).unwrap().status(), FulfillmentStatus::Shipped);
        let order = h.market.transition_order(first, FulfillmentStatus::Delivered).unwrap();
        assert_eq!(order.sub_order(b).unwrap().status, FulfillmentStatus::Delivered);
        assert_eq!(order.status(), FulfillmentStatus::Delivered);

        let second = place_mixed(&h, a, b, &selection);
        let order = h.market.transition_order(second, FulfillmentStatus::Cancelled).unwrap();
        assert_eq!(order.sub_order(a).unwrap().status, FulfillmentStatus::Delivered);
        assert_eq!(order.sub_order(b).unwrap().status, FulfillmentStatus::Cancelled);
        assert_eq!(order.status(), FulfillmentStatus::Delivered);

        // Two deliveries for `a`, one for `b`.
        assert_eq!(h.market.vendor_balance(a).unwrap(), money(dec!(180000)));
        assert_eq!(h.market.vendor_balance(b).unwrap(), money(dec!(38000)));

        let err = h
            .market
            .transition_order(second, FulfillmentStatus::Cancelled)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
    }

    #[test]
    fn backwards_transition_is_rejected() {
        let h = setup();
        let v = vendor(&h, dec!(10));
        let selection = courier(&h.market, dec!(0));
        let order_id = place(&h, v, dec!(100), &selection);
        h.market.transition_order(order_id, FulfillmentStatus::Shipped).unwrap();

        let err = h
            .market
            .transition_order(order_id, FulfillmentStatus::Processing)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(h.market.get_order(order_id).unwrap().status(), FulfillmentStatus::Shipped);

        let err = h
            .market
            .transition_order(OrderId::new(), FulfillmentStatus::Shipped)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn withdrawals_reserve_and_consume_balance() {
        let h = setup();
        let v = vendor(&h, dec!(10));
        let selection = courier(&h.market, dec!(0));
        deliver(&h.market, place(&h, v, dec!(1000000), &selection));
        h.notifications.drain();

        let request = h.market.request_withdrawal(v, dec!(900000), bank()).unwrap();
        assert_eq!(request.status, WithdrawalStatus::Pending);

        let err = h.market.request_withdrawal(v, dec!(500000), bank()).unwrap_err();
        assert_eq!(err.code(), "insufficient_balance");

        let decided = h
            .market
            .decide_withdrawal(request.id, WithdrawalDecision::Approve, Some("paid".into()))
            .unwrap();
        assert_eq!(decided.status, WithdrawalStatus::Approved);
        assert_eq!(h.market.vendor_balance(v).unwrap(), Money::ZERO);

        let statement = h.market.vendor_statement(v).unwrap();
        assert_eq!(statement.gross_sales, money(dec!(1000000)));
        assert_eq!(statement.commission, money(dec!(100000)));
        assert_eq!(statement.paid_out, money(dec!(900000)));
        assert_eq!(statement.balance, Money::ZERO);

        assert!(matches!(
            h.notifications.drain().as_slice(),
            [Notification::WithdrawalDecided { approved: true, .. }]
        ));

        let err = h
            .market
            .decide_withdrawal(request.id, WithdrawalDecision::Reject, None)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(h.market.withdrawal_requests(v).unwrap().len(), 1);
    }

    #[test]
    fn suspended_vendors_cannot_withdraw_but_pending_requests_can_be_decided() {
        let h = setup();
        let v = vendor(&h, dec!(10));
        let selection = courier(&h.market, dec!(0));
        deliver(&h.market, place(&h, v, dec!(100000), &selection));
        let pending = h.market.request_withdrawal(v, dec!(10000), bank()).unwrap();

        h.vendors.set_status(v, VendorStatus::Suspended).unwrap();
        let err = h.market.request_withdrawal(v, dec!(10000), bank()).unwrap_err();
        assert_eq!(err.code(), "vendor_inactive");

        let rejected = h
            .market
            .decide_withdrawal(pending.id, WithdrawalDecision::Reject, None)
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);

        let err = h
            .market
            .decide_withdrawal(WithdrawalId::new(), WithdrawalDecision::Approve, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    struct Unreachable;

    impl Notifier for Unreachable {
        fn notify(&self, _: Notification) -> Result<(), NotifyError> {
            Err(NotifyError("mail relay down".into()))
        }
    }

    #[test]
    fn notifier_failures_never_fail_the_operation() {
        let vendors = Arc::new(InMemoryVendorDirectory::new());
        let market = Marketplace::in_memory(vendors.clone(), Arc::new(Unreachable));
        let v = VendorId::new();
        vendors
            .upsert(VendorAccount {
                vendor_id: v,
                commission_rate: Rate::new(dec!(10)).unwrap(),
                status: VendorStatus::Active,
            })
            .unwrap();
        let selection = courier(&market, dec!(0));
        let order_id = OrderId::new();
        market
            .place_order(order_id, UserId::new(), &[item(v, dec!(1000))], None, &selection)
            .unwrap();

        deliver(&market, order_id);
        let request = market.request_withdrawal(v, dec!(900), bank()).unwrap();
        market
            .decide_withdrawal(request.id, WithdrawalDecision::Approve, None)
            .unwrap();
        assert_eq!(market.vendor_balance(v).unwrap(), Money::ZERO);
    }

    #[test]
    fn racing_checkouts_cannot_over_redeem_the_last_use() {
        let h = setup();
        let v = vendor(&h, dec!(10));
        let selection = courier(&h.market, dec!(0));
        h.market.create_promo_code("LAST", percent_terms(1, 1), true).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let market = h.market.clone();
                    let barrier = barrier.clone();
                    let selection = selection.clone();
                    s.spawn(move || {
                        barrier.wait();
                        market.place_order(
                            OrderId::new(),
                            UserId::new(),
                            &[item(v, dec!(200000))],
                            Some("LAST"),
                            &selection,
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|t| t.join().unwrap()).collect()
        });

        let committed = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(committed, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(
                matches!(err.code(), "version_conflict" | "global_limit_reached"),
                "unexpected error: {err}"
            );
        }
        assert_eq!(h.market.promo_code("LAST").unwrap().used_count(), 1);
    }

    #[test]
    fn configuration_exports_and_seeds_a_fresh_engine() {
        let vendors = Arc::new(InMemoryVendorDirectory::new());
        let config = Arc::new(InMemoryConfigurationStore::new());
        let bus: Arc<InMemoryEventBus<Notification>> = Arc::new(InMemoryEventBus::new());
        let notifier = Arc::new(BusNotifier::new(bus));

        let source = Marketplace::new(
            Arc::new(InMemoryEventStore::new()),
            vendors.clone(),
            config.clone(),
            notifier.clone(),
        );
        source.create_promo_code("HEMAT10", percent_terms(100, 1), true).unwrap();
        let selection = courier(&source, dec!(12000));

        let exported = source.export_configuration().unwrap();
        assert_eq!((exported.promo_codes, exported.shipping_zones, exported.shipping_methods), (1, 1, 1));

        let target = Marketplace::new(Arc::new(InMemoryEventStore::new()), vendors, config, notifier);
        let imported = target.import_configuration().unwrap();
        assert_eq!((imported.promo_codes, imported.shipping_zones, imported.shipping_methods), (1, 1, 1));

        let quote = target
            .compute_shipping_cost(selection.zone_id, selection.method_id, dec!(1), None)
            .unwrap();
        assert_eq!(quote.cost, money(dec!(12000)));
        assert!(target.promo_code("hemat10").unwrap().is_active());

        let again = target.import_configuration().unwrap();
        assert_eq!(again.skipped, 3);
        assert_eq!(again.promo_codes, 0);
    }
}
