use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use bazaar_core::{Money, OrderId, ProductId, Rate, UserId, VendorId};
use bazaar_events::{InMemoryEventBus, Notification};
use bazaar_infra::event_store::{EventStore, InMemoryEventStore};
use bazaar_infra::marketplace::{Marketplace, ShippingSelection};
use bazaar_infra::notifier::BusNotifier;
use bazaar_infra::order_store::{EventSourcedOrderStore, OrderStore};
use bazaar_infra::vendor_directory::{InMemoryVendorDirectory, VendorAccount};
use bazaar_orders::{FulfillmentStatus, LineItem};
use bazaar_settlement::{balance_of, transactions_for, VendorPayouts, VendorStatus};
use bazaar_shipping::{CostType, MethodTerms};
use rust_decimal_macros::dec;

struct Fixture {
    market: Marketplace,
    store: Arc<dyn EventStore>,
    vendor_id: VendorId,
    selection: ShippingSelection,
}

fn setup() -> Fixture {
    let vendors = Arc::new(InMemoryVendorDirectory::new());
    let vendor_id = VendorId::new();
    vendors
        .upsert(VendorAccount {
            vendor_id,
            commission_rate: Rate::new(dec!(10)).unwrap(),
            status: VendorStatus::Active,
        })
        .unwrap();

    let bus: Arc<InMemoryEventBus<Notification>> = Arc::new(InMemoryEventBus::new());
    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let config = Arc::new(bazaar_infra::config_store::InMemoryConfigurationStore::new());
    let market = Marketplace::new(store.clone(), vendors, config, Arc::new(BusNotifier::new(bus)));

    let zone = market.create_shipping_zone("Jawa", true).unwrap();
    let zone_id = *bazaar_core::AggregateRoot::id(&zone);
    let method = market
        .add_shipping_method(
            zone_id,
            MethodTerms {
                name: "Reguler".into(),
                cost_type: CostType::Fixed,
                base_cost: Money::new(dec!(20000)).unwrap(),
                cost_per_kg: None,
                cost_percentage: None,
                max_cost: None,
                free_shipping_threshold: None,
                estimated_days: Some(2),
            },
            true,
        )
        .unwrap();

    Fixture {
        market,
        store,
        vendor_id,
        selection: ShippingSelection {
            zone_id,
            method_id: method.id,
            weight: None,
        },
    }
}

fn items(vendor_id: VendorId) -> Vec<LineItem> {
    vec![LineItem {
        product_id: ProductId::new(),
        vendor_id,
        quantity: 2,
        unit_price: dec!(150000),
    }]
}

/// Fixture with `count` delivered orders for its vendor.
fn with_delivered(count: usize) -> Fixture {
    let f = setup();
    for _ in 0..count {
        let order_id = OrderId::new();
        f.market
            .place_order(order_id, UserId::new(), &items(f.vendor_id), None, &f.selection)
            .unwrap();
        f.market.transition_order(order_id, FulfillmentStatus::Shipped).unwrap();
        f.market.transition_order(order_id, FulfillmentStatus::Delivered).unwrap();
    }
    f
}

fn bench_checkout_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("checkout_latency");

    group.bench_function("place_order", |b| {
        let f = setup();
        b.iter(|| {
            f.market
                .place_order(
                    OrderId::new(),
                    UserId::new(),
                    black_box(&items(f.vendor_id)),
                    None,
                    &f.selection,
                )
                .unwrap();
        });
    });

    group.bench_function("price_order", |b| {
        let f = setup();
        b.iter(|| {
            black_box(
                f.market
                    .price_order(UserId::new(), &items(f.vendor_id), None, &f.selection)
                    .unwrap(),
            );
        });
    });

    group.finish();
}

fn bench_balance_fold_vs_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("vendor_balance");

    for order_count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*order_count as u64));
        let f = with_delivered(*order_count);
        let orders = EventSourcedOrderStore::new(f.store.clone());

        group.bench_with_input(BenchmarkId::new("fold", order_count), order_count, |b, _| {
            b.iter(|| {
                let delivered = orders.list_delivered_for_vendor(f.vendor_id).unwrap();
                let payouts = VendorPayouts::empty(f.vendor_id);
                black_box(balance_of(&transactions_for(f.vendor_id, &delivered), &payouts));
            });
        });

        group.bench_with_input(BenchmarkId::new("cached", order_count), order_count, |b, _| {
            f.market.vendor_balance(f.vendor_id).unwrap();
            b.iter(|| black_box(f.market.vendor_balance(f.vendor_id).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_checkout_latency, bench_balance_fold_vs_cache);
criterion_main!(benches);
