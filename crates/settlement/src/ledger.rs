//! Settlement ledger.
//!
//! Transactions are never stored: they are derived from delivered vendor
//! sub-orders, each carrying the commission rate frozen at delivery. Every
//! function here is a pure fold, so recomputing from the same history always
//! yields the same result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{AggregateRoot, Money, OrderId, Rate, VendorId};
use bazaar_orders::{FulfillmentStatus, Order, VendorOrder};

use crate::payouts::VendorPayouts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// In-flight sub-order, estimated at the vendor's current rate.
    Pending,
    /// Delivered sub-order, settled at the frozen rate.
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub order_id: OrderId,
    pub vendor_id: VendorId,
    pub amount: Money,
    pub commission_rate: Rate,
    pub commission: Money,
    pub net_amount: Money,
    pub status: TransactionStatus,
    pub settled_at: Option<DateTime<Utc>>,
}

/// Split a vendor amount into `(commission, net)`.
///
/// Commission is rounded to cents; net is taken from the rounded commission so
/// `commission + net == amount` exactly.
pub fn settle(amount: Money, rate: Rate) -> (Money, Money) {
    let commission = amount.percent(rate);
    (commission, amount.saturating_sub(commission))
}

fn transaction(
    order_id: OrderId,
    sub: &VendorOrder,
    rate: Rate,
    status: TransactionStatus,
) -> Transaction {
    let (commission, net_amount) = settle(sub.amount, rate);
    Transaction {
        order_id,
        vendor_id: sub.vendor_id,
        amount: sub.amount,
        commission_rate: rate,
        commission,
        net_amount,
        status,
        settled_at: sub.delivered_at,
    }
}

/// Completed transactions of a vendor, one per delivered sub-order, sorted by
/// `(settled_at, order_id)`.
pub fn transactions_for<'a, I>(vendor_id: VendorId, orders: I) -> Vec<Transaction>
where
    I: IntoIterator<Item = &'a Order>,
{
    let mut txs: Vec<_> = orders
        .into_iter()
        .filter_map(|order| {
            let sub = order.sub_order(vendor_id)?;
            if sub.status != FulfillmentStatus::Delivered {
                return None;
            }
            let rate = sub.commission_rate?;
            Some(transaction(order.id_typed(), sub, rate, TransactionStatus::Completed))
        })
        .collect();

    txs.sort_by(|a, b| (a.settled_at, a.order_id).cmp(&(b.settled_at, b.order_id)));
    txs
}

/// In-flight (not delivered, not cancelled) sub-orders of a vendor, estimated
/// at `current_rate`. Never part of the balance.
pub fn pending_transactions<'a, I>(vendor_id: VendorId, orders: I, current_rate: Rate) -> Vec<Transaction>
where
    I: IntoIterator<Item = &'a Order>,
{
    let mut txs: Vec<_> = orders
        .into_iter()
        .filter_map(|order| {
            let sub = order.sub_order(vendor_id)?;
            if sub.status.is_terminal() {
                return None;
            }
            Some(transaction(order.id_typed(), sub, current_rate, TransactionStatus::Pending))
        })
        .collect();

    txs.sort_by_key(|t| t.order_id);
    txs
}

/// Σ net over completed transactions.
pub fn accrued_net(transactions: &[Transaction]) -> Money {
    transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Completed)
        .map(|t| t.net_amount)
        .sum()
}

/// `Σ net − Σ approved withdrawals`.
pub fn balance_of(transactions: &[Transaction], payouts: &VendorPayouts) -> Money {
    accrued_net(transactions).saturating_sub(payouts.approved_total())
}

/// Totals of a vendor's settlement position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorStatement {
    pub vendor_id: VendorId,
    pub completed_orders: usize,
    pub gross_sales: Money,
    pub commission: Money,
    pub net_revenue: Money,
    pub paid_out: Money,
    pub pending_withdrawals: Money,
    pub balance: Money,
    /// Balance not reserved by pending withdrawals.
    pub available: Money,
    pub pending_orders: usize,
    /// Estimated net of in-flight sub-orders at the current rate.
    pub pending_net: Money,
}

pub fn statement(
    vendor_id: VendorId,
    transactions: &[Transaction],
    pending: &[Transaction],
    payouts: &VendorPayouts,
) -> VendorStatement {
    let completed: Vec<_> = transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Completed)
        .collect();
    let net_revenue = accrued_net(transactions);

    VendorStatement {
        vendor_id,
        completed_orders: completed.len(),
        gross_sales: completed.iter().map(|t| t.amount).sum(),
        commission: completed.iter().map(|t| t.commission).sum(),
        net_revenue,
        paid_out: payouts.approved_total(),
        pending_withdrawals: payouts.pending_total(),
        balance: balance_of(transactions, payouts),
        available: payouts.available(net_revenue),
        pending_orders: pending.len(),
        pending_net: pending.iter().map(|t| t.net_amount).sum(),
    }
}

/// Identity of the history a balance was folded from: the version of every
/// order stream touching the vendor plus the payout stream version. Any new
/// delivery or withdrawal decision changes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryFingerprint {
    orders: Vec<(OrderId, u64)>,
    payouts_version: u64,
}

impl HistoryFingerprint {
    pub fn new<'a, I>(orders: I, payouts: &VendorPayouts) -> Self
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let mut orders: Vec<_> = orders
            .into_iter()
            .map(|o| (o.id_typed(), o.version()))
            .collect();
        orders.sort_unstable();
        Self {
            orders,
            payouts_version: payouts.version(),
        }
    }
}

/// Memoized vendor balances, valid while the history fingerprint matches.
#[derive(Debug, Default)]
pub struct BalanceCache {
    entries: HashMap<VendorId, (HistoryFingerprint, Money)>,
}

impl BalanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vendor_id: VendorId, fingerprint: &HistoryFingerprint) -> Option<Money> {
        self.entries
            .get(&vendor_id)
            .filter(|(fp, _)| fp == fingerprint)
            .map(|(_, balance)| *balance)
    }

    pub fn put(&mut self, vendor_id: VendorId, fingerprint: HistoryFingerprint, balance: Money) {
        self.entries.insert(vendor_id, (fingerprint, balance));
    }

    /// Cached balance, or fold and remember it.
    pub fn get_or_compute<F>(&mut self, vendor_id: VendorId, fingerprint: HistoryFingerprint, fold: F) -> Money
    where
        F: FnOnce() -> Money,
    {
        if let Some(balance) = self.get(vendor_id, &fingerprint) {
            return balance;
        }
        let balance = fold();
        self.put(vendor_id, fingerprint, balance);
        balance
    }

    pub fn invalidate(&mut self, vendor_id: VendorId) {
        self.entries.remove(&vendor_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
