//! Checkout pricing.
//!
//! `total = max(subtotal - discount, 0) + shipping_cost`. The result is frozen
//! into `OrderPlaced`; later edits to promo codes or shipping methods never
//! reprice an order.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, Money, ProductId, VendorId};
use bazaar_promotions::Discount;
use bazaar_shipping::ShippingQuote;

/// Cart line as submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub vendor_id: VendorId,
    pub quantity: i64,
    pub unit_price: Decimal,
}

/// Validated order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub vendor_id: VendorId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.times(Decimal::from(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromo {
    pub code: String,
    pub discount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPricingResult {
    pub lines: Vec<OrderLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub promo: Option<AppliedPromo>,
    pub shipping: ShippingQuote,
}

impl OrderPricingResult {
    /// Gross amount per vendor (sum of that vendor's line totals).
    pub fn vendor_amounts(&self) -> BTreeMap<VendorId, Money> {
        vendor_amounts(&self.lines)
    }
}

pub(crate) fn vendor_amounts(lines: &[OrderLine]) -> BTreeMap<VendorId, Money> {
    let mut amounts = BTreeMap::new();
    for line in lines {
        let entry = amounts.entry(line.vendor_id).or_insert(Money::ZERO);
        *entry = *entry + line.line_total();
    }
    amounts
}

/// Validate cart lines and number them.
pub fn order_lines(items: &[LineItem]) -> DomainResult<Vec<OrderLine>> {
    if items.is_empty() {
        return Err(DomainError::validation("order must contain at least one line item"));
    }

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let line_no = idx as u32 + 1;
            if item.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "line {line_no}: quantity must be positive"
                )));
            }
            let quantity = u32::try_from(item.quantity).map_err(|_| {
                DomainError::validation(format!("line {line_no}: quantity is too large"))
            })?;
            let unit_price = Money::new(item.unit_price)
                .map_err(|_| DomainError::validation(format!("line {line_no}: unit_price must not be negative")))?;
            if item.unit_price.normalize().scale() > Money::SCALE {
                return Err(DomainError::validation(format!(
                    "line {line_no}: unit_price has more than {} decimal places",
                    Money::SCALE
                )));
            }

            Ok(OrderLine {
                line_no,
                product_id: item.product_id,
                vendor_id: item.vendor_id,
                quantity,
                unit_price,
            })
        })
        .collect()
}

/// Price a checkout from its cart, the evaluated promo (if any) and the
/// selected shipping quote.
pub fn price(items: &[LineItem], promo: Option<Discount>, shipping: ShippingQuote) -> DomainResult<OrderPricingResult> {
    let lines = order_lines(items)?;
    let subtotal: Money = lines.iter().map(OrderLine::line_total).sum();

    let discount = promo.as_ref().map(|d| d.amount).unwrap_or(Money::ZERO);
    let shipping_cost = shipping.cost;
    let total = subtotal.saturating_sub(discount) + shipping_cost;

    Ok(OrderPricingResult {
        lines,
        subtotal,
        discount,
        shipping_cost,
        total,
        promo: promo.map(|d| AppliedPromo {
            code: d.code,
            discount: d.amount,
        }),
        shipping,
    })
}
