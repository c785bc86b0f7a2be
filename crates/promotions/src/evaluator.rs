//! Discount arithmetic.

use serde::{Deserialize, Serialize};

use bazaar_core::{Money, Rate};

use crate::promo_code::{DiscountType, PromoTerms};

/// Outcome of a successful promo code evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub code: String,
    pub amount: Money,
}

/// Discount granted by `terms` on `subtotal`.
///
/// Percentage discounts are rounded to cents and capped by a nonzero
/// `max_discount`. Fixed discounts never exceed the subtotal. Terms are
/// validated before they reach an aggregate, so the fallbacks below only
/// guard against hand-built values.
pub fn compute_discount(terms: &PromoTerms, subtotal: Money) -> Money {
    match terms.discount_type {
        DiscountType::Percentage => {
            let discount = Rate::new(terms.value)
                .map(|rate| subtotal.percent(rate))
                .unwrap_or(Money::ZERO);
            match terms.max_discount {
                Some(cap) if !cap.is_zero() => discount.min(cap),
                _ => discount,
            }
        }
        DiscountType::Fixed => Money::new(terms.value).unwrap_or(Money::ZERO).min(subtotal),
    }
}
