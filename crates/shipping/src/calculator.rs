//! Shipping cost formulas.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, Money, Rate, ShippingMethodId, ShippingZoneId};

/// How a method prices a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostType {
    /// Flat `base_cost`.
    Fixed,
    /// `base_cost + cost_per_kg × weight`.
    Weight,
    /// `base_cost + subtotal × cost_percentage`, optionally capped.
    Price,
}

/// Pricing parameters of a shipping method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodTerms {
    pub name: String,
    pub cost_type: CostType,
    pub base_cost: Money,
    #[serde(default)]
    pub cost_per_kg: Option<Money>,
    #[serde(default)]
    pub cost_percentage: Option<Rate>,
    /// Cap for price-based methods; zero means uncapped.
    #[serde(default)]
    pub max_cost: Option<Money>,
    /// Subtotal at or above which shipping is free; zero disables it.
    #[serde(default)]
    pub free_shipping_threshold: Option<Money>,
    /// Informational delivery estimate in days.
    #[serde(default)]
    pub estimated_days: Option<u32>,
}

impl MethodTerms {
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("shipping method name must not be empty"));
        }
        match self.cost_type {
            CostType::Weight if self.cost_per_kg.is_none() => Err(DomainError::validation(
                "weight-based methods require cost_per_kg",
            )),
            CostType::Price if self.cost_percentage.is_none() => Err(DomainError::validation(
                "price-based methods require cost_percentage",
            )),
            _ => Ok(()),
        }
    }
}

/// A priced shipping option, as frozen into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub zone_id: ShippingZoneId,
    pub zone_name: String,
    pub method_id: ShippingMethodId,
    pub method_name: String,
    pub cost: Money,
    #[serde(default)]
    pub estimated_days: Option<u32>,
}

/// Cost of shipping an order through a method with the given terms.
///
/// A missing weight counts as zero.
pub fn method_cost(terms: &MethodTerms, subtotal: Money, weight: Option<Decimal>) -> DomainResult<Money> {
    let weight = weight.unwrap_or(Decimal::ZERO);
    if weight < Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "weight must not be negative (got {weight})"
        )));
    }

    if let Some(threshold) = terms.free_shipping_threshold {
        if !threshold.is_zero() && subtotal >= threshold {
            return Ok(Money::ZERO);
        }
    }

    let cost = match terms.cost_type {
        CostType::Fixed => terms.base_cost,
        CostType::Weight => {
            let per_kg = terms.cost_per_kg.unwrap_or(Money::ZERO);
            terms.base_cost + per_kg.times(weight)
        }
        CostType::Price => {
            let pct = terms.cost_percentage.unwrap_or(Rate::ZERO).percent();
            let cost = terms.base_cost + subtotal.times(pct / Decimal::ONE_HUNDRED);
            match terms.max_cost {
                Some(cap) if !cap.is_zero() => cost.min(cap),
                _ => cost,
            }
        }
    };

    Ok(cost)
}
