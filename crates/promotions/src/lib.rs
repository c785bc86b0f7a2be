//! Promo codes domain module (event-sourced).
//!
//! Validates promo codes against an order context, computes discounts and
//! records redemptions. Pure domain logic: no IO, no storage.

pub mod evaluator;
pub mod promo_code;

pub use evaluator::{compute_discount, Discount};
pub use promo_code::{
    normalize_code, promo_stream_id, ActivatePromoCode, CreatePromoCode, DeactivatePromoCode,
    DiscountType, PromoCode, PromoCodeActivated, PromoCodeCommand, PromoCodeCreated,
    PromoCodeDeactivated, PromoCodeEvent, PromoCodeRecord, PromoCodeRedeemed, PromoTerms,
    PromoTermsUpdated, RedeemPromoCode, UpdatePromoTerms, AGGREGATE_TYPE,
};
