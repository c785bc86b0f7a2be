use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bazaar_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Money, OrderId,
    PolicyViolation, UserId,
};
use bazaar_events::Event;

use crate::evaluator::{compute_discount, Discount};

pub const AGGREGATE_TYPE: &str = "promotions.promo_code";

/// Namespace for deriving promo code stream ids from their normalized code.
const PROMO_CODE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b7e_94d3_4c55_b0a8_51e2_7d3f_9a10);

const MAX_CODE_LEN: usize = 32;

/// Canonical form of a code: trimmed, upper-cased. Codes are case-insensitive.
pub fn normalize_code(code: &str) -> DomainResult<String> {
    let code = code.trim().to_uppercase();
    if code.is_empty() {
        return Err(DomainError::validation("promo code must not be empty"));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(DomainError::validation(format!(
            "promo code must be at most {MAX_CODE_LEN} characters"
        )));
    }
    if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(DomainError::validation(
            "promo code may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(code)
}

/// Stream id of a promo code. One stream per normalized code, which is what
/// makes codes unique.
pub fn promo_stream_id(code: &str) -> DomainResult<AggregateId> {
    let normalized = normalize_code(code)?;
    Ok(AggregateId::from_uuid(Uuid::new_v5(
        &PROMO_CODE_NAMESPACE,
        normalized.as_bytes(),
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// Admin-authored redemption rules of a promo code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoTerms {
    pub discount_type: DiscountType,
    /// Percent (0, 100] for percentage codes, an amount for fixed codes.
    pub value: Decimal,
    pub min_order_amount: Money,
    /// Cap for percentage codes; zero means uncapped.
    pub max_discount: Option<Money>,
    pub usage_limit: u32,
    pub user_limit: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub description: Option<String>,
}

impl PromoTerms {
    pub fn validate(&self) -> DomainResult<()> {
        if self.value <= Decimal::ZERO {
            return Err(DomainError::validation("discount value must be greater than zero"));
        }
        match self.discount_type {
            DiscountType::Percentage if self.value > Decimal::ONE_HUNDRED => {
                return Err(DomainError::validation(
                    "percentage discount must not exceed 100",
                ));
            }
            DiscountType::Fixed if self.max_discount.is_some() => {
                return Err(DomainError::validation(
                    "max_discount only applies to percentage codes",
                ));
            }
            _ => {}
        }
        if self.usage_limit == 0 {
            return Err(DomainError::validation("usage_limit must be at least 1"));
        }
        if self.user_limit == 0 {
            return Err(DomainError::validation("user_limit must be at least 1"));
        }
        if self.valid_from > self.valid_until {
            return Err(DomainError::validation("valid_from must not be after valid_until"));
        }
        Ok(())
    }
}

/// Aggregate root: PromoCode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoCode {
    id: AggregateId,
    code: String,
    terms: Option<PromoTerms>,
    is_active: bool,
    used_count: u32,
    usage_by_user: BTreeMap<UserId, u32>,
    redeemed_orders: BTreeSet<OrderId>,
    version: u64,
}

impl PromoCode {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AggregateId) -> Self {
        Self {
            id,
            code: String::new(),
            terms: None,
            is_active: false,
            used_count: 0,
            usage_by_user: BTreeMap::new(),
            redeemed_orders: BTreeSet::new(),
            version: 0,
        }
    }

    /// Empty aggregate for `code`'s stream, so lookups can name the code.
    pub fn named(code: &str) -> DomainResult<Self> {
        let mut promo = Self::empty(promo_stream_id(code)?);
        promo.code = normalize_code(code)?;
        Ok(promo)
    }

    pub fn exists(&self) -> bool {
        self.terms.is_some()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn terms(&self) -> Option<&PromoTerms> {
        self.terms.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn used_count(&self) -> u32 {
        self.used_count
    }

    pub fn uses_by(&self, user_id: UserId) -> u32 {
        self.usage_by_user.get(&user_id).copied().unwrap_or(0)
    }

    pub fn was_redeemed_for(&self, order_id: OrderId) -> bool {
        self.redeemed_orders.contains(&order_id)
    }

    /// Preview the discount this code grants (no usage is recorded).
    ///
    /// Checks run in a fixed order and the first failure wins: existence,
    /// active flag, validity window, minimum order, global limit, per-user
    /// limit.
    pub fn evaluate(&self, subtotal: Money, user_id: UserId, now: DateTime<Utc>) -> DomainResult<Discount> {
        let terms = self.terms_or_not_found()?;

        if !self.is_active {
            return Err(PolicyViolation::CodeInactive.into());
        }
        if now < terms.valid_from || now > terms.valid_until {
            return Err(PolicyViolation::OutOfValidityWindow.into());
        }
        if subtotal < terms.min_order_amount {
            return Err(PolicyViolation::BelowMinimumOrder.into());
        }
        if self.used_count >= terms.usage_limit {
            return Err(PolicyViolation::GlobalLimitReached.into());
        }
        if self.uses_by(user_id) >= terms.user_limit {
            return Err(PolicyViolation::UserLimitReached.into());
        }

        Ok(Discount {
            code: self.code.clone(),
            amount: compute_discount(terms, subtotal),
        })
    }

    /// Snapshot as a plain record (configuration export).
    pub fn to_record(&self) -> Option<PromoCodeRecord> {
        let terms = self.terms.as_ref()?;
        Some(PromoCodeRecord {
            code: self.code.clone(),
            discount_type: terms.discount_type,
            value: terms.value,
            min_order_amount: terms.min_order_amount,
            max_discount: terms.max_discount,
            usage_limit: terms.usage_limit,
            user_limit: terms.user_limit,
            used_count: self.used_count,
            valid_from: terms.valid_from,
            valid_until: terms.valid_until,
            is_active: self.is_active,
            description: terms.description.clone(),
        })
    }

    fn terms_or_not_found(&self) -> DomainResult<&PromoTerms> {
        self.terms
            .as_ref()
            .ok_or_else(|| match self.code.as_str() {
                "" => DomainError::not_found("promo code", self.id),
                code => DomainError::not_found("promo code", code),
            })
    }
}

impl AggregateRoot for PromoCode {
    type Id = AggregateId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Persisted record shape of a promo code (configuration store collections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoCodeRecord {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_amount: Money,
    #[serde(default)]
    pub max_discount: Option<Money>,
    pub usage_limit: u32,
    pub user_limit: u32,
    #[serde(default)]
    pub used_count: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl PromoCodeRecord {
    pub fn terms(&self) -> PromoTerms {
        PromoTerms {
            discount_type: self.discount_type,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount: self.max_discount,
            usage_limit: self.usage_limit,
            user_limit: self.user_limit,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            description: self.description.clone(),
        }
    }
}

/// Command: CreatePromoCode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePromoCode {
    pub code: String,
    pub terms: PromoTerms,
    pub is_active: bool,
    /// Usage already consumed elsewhere (legacy import); zero for new codes.
    #[serde(default)]
    pub used_count: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePromoTerms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePromoTerms {
    pub terms: PromoTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ActivatePromoCode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivatePromoCode {
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeactivatePromoCode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeactivatePromoCode {
    pub occurred_at: DateTime<Utc>,
}

/// Command: RedeemPromoCode (checkout).
///
/// Re-runs the full evaluation against the current state, so the decision and
/// the usage increment are guarded by the same stream version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemPromoCode {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub subtotal: Money,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromoCodeCommand {
    CreatePromoCode(CreatePromoCode),
    UpdatePromoTerms(UpdatePromoTerms),
    ActivatePromoCode(ActivatePromoCode),
    DeactivatePromoCode(DeactivatePromoCode),
    RedeemPromoCode(RedeemPromoCode),
}

/// Event: PromoCodeCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeCreated {
    pub code: String,
    pub terms: PromoTerms,
    pub is_active: bool,
    #[serde(default)]
    pub used_count: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PromoTermsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoTermsUpdated {
    pub code: String,
    pub terms: PromoTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PromoCodeActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeActivated {
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PromoCodeDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeDeactivated {
    pub code: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PromoCodeRedeemed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCodeRedeemed {
    pub code: String,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub subtotal: Money,
    pub discount: Money,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromoCodeEvent {
    PromoCodeCreated(PromoCodeCreated),
    PromoTermsUpdated(PromoTermsUpdated),
    PromoCodeActivated(PromoCodeActivated),
    PromoCodeDeactivated(PromoCodeDeactivated),
    PromoCodeRedeemed(PromoCodeRedeemed),
}

impl Event for PromoCodeEvent {
    fn aggregate_type(&self) -> &'static str {
        AGGREGATE_TYPE
    }

    fn event_type(&self) -> &'static str {
        match self {
            PromoCodeEvent::PromoCodeCreated(_) => "promotions.promo_code.created",
            PromoCodeEvent::PromoTermsUpdated(_) => "promotions.promo_code.terms_updated",
            PromoCodeEvent::PromoCodeActivated(_) => "promotions.promo_code.activated",
            PromoCodeEvent::PromoCodeDeactivated(_) => "promotions.promo_code.deactivated",
            PromoCodeEvent::PromoCodeRedeemed(_) => "promotions.promo_code.redeemed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PromoCodeEvent::PromoCodeCreated(e) => e.occurred_at,
            PromoCodeEvent::PromoTermsUpdated(e) => e.occurred_at,
            PromoCodeEvent::PromoCodeActivated(e) => e.occurred_at,
            PromoCodeEvent::PromoCodeDeactivated(e) => e.occurred_at,
            PromoCodeEvent::PromoCodeRedeemed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PromoCode {
    type Command = PromoCodeCommand;
    type Event = PromoCodeEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PromoCodeEvent::PromoCodeCreated(e) => {
                self.code = e.code.clone();
                self.terms = Some(e.terms.clone());
                self.is_active = e.is_active;
                self.used_count = e.used_count;
                self.usage_by_user.clear();
                self.redeemed_orders.clear();
            }
            PromoCodeEvent::PromoTermsUpdated(e) => {
                self.terms = Some(e.terms.clone());
            }
            PromoCodeEvent::PromoCodeActivated(_) => {
                self.is_active = true;
            }
            PromoCodeEvent::PromoCodeDeactivated(_) => {
                self.is_active = false;
            }
            PromoCodeEvent::PromoCodeRedeemed(e) => {
                self.used_count += 1;
                *self.usage_by_user.entry(e.user_id).or_insert(0) += 1;
                self.redeemed_orders.insert(e.order_id);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PromoCodeCommand::CreatePromoCode(cmd) => self.handle_create(cmd),
            PromoCodeCommand::UpdatePromoTerms(cmd) => self.handle_update(cmd),
            PromoCodeCommand::ActivatePromoCode(cmd) => self.handle_activate(cmd),
            PromoCodeCommand::DeactivatePromoCode(cmd) => self.handle_deactivate(cmd),
            PromoCodeCommand::RedeemPromoCode(cmd) => self.handle_redeem(cmd),
        }
    }
}

impl PromoCode {
    fn handle_create(&self, cmd: &CreatePromoCode) -> DomainResult<Vec<PromoCodeEvent>> {
        let code = normalize_code(&cmd.code)?;
        if self.exists() {
            return Err(PolicyViolation::AlreadyExists(format!("promo code '{code}'")).into());
        }
        cmd.terms.validate()?;
        if cmd.used_count > cmd.terms.usage_limit {
            return Err(DomainError::validation("used_count must not exceed usage_limit"));
        }

        Ok(vec![PromoCodeEvent::PromoCodeCreated(PromoCodeCreated {
            code,
            terms: cmd.terms.clone(),
            is_active: cmd.is_active,
            used_count: cmd.used_count,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdatePromoTerms) -> DomainResult<Vec<PromoCodeEvent>> {
        self.terms_or_not_found()?;
        cmd.terms.validate()?;
        if cmd.terms.usage_limit < self.used_count {
            return Err(DomainError::validation(format!(
                "usage_limit cannot drop below the {} uses already recorded",
                self.used_count
            )));
        }

        Ok(vec![PromoCodeEvent::PromoTermsUpdated(PromoTermsUpdated {
            code: self.code.clone(),
            terms: cmd.terms.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_activate(&self, cmd: &ActivatePromoCode) -> DomainResult<Vec<PromoCodeEvent>> {
        self.terms_or_not_found()?;
        if self.is_active {
            return Ok(vec![]);
        }
        Ok(vec![PromoCodeEvent::PromoCodeActivated(PromoCodeActivated {
            code: self.code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_deactivate(&self, cmd: &DeactivatePromoCode) -> DomainResult<Vec<PromoCodeEvent>> {
        self.terms_or_not_found()?;
        if !self.is_active {
            return Ok(vec![]);
        }
        Ok(vec![PromoCodeEvent::PromoCodeDeactivated(PromoCodeDeactivated {
            code: self.code.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_redeem(&self, cmd: &RedeemPromoCode) -> DomainResult<Vec<PromoCodeEvent>> {
        // Resubmitted checkout: the use was already counted.
        if self.was_redeemed_for(cmd.order_id) {
            return Ok(vec![]);
        }

        let discount = self.evaluate(cmd.subtotal, cmd.user_id, cmd.now)?;

        Ok(vec![PromoCodeEvent::PromoCodeRedeemed(PromoCodeRedeemed {
            code: self.code.clone(),
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            subtotal: cmd.subtotal,
            discount: discount.amount,
            occurred_at: cmd.now,
        })])
    }
}
