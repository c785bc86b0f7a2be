//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Stable, machine-readable error category.
///
/// Every error surfaced by the engine maps to exactly one kind; callers at the
/// UI boundary translate kinds into user-facing text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    PolicyViolation,
    NotFound,
    ConcurrencyConflict,
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::PolicyViolation => "policy_violation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ConcurrencyConflict => "concurrency_conflict",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business rule that rejected an otherwise well-formed request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("promo code is not active")]
    CodeInactive,

    #[error("promo code is outside its validity window")]
    OutOfValidityWindow,

    #[error("order subtotal is below the promo code minimum")]
    BelowMinimumOrder,

    #[error("promo code usage limit reached")]
    GlobalLimitReached,

    #[error("promo code per-user limit reached")]
    UserLimitReached,

    #[error("shipping zone has no active methods")]
    NoActiveMethodsInZone,

    #[error("shipping zone still owns shipping methods")]
    ZoneHasMethods,

    #[error("insufficient balance (available: {available}, requested: {requested})")]
    InsufficientBalance { available: String, requested: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("vendor is not active")]
    VendorInactive,

    #[error("{0} already exists")]
    AlreadyExists(String),
}

impl PolicyViolation {
    /// Stable snake_case identifier of the violated rule.
    pub fn code(&self) -> &'static str {
        match self {
            PolicyViolation::CodeInactive => "code_inactive",
            PolicyViolation::OutOfValidityWindow => "out_of_validity_window",
            PolicyViolation::BelowMinimumOrder => "below_minimum_order",
            PolicyViolation::GlobalLimitReached => "global_limit_reached",
            PolicyViolation::UserLimitReached => "user_limit_reached",
            PolicyViolation::NoActiveMethodsInZone => "no_active_methods_in_zone",
            PolicyViolation::ZoneHasMethods => "zone_has_methods",
            PolicyViolation::InsufficientBalance { .. } => "insufficient_balance",
            PolicyViolation::InvalidTransition { .. } => "invalid_transition",
            PolicyViolation::VendorInactive => "vendor_inactive",
            PolicyViolation::AlreadyExists(_) => "already_exists",
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// policy, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, negative amount).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A business rule rejected the request.
    #[error("policy violation: {0}")]
    Policy(#[from] PolicyViolation),

    /// A referenced code/zone/method/order/vendor/request is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: &str, key: impl core::fmt::Display) -> Self {
        Self::NotFound(format!("{what} '{key}'"))
    }

    pub fn invalid_transition(from: impl core::fmt::Debug, to: impl core::fmt::Debug) -> Self {
        Self::Policy(PolicyViolation::InvalidTransition {
            from: format!("{from:?}").to_lowercase(),
            to: format!("{to:?}").to_lowercase(),
        })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::Policy(_) => ErrorKind::PolicyViolation,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Conflict(_) => ErrorKind::ConcurrencyConflict,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_failed",
            DomainError::Policy(p) => p.code(),
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "version_conflict",
        }
    }

    /// The violated policy, if this is a policy failure.
    pub fn policy(&self) -> Option<&PolicyViolation> {
        match self {
            DomainError::Policy(p) => Some(p),
            _ => None,
        }
    }
}
