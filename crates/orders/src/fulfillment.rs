//! Fulfillment state machine.
//!
//! ```text
//! pending ──► processing ──► shipped ──► delivered
//!    │            │             │
//!    └────────────┴─────────────┴──────► cancelled
//! pending ──────────────────► shipped
//! ```

use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FulfillmentStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl FulfillmentStatus {
    pub const ALL: [FulfillmentStatus; 5] = [
        FulfillmentStatus::Pending,
        FulfillmentStatus::Processing,
        FulfillmentStatus::Shipped,
        FulfillmentStatus::Delivered,
        FulfillmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FulfillmentStatus::Delivered | FulfillmentStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Pending, Shipped)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending | Processing | Shipped, Cancelled)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: FulfillmentStatus) -> DomainResult<FulfillmentStatus> {
        if !self.can_transition_to(next) {
            return Err(DomainError::invalid_transition(self, next));
        }
        Ok(next)
    }
}

impl core::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for FulfillmentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FulfillmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown fulfillment status '{s}'")))
    }
}

/// Order-level status derived from its vendor sub-orders.
///
/// All equal gives that status. All terminal with at least one delivery gives
/// `delivered`. Otherwise the least advanced in-flight status wins. `None` for
/// an order without sub-orders.
pub fn derive_order_status<I>(statuses: I) -> Option<FulfillmentStatus>
where
    I: IntoIterator<Item = FulfillmentStatus>,
{
    let statuses: Vec<_> = statuses.into_iter().collect();
    let first = *statuses.first()?;

    if statuses.iter().all(|s| *s == first) {
        return Some(first);
    }
    if statuses.iter().all(FulfillmentStatus::is_terminal) {
        // Mixed terminal states: at least one delivered, the rest cancelled.
        return Some(FulfillmentStatus::Delivered);
    }
    statuses.into_iter().filter(|s| !s.is_terminal()).min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::PolicyViolation;
    use proptest::prelude::*;
    use FulfillmentStatus::*;

    #[test]
    fn shipped_cannot_go_back_to_processing() {
        let err = Shipped.transition(Processing).unwrap_err();
        assert_eq!(
            err.policy(),
            Some(&PolicyViolation::InvalidTransition {
                from: "shipped".into(),
                to: "processing".into()
            })
        );
    }

    #[test]
    fn pending_may_skip_processing() {
        assert_eq!(Pending.transition(Shipped).unwrap(), Shipped);
    }

    #[test]
    fn self_transitions_are_illegal() {
        for status in FulfillmentStatus::ALL {
            assert!(!status.can_transition_to(status), "{status}");
        }
    }

    #[test]
    fn derived_status_prefers_least_advanced_in_flight() {
        assert_eq!(derive_order_status([Shipped, Processing, Delivered]), Some(Processing));
        assert_eq!(derive_order_status([Delivered, Cancelled]), Some(Delivered));
        assert_eq!(derive_order_status([Cancelled, Cancelled]), Some(Cancelled));
        assert_eq!(derive_order_status([Cancelled, Shipped]), Some(Shipped));
        assert_eq!(derive_order_status(Vec::new()), None);
    }

    #[test]
    fn statuses_parse_from_lowercase_names() {
        assert_eq!("delivered".parse::<FulfillmentStatus>().unwrap(), Delivered);
        assert!("lost".parse::<FulfillmentStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = FulfillmentStatus> {
        proptest::sample::select(FulfillmentStatus::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn terminal_states_reject_every_transition(next in any_status()) {
            for terminal in [Delivered, Cancelled] {
                let err = terminal.transition(next).unwrap_err();
                prop_assert_eq!(err.code(), "invalid_transition");
            }
        }
    }
}
