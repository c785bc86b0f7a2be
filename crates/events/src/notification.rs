//! Integration messages for the notifier (email / in-app delivery lives elsewhere).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{Money, OrderId, VendorId, WithdrawalId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A vendor sub-order moved to a new fulfillment status.
    FulfillmentTransitioned {
        order_id: OrderId,
        vendor_id: VendorId,
        from: String,
        to: String,
        occurred_at: DateTime<Utc>,
    },
    /// An admin approved or rejected a withdrawal request.
    WithdrawalDecided {
        withdrawal_id: WithdrawalId,
        vendor_id: VendorId,
        amount: Money,
        approved: bool,
        occurred_at: DateTime<Utc>,
    },
}

impl Notification {
    pub fn topic(&self) -> &'static str {
        match self {
            Notification::FulfillmentTransitioned { .. } => "orders.fulfillment_transitioned",
            Notification::WithdrawalDecided { .. } => "payouts.withdrawal_decided",
        }
    }

    pub fn vendor_id(&self) -> VendorId {
        match self {
            Notification::FulfillmentTransitioned { vendor_id, .. }
            | Notification::WithdrawalDecided { vendor_id, .. } => *vendor_id,
        }
    }
}
