use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bazaar_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, Money, PolicyViolation, VendorId,
    WithdrawalId,
};
use bazaar_events::Event;

pub const AGGREGATE_TYPE: &str = "settlement.vendor_payouts";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VendorStatus {
    Active,
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalDecision {
    Approve,
    Reject,
}

impl WithdrawalDecision {
    fn target(self) -> WithdrawalStatus {
        match self {
            WithdrawalDecision::Approve => WithdrawalStatus::Approved,
            WithdrawalDecision::Reject => WithdrawalStatus::Rejected,
        }
    }
}

/// Where an approved withdrawal is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDetails {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
}

impl PayoutDetails {
    pub fn validate(&self) -> DomainResult<()> {
        for (field, value) in [
            ("bank_name", &self.bank_name),
            ("account_number", &self.account_number),
            ("account_holder", &self.account_holder),
        ] {
            if value.trim().is_empty() {
                return Err(DomainError::validation(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub vendor_id: VendorId,
    pub amount: Money,
    pub requested_at: DateTime<Utc>,
    pub status: WithdrawalStatus,
    pub payout: PayoutDetails,
    pub processed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl WithdrawalRequest {
    pub fn to_record(&self) -> WithdrawalRequestRecord {
        WithdrawalRequestRecord {
            id: self.id,
            vendor_id: self.vendor_id,
            amount: self.amount,
            requested_at: self.requested_at,
            status: self.status,
            bank_name: self.payout.bank_name.clone(),
            account_number: self.payout.account_number.clone(),
            account_holder: self.payout.account_holder.clone(),
            processed_at: self.processed_at,
            note: self.note.clone(),
        }
    }
}

/// Flat record shape of a withdrawal request (configuration store collections).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequestRecord {
    pub id: WithdrawalId,
    pub vendor_id: VendorId,
    pub amount: Money,
    pub requested_at: DateTime<Utc>,
    pub status: WithdrawalStatus,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Aggregate root: VendorPayouts (every withdrawal request of one vendor).
///
/// Keeping all of a vendor's requests in one stream means the reservation
/// check and the append are guarded by a single expected version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPayouts {
    id: VendorId,
    requests: Vec<WithdrawalRequest>,
    version: u64,
}

impl VendorPayouts {
    /// Create an empty aggregate instance for rehydration.
    pub fn empty(id: VendorId) -> Self {
        Self {
            id,
            requests: Vec::new(),
            version: 0,
        }
    }

    pub fn requests(&self) -> &[WithdrawalRequest] {
        &self.requests
    }

    pub fn request(&self, withdrawal_id: WithdrawalId) -> Option<&WithdrawalRequest> {
        self.requests.iter().find(|r| r.id == withdrawal_id)
    }

    fn total_with_status(&self, status: WithdrawalStatus) -> Money {
        self.requests
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.amount)
            .sum()
    }

    pub fn approved_total(&self) -> Money {
        self.total_with_status(WithdrawalStatus::Approved)
    }

    pub fn pending_total(&self) -> Money {
        self.total_with_status(WithdrawalStatus::Pending)
    }

    /// Funds that may still be requested: accrued net minus approved and
    /// pending withdrawals.
    pub fn available(&self, accrued_net: Money) -> Money {
        accrued_net
            .saturating_sub(self.approved_total())
            .saturating_sub(self.pending_total())
    }
}

impl AggregateRoot for VendorPayouts {
    type Id = VendorId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestWithdrawal.
///
/// `accrued_net` and `vendor_status` are read by the caller from the ledger and
/// the vendor directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestWithdrawal {
    pub withdrawal_id: WithdrawalId,
    pub amount: Decimal,
    pub payout: PayoutDetails,
    pub accrued_net: Money,
    pub vendor_status: VendorStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DecideWithdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideWithdrawal {
    pub withdrawal_id: WithdrawalId,
    pub decision: WithdrawalDecision,
    #[serde(default)]
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorPayoutsCommand {
    RequestWithdrawal(RequestWithdrawal),
    DecideWithdrawal(DecideWithdrawal),
}

/// Event: WithdrawalRequested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequested {
    pub vendor_id: VendorId,
    pub withdrawal_id: WithdrawalId,
    pub amount: Money,
    pub payout: PayoutDetails,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalApproved {
    pub vendor_id: VendorId,
    pub withdrawal_id: WithdrawalId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRejected {
    pub vendor_id: VendorId,
    pub withdrawal_id: WithdrawalId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorPayoutsEvent {
    WithdrawalRequested(WithdrawalRequested),
    WithdrawalApproved(WithdrawalApproved),
    WithdrawalRejected(WithdrawalRejected),
}

impl Event for VendorPayoutsEvent {
    fn aggregate_type(&self) -> &'static str {
        AGGREGATE_TYPE
    }

    fn event_type(&self) -> &'static str {
        match self {
            VendorPayoutsEvent::WithdrawalRequested(_) => "settlement.withdrawal.requested",
            VendorPayoutsEvent::WithdrawalApproved(_) => "settlement.withdrawal.approved",
            VendorPayoutsEvent::WithdrawalRejected(_) => "settlement.withdrawal.rejected",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            VendorPayoutsEvent::WithdrawalRequested(e) => e.occurred_at,
            VendorPayoutsEvent::WithdrawalApproved(e) => e.occurred_at,
            VendorPayoutsEvent::WithdrawalRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for VendorPayouts {
    type Command = VendorPayoutsCommand;
    type Event = VendorPayoutsEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            VendorPayoutsEvent::WithdrawalRequested(e) => {
                self.requests.push(WithdrawalRequest {
                    id: e.withdrawal_id,
                    vendor_id: e.vendor_id,
                    amount: e.amount,
                    requested_at: e.occurred_at,
                    status: WithdrawalStatus::Pending,
                    payout: e.payout.clone(),
                    processed_at: None,
                    note: None,
                });
            }
            VendorPayoutsEvent::WithdrawalApproved(e) => {
                self.settle_request(e.withdrawal_id, WithdrawalStatus::Approved, &e.note, e.occurred_at);
            }
            VendorPayoutsEvent::WithdrawalRejected(e) => {
                self.settle_request(e.withdrawal_id, WithdrawalStatus::Rejected, &e.note, e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            VendorPayoutsCommand::RequestWithdrawal(cmd) => self.handle_request(cmd),
            VendorPayoutsCommand::DecideWithdrawal(cmd) => self.handle_decide(cmd),
        }
    }
}

impl VendorPayouts {
    fn settle_request(
        &mut self,
        withdrawal_id: WithdrawalId,
        status: WithdrawalStatus,
        note: &Option<String>,
        at: DateTime<Utc>,
    ) {
        if let Some(r) = self.requests.iter_mut().find(|r| r.id == withdrawal_id) {
            r.status = status;
            r.note = note.clone();
            r.processed_at = Some(at);
        }
    }

    fn handle_request(&self, cmd: &RequestWithdrawal) -> DomainResult<Vec<VendorPayoutsEvent>> {
        let amount = Money::positive(cmd.amount, "withdrawal amount")?;
        cmd.payout.validate()?;

        if cmd.vendor_status != VendorStatus::Active {
            return Err(PolicyViolation::VendorInactive.into());
        }
        if self.request(cmd.withdrawal_id).is_some() {
            return Err(
                PolicyViolation::AlreadyExists(format!("withdrawal request '{}'", cmd.withdrawal_id))
                    .into(),
            );
        }

        let available = self.available(cmd.accrued_net);
        if amount > available {
            return Err(PolicyViolation::InsufficientBalance {
                available: available.to_string(),
                requested: amount.to_string(),
            }
            .into());
        }

        Ok(vec![VendorPayoutsEvent::WithdrawalRequested(WithdrawalRequested {
            vendor_id: self.id,
            withdrawal_id: cmd.withdrawal_id,
            amount,
            payout: cmd.payout.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decide(&self, cmd: &DecideWithdrawal) -> DomainResult<Vec<VendorPayoutsEvent>> {
        let request = self
            .request(cmd.withdrawal_id)
            .ok_or_else(|| DomainError::not_found("withdrawal request", cmd.withdrawal_id))?;

        let target = cmd.decision.target();
        if request.status != WithdrawalStatus::Pending {
            return Err(DomainError::invalid_transition(request.status, target));
        }

        let event = match cmd.decision {
            WithdrawalDecision::Approve => VendorPayoutsEvent::WithdrawalApproved(WithdrawalApproved {
                vendor_id: self.id,
                withdrawal_id: cmd.withdrawal_id,
                note: cmd.note.clone(),
                occurred_at: cmd.occurred_at,
            }),
            WithdrawalDecision::Reject => VendorPayoutsEvent::WithdrawalRejected(WithdrawalRejected {
                vendor_id: self.id,
                withdrawal_id: cmd.withdrawal_id,
                note: cmd.note.clone(),
                occurred_at: cmd.occurred_at,
            }),
        };
        Ok(vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn money(v: Decimal) -> Money {
        Money::new(v).unwrap()
    }

    fn bank() -> PayoutDetails {
        PayoutDetails {
            bank_name: "BCA".into(),
            account_number: "1234567890".into(),
            account_holder: "Toko Maju".into(),
        }
    }

    fn request_cmd(amount: Decimal, accrued_net: Decimal) -> VendorPayoutsCommand {
        VendorPayoutsCommand::RequestWithdrawal(RequestWithdrawal {
            withdrawal_id: WithdrawalId::new(),
            amount,
            payout: bank(),
            accrued_net: money(accrued_net),
            vendor_status: VendorStatus::Active,
            occurred_at: test_time(),
        })
    }

    fn decide_cmd(withdrawal_id: WithdrawalId, decision: WithdrawalDecision) -> VendorPayoutsCommand {
        VendorPayoutsCommand::DecideWithdrawal(DecideWithdrawal {
            withdrawal_id,
            decision,
            note: Some("checked".into()),
            occurred_at: test_time(),
        })
    }

    fn execute(payouts: &mut VendorPayouts, cmd: VendorPayoutsCommand) -> DomainResult<Vec<VendorPayoutsEvent>> {
        let events = payouts.handle(&cmd)?;
        for e in &events {
            payouts.apply(e);
        }
        Ok(events)
    }

    fn requested_id(events: &[VendorPayoutsEvent]) -> WithdrawalId {
        match &events[0] {
            VendorPayoutsEvent::WithdrawalRequested(e) => e.withdrawal_id,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn pending_requests_reserve_balance() {
        let mut payouts = VendorPayouts::empty(VendorId::new());
        execute(&mut payouts, request_cmd(dec!(900000), dec!(900000))).unwrap();

        let err = execute(&mut payouts, request_cmd(dec!(500000), dec!(900000))).unwrap_err();
        assert_eq!(
            err.policy(),
            Some(&PolicyViolation::InsufficientBalance {
                available: "0".into(),
                requested: "500000".into()
            })
        );
    }

    #[test]
    fn rejection_releases_the_reservation() {
        let mut payouts = VendorPayouts::empty(VendorId::new());
        let events = execute(&mut payouts, request_cmd(dec!(900000), dec!(900000))).unwrap();
        execute(&mut payouts, decide_cmd(requested_id(&events), WithdrawalDecision::Reject)).unwrap();

        assert_eq!(payouts.available(money(dec!(900000))), money(dec!(900000)));
        execute(&mut payouts, request_cmd(dec!(500000), dec!(900000))).unwrap();
    }

    #[test]
    fn approval_consumes_balance_and_records_the_decision() {
        let mut payouts = VendorPayouts::empty(VendorId::new());
        let events = execute(&mut payouts, request_cmd(dec!(400000), dec!(900000))).unwrap();
        let id = requested_id(&events);
        execute(&mut payouts, decide_cmd(id, WithdrawalDecision::Approve)).unwrap();

        let request = payouts.request(id).unwrap();
        assert_eq!(request.status, WithdrawalStatus::Approved);
        assert_eq!(request.note.as_deref(), Some("checked"));
        assert!(request.processed_at.is_some());
        assert_eq!(payouts.approved_total(), money(dec!(400000)));
        assert_eq!(payouts.pending_total(), Money::ZERO);
    }

    #[test]
    fn deciding_twice_is_an_invalid_transition() {
        let mut payouts = VendorPayouts::empty(VendorId::new());
        let events = execute(&mut payouts, request_cmd(dec!(10), dec!(10))).unwrap();
        let id = requested_id(&events);
        execute(&mut payouts, decide_cmd(id, WithdrawalDecision::Approve)).unwrap();

        let err = execute(&mut payouts, decide_cmd(id, WithdrawalDecision::Reject)).unwrap_err();
        assert_eq!(
            err.policy(),
            Some(&PolicyViolation::InvalidTransition {
                from: "approved".into(),
                to: "rejected".into()
            })
        );
    }

    #[test]
    fn non_positive_amounts_are_validation_errors() {
        let payouts = VendorPayouts::empty(VendorId::new());
        for amount in [dec!(0), dec!(-5)] {
            let err = payouts.handle(&request_cmd(amount, dec!(100))).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn suspended_vendors_cannot_request() {
        let payouts = VendorPayouts::empty(VendorId::new());
        let cmd = VendorPayoutsCommand::RequestWithdrawal(RequestWithdrawal {
            withdrawal_id: WithdrawalId::new(),
            amount: dec!(1),
            payout: bank(),
            accrued_net: money(dec!(100)),
            vendor_status: VendorStatus::Suspended,
            occurred_at: test_time(),
        });
        let err = payouts.handle(&cmd).unwrap_err();
        assert_eq!(err.policy(), Some(&PolicyViolation::VendorInactive));
    }

    #[test]
    fn unknown_request_is_not_found() {
        let payouts = VendorPayouts::empty(VendorId::new());
        let err = payouts
            .handle(&decide_cmd(WithdrawalId::new(), WithdrawalDecision::Approve))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn records_flatten_payout_details() {
        let mut payouts = VendorPayouts::empty(VendorId::new());
        execute(&mut payouts, request_cmd(dec!(10), dec!(10))).unwrap();

        let json = serde_json::to_value(payouts.requests()[0].to_record()).unwrap();
        assert_eq!(json["bankName"], "BCA");
        assert_eq!(json["status"], "pending");
    }

    #[derive(Debug, Clone)]
    enum Step {
        Request(i64),
        Approve(usize),
        Reject(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1i64..500_000).prop_map(Step::Request),
            (0usize..16).prop_map(Step::Approve),
            (0usize..16).prop_map(Step::Reject),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn reserved_and_paid_never_exceed_accrued(
            accrued in 0i64..2_000_000,
            steps in proptest::collection::vec(step(), 1..40),
        ) {
            let accrued = Decimal::new(accrued, 2);
            let mut payouts = VendorPayouts::empty(VendorId::new());

            for step in steps {
                let cmd = match step {
                    Step::Request(cents) => request_cmd(Decimal::new(cents, 2), accrued),
                    Step::Approve(_) | Step::Reject(_) if payouts.requests().is_empty() => continue,
                    Step::Approve(i) => {
                        let id = payouts.requests()[i % payouts.requests().len()].id;
                        decide_cmd(id, WithdrawalDecision::Approve)
                    }
                    Step::Reject(i) => {
                        let id = payouts.requests()[i % payouts.requests().len()].id;
                        decide_cmd(id, WithdrawalDecision::Reject)
                    }
                };
                let _ = execute(&mut payouts, cmd);

                let committed = payouts.approved_total() + payouts.pending_total();
                prop_assert!(committed.amount() <= accrued);
            }
        }
    }
}
