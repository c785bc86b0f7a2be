//! Vendor settlement.
//!
//! - `ledger`: transactions derived from delivered sub-orders, balances and
//!   statements (pure folds over order and payout history)
//! - `payouts`: the per-vendor `VendorPayouts` aggregate governing withdrawal
//!   requests

pub mod ledger;
pub mod payouts;

pub use ledger::{
    accrued_net, balance_of, pending_transactions, settle, statement, transactions_for,
    BalanceCache, HistoryFingerprint, Transaction, TransactionStatus, VendorStatement,
};
pub use payouts::{
    DecideWithdrawal, PayoutDetails, RequestWithdrawal, VendorPayouts, VendorPayoutsCommand,
    VendorPayoutsEvent, VendorStatus, WithdrawalApproved, WithdrawalDecision, WithdrawalRejected,
    WithdrawalRequest, WithdrawalRequestRecord, WithdrawalRequested, WithdrawalStatus,
    AGGREGATE_TYPE,
};
