//! Success payloads returned by the engine.
//!
//! Receipts carry confirmation plus the generated transaction id; new
//! balances are intentionally not echoed back (the request layer fetches
//! views separately when it needs them).

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    AccountId, AccountKind, BonusOperationId, BonusOperationKind, CategoryId,
    TransactionId, TransactionKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub transaction_id: TransactionId,
    /// Portion of the price debited from the paying account.
    pub cash_portion: Decimal,
    /// Portion of the price covered by the bonus wallet.
    pub bonus_portion: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: AccountId,
    pub kind: AccountKind,
    pub balance: Decimal,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// One immutable transaction-log record, as shown to account owners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    pub transaction_id: TransactionId,
    pub source: Option<AccountId>,
    pub destination: Option<AccountId>,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub category: CategoryId,
    pub recipient_phone: Option<String>,
    pub bonus_used: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusOperationView {
    pub operation_id: BonusOperationId,
    pub amount: Decimal,
    pub kind: BonusOperationKind,
    pub description: String,
    pub created_at: Timestamp,
}

/// The caller's bonus wallet: current balance plus the append-only
/// operation log that explains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusWallet {
    pub balance: Decimal,
    pub operations: Vec<BonusOperationView>,
}
