//! Typed operation parameters.
//!
//! The request layer has already parsed and authenticated by the time these
//! are built; amounts are still re-validated by the engine (positive,
//! sufficient funds) since those checks belong to the ledger's critical
//! section.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, AccountKind, TicketId};

pub const PHONE_NUMBER_MAX_LEN: usize = 20;

/// Account-to-account transfer between two known accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InternalTransfer {
    pub source: AccountId,
    pub destination: AccountId,
    pub amount: Decimal,
}

/// Transfer where the recipient is addressed by phone number; the engine
/// resolves their oldest active primary account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneTransfer {
    pub source: AccountId,
    pub recipient_phone: String,
    pub amount: Decimal,
}

/// External funds into one of the caller's own accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub destination: AccountId,
    pub amount: Decimal,
}

/// Buy a catalog ticket, optionally offsetting up to half the price from
/// the caller's bonus wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseTicket {
    pub ticket: TicketId,
    pub account: AccountId,
    pub use_bonus: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccount {
    pub kind: AccountKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseAccount {
    pub account: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTransactions {
    pub account: AccountId,
    pub limit: i64,
    pub offset: i64,
}
