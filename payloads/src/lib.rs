//! Shared domain types for the funds & bonus ledger engine.
//!
//! The request-handling layer authenticates the caller, builds a
//! [`Principal`] plus one of the [`requests`] structs, and hands both to the
//! ledger engine. The engine answers with a [`responses`] receipt or a typed
//! store error.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod requests;
pub mod responses;

/// Id type wrapper helps ensure we don't mix up ids for different tables.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct UserId(pub Uuid);

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    Serialize,
    Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct AccountId(pub Uuid);

/// Identifier of one immutable transaction-log record. Generated by the
/// engine, never supplied by callers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct BonusOperationId(pub Uuid);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct TicketId(pub Uuid);

/// Reporting category attached to every transaction.
///
/// Categories are small configured integers. Two of them are well-known
/// fallbacks with distinct, deliberate uses per protocol: see
/// [`CategoryId::TRANSFERS`] and [`CategoryId::OTHER`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize,
)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "use-sqlx", sqlx(transparent))]
pub struct CategoryId(pub i32);

impl CategoryId {
    /// Default category for internal transfers.
    pub const TRANSFERS: CategoryId = CategoryId(7);
    /// Default category for phone-directed transfers and purchases.
    pub const OTHER: CategoryId = CategoryId(10);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "account_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Checking,
    Savings,
    BusinessPrimary,
}

impl AccountKind {
    /// Whether this kind of account can receive phone-directed transfers.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Checking | Self::BusinessPrimary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "transaction_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    InternalTransfer,
    /// Phone-directed transfer to an individual recipient.
    P2p,
    /// Phone-directed transfer to a business recipient.
    P2b,
    Deposit,
    Purchase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "bonus_operation_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BonusOperationKind {
    Accrual,
    Withdrawal,
}

/// Business/individual classification of a user, as declared on their
/// profile. Drives transaction-kind and category selection for
/// phone-directed transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[cfg_attr(feature = "use-sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "use-sqlx",
    sqlx(type_name = "user_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    Individual,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// The authenticated caller, resolved by the request layer before any
/// engine operation is invoked. The engine authorizes against it but never
/// authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }
}
