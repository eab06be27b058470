//! Ledger storage layer.
//!
//! ## Design Decisions
//!
//! ### Injected store handle
//! The engine never reaches for a global connection. A [`LedgerStore`]
//! implementation is opened at process start (see
//! [`postgres::PgStore::connect`]) and passed into the engine by value;
//! tests inject [`memory::MemStore`] instead.
//!
//! ### One atomic unit per money movement
//! Every multi-step protocol funnels into a single [`LedgerCommit`]: the
//! transaction record to append, signed balance lines, an optional bonus
//! operation, and an optional ticket sale. A backend applies the whole
//! commit or none of it; no intermediate state is observable to concurrent
//! operations. Balance checks happen inside the commit's critical section,
//! so a pre-check in the engine can only produce an earlier, friendlier
//! failure, never a stale approval.
//!
//! ### Exact decimal money
//! All monetary values are `rust_decimal::Decimal`. Floating point is never
//! used for balances, amounts, or bonus math.
//!
//! ### Time source dependency
//! Functions that stamp rows take the timestamp from the engine, which owns
//! a `TimeSource`; backends never read the wall clock themselves.

use jiff::Timestamp;
use jiff_sqlx::Timestamp as SqlxTs;
use rust_decimal::Decimal;
use sqlx::FromRow;
use thiserror::Error;

use payloads::{
    AccountId, AccountKind, BonusOperationId, BonusOperationKind, CategoryId,
    TicketId, TransactionId, TransactionKind, UserId, UserKind,
};

pub mod memory;
pub mod postgres;

/// An account row. Balance only ever changes through a [`LedgerCommit`];
/// creation sets it to zero.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: UserId,
    pub kind: AccountKind,
    pub balance: Decimal,
    pub is_active: bool,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
}

/// The slice of a user profile the ledger engine reads: phone mapping,
/// business/individual classification, and the bonus wallet balance.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserProfile {
    pub id: UserId,
    pub phone_number: String,
    pub kind: UserKind,
    pub declared_category: Option<String>,
    pub bonus_balance: Decimal,
}

/// One row of the append-only transaction log. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub source_account: Option<AccountId>,
    pub destination_account: Option<AccountId>,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub category: CategoryId,
    pub recipient_phone: Option<String>,
    pub bonus_used: bool,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
}

/// One row of the append-only bonus operation log.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct BonusOperation {
    pub id: BonusOperationId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub kind: BonusOperationKind,
    pub description: String,
    #[sqlx(try_from = "SqlxTs")]
    pub created_at: Timestamp,
}

/// A bonus operation to be appended as part of a commit. The id is assigned
/// by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBonusOperation {
    pub user_id: UserId,
    pub amount: Decimal,
    pub kind: BonusOperationKind,
    pub description: String,
}

/// Catalog ticket. The ledger only reads it and flips `is_sold`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Ticket {
    pub id: TicketId,
    pub flight_number: String,
    pub price: Decimal,
    pub is_sold: bool,
    pub sold_to: Option<UserId>,
}

/// Marks a ticket sold to a buyer as part of a commit. Fails the whole
/// commit with [`StoreError::ItemUnavailable`] if the ticket was sold in
/// the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketSale {
    pub ticket: TicketId,
    pub buyer: UserId,
}

/// The atomic unit of every money movement.
///
/// `lines` are signed balance deltas, one per account: negative debits,
/// positive credits (the journal-line shape). A backend must apply the
/// transaction append, every line, the bonus operation, and the ticket sale
/// together or not at all, with the touched accounts locked in ascending id
/// order for the duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCommit {
    pub transaction: TransactionRecord,
    pub lines: Vec<(AccountId, Decimal)>,
    pub bonus: Option<NewBonusOperation>,
    pub ticket_sale: Option<TicketSale>,
}

impl From<Account> for payloads::responses::AccountSummary {
    fn from(account: Account) -> Self {
        Self {
            account_id: account.id,
            kind: account.kind,
            balance: account.balance,
            is_active: account.is_active,
            created_at: account.created_at,
        }
    }
}

impl From<TransactionRecord> for payloads::responses::TransactionView {
    fn from(record: TransactionRecord) -> Self {
        Self {
            transaction_id: record.id,
            source: record.source_account,
            destination: record.destination_account,
            amount: record.amount,
            kind: record.kind,
            category: record.category,
            recipient_phone: record.recipient_phone,
            bonus_used: record.bonus_used,
            created_at: record.created_at,
        }
    }
}

impl From<BonusOperation> for payloads::responses::BonusOperationView {
    fn from(op: BonusOperation) -> Self {
        Self {
            operation_id: op.id,
            amount: op.amount,
            kind: op.kind,
            description: op.description,
            created_at: op.created_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Caller does not own this resource")]
    Forbidden,
    #[error("Insufficient funds")]
    InsufficientFunds,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account cannot be used for this operation")]
    InvalidAccount,
    #[error("No user matches this phone number")]
    RecipientNotFound,
    #[error("Recipient has no active primary account")]
    NoActiveAccount,
    #[error("Ticket is sold or does not exist")]
    ItemUnavailable,
    #[error("Account is already closed")]
    AlreadyClosed,
    #[error("Amount must be positive")]
    AmountMustBePositive,
    #[error("User not found")]
    UserNotFound,
    #[error("Ledger commit could not be applied; no changes were made")]
    TransactionFailed,
    #[error("Database error")]
    Database(#[source] sqlx::Error),
    #[error("Unexpected error")]
    UnexpectedError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // Bounded lock waits surface as a failed (fully rolled back)
        // transaction rather than a generic database error, so the request
        // layer can distinguish retryable contention. 55P03 is
        // lock_not_available, 40P01 is deadlock_detected.
        if let sqlx::Error::Database(db_err) = &e
            && matches!(db_err.code().as_deref(), Some("55P03") | Some("40P01"))
        {
            return StoreError::TransactionFailed;
        }
        StoreError::Database(e)
    }
}

/// Storage seam for the ledger engine.
///
/// Two implementations: [`postgres::PgStore`] for production and
/// [`memory::MemStore`] for tests/dev. Reads may run outside any critical
/// section; all writes that move money go through [`LedgerStore::commit`].
#[allow(async_fn_in_trait)]
pub trait LedgerStore {
    async fn account(&self, id: &AccountId) -> Result<Account, StoreError>;

    async fn accounts_of(
        &self,
        owner: &UserId,
    ) -> Result<Vec<Account>, StoreError>;

    /// The recipient account for phone-directed transfers: the user's
    /// oldest active primary account (earliest opening date, account id as
    /// tie-break).
    async fn primary_account(
        &self,
        owner: &UserId,
    ) -> Result<Option<Account>, StoreError>;

    async fn user_profile(
        &self,
        id: &UserId,
    ) -> Result<UserProfile, StoreError>;

    async fn user_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<UserProfile>, StoreError>;

    async fn ticket(&self, id: &TicketId)
    -> Result<Option<Ticket>, StoreError>;

    async fn bonus_balance(&self, user: &UserId)
    -> Result<Decimal, StoreError>;

    /// Full append-only bonus log for a user, oldest first.
    async fn bonus_operations(
        &self,
        user: &UserId,
    ) -> Result<Vec<BonusOperation>, StoreError>;

    /// Transactions touching an account, newest first.
    async fn transactions_for_account(
        &self,
        account: &AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Create an active account with zero balance.
    async fn open_account(
        &self,
        owner: &UserId,
        kind: AccountKind,
        now: Timestamp,
    ) -> Result<Account, StoreError>;

    /// Atomic `active -> closed` transition. Fails with
    /// [`StoreError::AlreadyClosed`] when the account is not active, and
    /// [`StoreError::AccountNotFound`] when it does not exist. Terminal:
    /// there is no reopen.
    async fn close_account(&self, id: &AccountId) -> Result<(), StoreError>;

    /// Apply one atomic ledger commit; see [`LedgerCommit`] for the
    /// contract. Returns without observable effect on any error.
    async fn commit(&self, commit: LedgerCommit) -> Result<(), StoreError>;
}
