//! In-memory ledger store.
//!
//! Intended for tests and local development. A single `RwLock` over the
//! whole state serializes commits, which makes atomicity trivial: a commit
//! validates everything first and only then mutates, so an error leaves the
//! state untouched. Row-level concurrency is the Postgres store's job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use jiff::Timestamp;
use rust_decimal::Decimal;
use uuid::Uuid;

use payloads::{
    AccountId, AccountKind, BonusOperationId, BonusOperationKind, TicketId,
    UserId,
};

use super::{
    Account, BonusOperation, LedgerCommit, LedgerStore, StoreError, Ticket,
    TransactionRecord, UserProfile,
};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, UserProfile>,
    accounts: HashMap<AccountId, Account>,
    transactions: Vec<TransactionRecord>,
    bonus_operations: Vec<BonusOperation>,
    tickets: HashMap<TicketId, Ticket>,
}

#[derive(Debug, Default)]
pub struct MemStore {
    state: RwLock<State>,
    fail_next_commit: AtomicBool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| anyhow!("state lock poisoned").into())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| anyhow!("state lock poisoned").into())
    }

    /// Insert a user profile. The ledger treats users as collaborator data;
    /// tests seed them directly.
    pub fn seed_user(&self, profile: UserProfile) {
        if let Ok(mut state) = self.state.write() {
            state.users.insert(profile.id, profile);
        }
    }

    /// Insert an account row as-is, including a nonzero starting balance.
    pub fn seed_account(&self, account: Account) {
        if let Ok(mut state) = self.state.write() {
            state.accounts.insert(account.id, account);
        }
    }

    pub fn seed_ticket(&self, ticket: Ticket) {
        if let Ok(mut state) = self.state.write() {
            state.tickets.insert(ticket.id, ticket);
        }
    }

    /// Make the next commit fail after its validations pass, without
    /// applying anything. Drives tests that assert a failed commit has no
    /// observable effect.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

impl LedgerStore for MemStore {
    async fn account(&self, id: &AccountId) -> Result<Account, StoreError> {
        self.read()?
            .accounts
            .get(id)
            .cloned()
            .ok_or(StoreError::AccountNotFound)
    }

    async fn accounts_of(
        &self,
        owner: &UserId,
    ) -> Result<Vec<Account>, StoreError> {
        let state = self.read()?;
        let mut accounts: Vec<Account> = state
            .accounts
            .values()
            .filter(|a| a.owner_id == *owner)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| (a.created_at, a.id));
        Ok(accounts)
    }

    async fn primary_account(
        &self,
        owner: &UserId,
    ) -> Result<Option<Account>, StoreError> {
        let state = self.read()?;
        let account = state
            .accounts
            .values()
            .filter(|a| {
                a.owner_id == *owner && a.is_active && a.kind.is_primary()
            })
            .min_by_key(|a| (a.created_at, a.id))
            .cloned();
        Ok(account)
    }

    async fn user_profile(
        &self,
        id: &UserId,
    ) -> Result<UserProfile, StoreError> {
        self.read()?
            .users
            .get(id)
            .cloned()
            .ok_or(StoreError::UserNotFound)
    }

    async fn user_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        let state = self.read()?;
        Ok(state
            .users
            .values()
            .find(|u| u.phone_number == phone)
            .cloned())
    }

    async fn ticket(
        &self,
        id: &TicketId,
    ) -> Result<Option<Ticket>, StoreError> {
        Ok(self.read()?.tickets.get(id).cloned())
    }

    async fn bonus_balance(
        &self,
        user: &UserId,
    ) -> Result<Decimal, StoreError> {
        self.read()?
            .users
            .get(user)
            .map(|u| u.bonus_balance)
            .ok_or(StoreError::UserNotFound)
    }

    async fn bonus_operations(
        &self,
        user: &UserId,
    ) -> Result<Vec<BonusOperation>, StoreError> {
        let state = self.read()?;
        // Appended in commit order, which is chronological here.
        Ok(state
            .bonus_operations
            .iter()
            .filter(|op| op.user_id == *user)
            .cloned()
            .collect())
    }

    async fn transactions_for_account(
        &self,
        account: &AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let state = self.read()?;
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|t| {
                t.source_account == Some(*account)
                    || t.destination_account == Some(*account)
            })
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn open_account(
        &self,
        owner: &UserId,
        kind: AccountKind,
        now: Timestamp,
    ) -> Result<Account, StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(owner) {
            return Err(StoreError::UserNotFound);
        }
        let account = Account {
            id: AccountId(Uuid::new_v4()),
            owner_id: *owner,
            kind,
            balance: Decimal::ZERO,
            is_active: true,
            created_at: now,
        };
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn close_account(&self, id: &AccountId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let account = state
            .accounts
            .get_mut(id)
            .ok_or(StoreError::AccountNotFound)?;
        if !account.is_active {
            return Err(StoreError::AlreadyClosed);
        }
        account.is_active = false;
        Ok(())
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<(), StoreError> {
        let LedgerCommit {
            transaction,
            lines,
            bonus,
            ticket_sale,
        } = commit;

        let mut state = self.write()?;

        // Validate everything up front; nothing below this block is allowed
        // to fail, so an error can never leave a partial commit behind.
        let mut new_balances: HashMap<AccountId, Decimal> = HashMap::new();
        for (account_id, delta) in &lines {
            let account = state
                .accounts
                .get(account_id)
                .ok_or(StoreError::AccountNotFound)?;
            if !account.is_active {
                return Err(StoreError::InvalidAccount);
            }
            let next = new_balances
                .get(account_id)
                .copied()
                .unwrap_or(account.balance)
                + *delta;
            if next < Decimal::ZERO {
                return Err(StoreError::InsufficientFunds);
            }
            new_balances.insert(*account_id, next);
        }

        let new_bonus_balance = match &bonus {
            Some(op) => {
                let user = state
                    .users
                    .get(&op.user_id)
                    .ok_or(StoreError::UserNotFound)?;
                let next = match op.kind {
                    BonusOperationKind::Accrual => {
                        user.bonus_balance + op.amount
                    }
                    BonusOperationKind::Withdrawal => {
                        if user.bonus_balance < op.amount {
                            return Err(StoreError::InsufficientFunds);
                        }
                        user.bonus_balance - op.amount
                    }
                };
                Some((op.user_id, next))
            }
            None => None,
        };

        if let Some(sale) = &ticket_sale {
            let ticket = state
                .tickets
                .get(&sale.ticket)
                .ok_or(StoreError::ItemUnavailable)?;
            if ticket.is_sold {
                return Err(StoreError::ItemUnavailable);
            }
        }

        // Induced-failure hook: everything validated, nothing applied.
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::TransactionFailed);
        }

        // Apply.
        for (account_id, balance) in new_balances {
            if let Some(account) = state.accounts.get_mut(&account_id) {
                account.balance = balance;
            }
        }
        if let Some((user_id, balance)) = new_bonus_balance {
            if let Some(user) = state.users.get_mut(&user_id) {
                user.bonus_balance = balance;
            }
        }
        if let Some(op) = bonus {
            state.bonus_operations.push(BonusOperation {
                id: BonusOperationId(Uuid::new_v4()),
                user_id: op.user_id,
                amount: op.amount,
                kind: op.kind,
                description: op.description,
                created_at: transaction.created_at,
            });
        }
        if let Some(sale) = ticket_sale {
            if let Some(ticket) = state.tickets.get_mut(&sale.ticket) {
                ticket.is_sold = true;
                ticket.sold_to = Some(sale.buyer);
            }
        }
        state.transactions.push(transaction);
        Ok(())
    }
}
