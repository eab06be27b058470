//! Postgres-backed ledger store.
//!
//! The production [`LedgerStore`] implementation. Commits run inside one
//! sqlx transaction: touched account rows are locked with
//! `SELECT ... FOR UPDATE` in ascending id order, balances are re-checked
//! under the lock, and every early `?` return drops the transaction so
//! Postgres rolls the whole unit back. Lock waits are bounded with
//! `lock_timeout`; a timeout (or detected deadlock) surfaces as
//! [`StoreError::TransactionFailed`] via the error conversion in the parent
//! module.

use jiff::Timestamp;
use jiff_sqlx::ToSqlx;
use rust_decimal::Decimal;
use sqlx::PgPool;

use payloads::{
    AccountId, AccountKind, BonusOperationKind, TicketId, UserId,
};

use super::{
    Account, BonusOperation, LedgerCommit, LedgerStore, StoreError, Ticket,
    TransactionRecord, UserProfile,
};

/// Upper bound on waiting for row locks inside a commit.
const LOCK_TIMEOUT: &str = "5s";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the connection pool and run migrations. Call once at process
    /// start; the handle is then passed into the engine.
    pub async fn connect(config: &crate::Config) -> Result<Self, StoreError> {
        let pool = PgPool::connect(&config.database_url).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl LedgerStore for PgStore {
    async fn account(&self, id: &AccountId) -> Result<Account, StoreError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::AccountNotFound)
    }

    async fn accounts_of(
        &self,
        owner: &UserId,
    ) -> Result<Vec<Account>, StoreError> {
        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn primary_account(
        &self,
        owner: &UserId,
    ) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            SELECT * FROM accounts
            WHERE owner_id = $1
              AND is_active = true
              AND kind IN ('checking', 'business_primary')
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn user_profile(
        &self,
        id: &UserId,
    ) -> Result<UserProfile, StoreError> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, phone_number, kind, declared_category, bonus_balance
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::UserNotFound)
    }

    async fn user_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<UserProfile>, StoreError> {
        let profile = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, phone_number, kind, declared_category, bonus_balance
            FROM users
            WHERE phone_number = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn ticket(
        &self,
        id: &TicketId,
    ) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT id, flight_number, price, is_sold, sold_to
            FROM tickets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn bonus_balance(
        &self,
        user: &UserId,
    ) -> Result<Decimal, StoreError> {
        sqlx::query_scalar("SELECT bonus_balance FROM users WHERE id = $1")
            .bind(user)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::UserNotFound)
    }

    async fn bonus_operations(
        &self,
        user: &UserId,
    ) -> Result<Vec<BonusOperation>, StoreError> {
        let operations = sqlx::query_as::<_, BonusOperation>(
            r#"
            SELECT * FROM bonus_operations
            WHERE user_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(operations)
    }

    async fn transactions_for_account(
        &self,
        account: &AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let records = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT * FROM transactions
            WHERE source_account = $1 OR destination_account = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn open_account(
        &self,
        owner: &UserId,
        kind: AccountKind,
        now: Timestamp,
    ) -> Result<Account, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (owner_id, kind, balance, is_active, created_at)
            VALUES ($1, $2, 0, true, $3)
            RETURNING *
            "#,
        )
        .bind(owner)
        .bind(kind)
        .bind(now.to_sqlx())
        .fetch_one(&self.pool)
        .await?;
        Ok(account)
    }

    async fn close_account(&self, id: &AccountId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let is_active: bool = sqlx::query_scalar(
            "SELECT is_active FROM accounts WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::AccountNotFound)?;

        if !is_active {
            return Err(StoreError::AlreadyClosed);
        }

        sqlx::query("UPDATE accounts SET is_active = false WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit(&self, commit: LedgerCommit) -> Result<(), StoreError> {
        let LedgerCommit {
            transaction,
            lines,
            bonus,
            ticket_sale,
        } = commit;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("SET LOCAL lock_timeout = '{LOCK_TIMEOUT}'"))
            .execute(&mut *tx)
            .await?;

        // Lock touched accounts in ascending id order so two commits over
        // an overlapping account set cannot deadlock.
        let mut touched: Vec<AccountId> =
            lines.iter().map(|(account_id, _)| *account_id).collect();
        touched.sort();
        touched.dedup();

        for account_id in &touched {
            let is_active: bool = sqlx::query_scalar(
                "SELECT is_active FROM accounts WHERE id = $1 FOR UPDATE",
            )
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::AccountNotFound)?;

            if !is_active {
                return Err(StoreError::InvalidAccount);
            }
        }

        // Re-check debits under the lock, before making changes. The
        // engine's pre-check may have read a stale balance.
        for (account_id, delta) in &lines {
            if *delta >= Decimal::ZERO {
                continue;
            }
            let balance: Decimal = sqlx::query_scalar(
                "SELECT balance FROM accounts WHERE id = $1",
            )
            .bind(account_id)
            .fetch_one(&mut *tx)
            .await?;

            if balance + *delta < Decimal::ZERO {
                return Err(StoreError::InsufficientFunds);
            }
        }

        // Append the transaction record.
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id,
                source_account,
                destination_account,
                amount,
                kind,
                category,
                recipient_phone,
                bonus_used,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.source_account)
        .bind(transaction.destination_account)
        .bind(transaction.amount)
        .bind(transaction.kind)
        .bind(transaction.category)
        .bind(&transaction.recipient_phone)
        .bind(transaction.bonus_used)
        .bind(transaction.created_at.to_sqlx())
        .execute(&mut *tx)
        .await?;

        // Apply balance lines.
        for (account_id, delta) in &lines {
            sqlx::query(
                "UPDATE accounts SET balance = balance + $1 WHERE id = $2",
            )
            .bind(delta)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        }

        // Bonus wallet mutation plus its append-only log entry.
        if let Some(op) = bonus {
            if op.kind == BonusOperationKind::Withdrawal {
                let bonus_balance: Decimal = sqlx::query_scalar(
                    "SELECT bonus_balance FROM users WHERE id = $1 FOR UPDATE",
                )
                .bind(op.user_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::UserNotFound)?;

                if bonus_balance < op.amount {
                    return Err(StoreError::InsufficientFunds);
                }
            }

            let signed = match op.kind {
                BonusOperationKind::Accrual => op.amount,
                BonusOperationKind::Withdrawal => -op.amount,
            };
            let updated = sqlx::query(
                "UPDATE users SET bonus_balance = bonus_balance + $1
                 WHERE id = $2",
            )
            .bind(signed)
            .bind(op.user_id)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                return Err(StoreError::UserNotFound);
            }

            sqlx::query(
                r#"
                INSERT INTO bonus_operations (
                    user_id, amount, kind, description, created_at
                )
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(op.user_id)
            .bind(op.amount)
            .bind(op.kind)
            .bind(&op.description)
            .bind(transaction.created_at.to_sqlx())
            .execute(&mut *tx)
            .await?;
        }

        // Mark the catalog item sold. The is_sold guard makes a concurrent
        // double-sell lose here and roll back its payment.
        if let Some(sale) = ticket_sale {
            let result = sqlx::query(
                r#"
                UPDATE tickets
                SET is_sold = true, sold_to = $2
                WHERE id = $1 AND is_sold = false
                "#,
            )
            .bind(sale.ticket)
            .bind(sale.buyer)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::ItemUnavailable);
            }
        }

        // Every early return above drops `tx`, rolling back the unit.
        tx.commit().await?;
        Ok(())
    }
}
