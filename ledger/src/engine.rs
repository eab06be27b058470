//! The ledger engine: the one place that moves money.
//!
//! Each operation validates against current state, plans a single
//! [`LedgerCommit`], and hands it to the store. The store re-checks funds
//! and availability inside its critical section, so the engine's own checks
//! exist to fail early with a precise error, not to guarantee correctness
//! under concurrency.

use payloads::{
    AccountId, BonusOperationKind, CategoryId, Principal, TransactionId,
    TransactionKind, UserKind, requests, responses,
};
use rust_decimal::{Decimal, dec};

use crate::category::CategoryResolver;
use crate::store::{
    Account, LedgerCommit, LedgerStore, NewBonusOperation, StoreError,
    TicketSale, TransactionRecord, UserProfile,
};
use crate::time::TimeSource;

/// Monetary values are kept to two decimal places.
const MONEY_SCALE: u32 = 2;

/// Bonus accrued by the sender of an internal transfer: 0.5% of the amount.
const INTERNAL_TRANSFER_BONUS_RATE: Decimal = dec!(0.005);

/// Commission rate whose half is accrued as bonus on phone-directed
/// transfers.
const PHONE_TRANSFER_COMMISSION_RATE: Decimal = dec!(0.01);

/// At most this share of a ticket's price can be covered from the bonus
/// wallet.
const PURCHASE_BONUS_SHARE: Decimal = dec!(0.5);

/// Bonus accrued by the sender of an internal transfer, rounded to money
/// scale.
fn internal_transfer_accrual(amount: Decimal) -> Decimal {
    (amount * INTERNAL_TRANSFER_BONUS_RATE).round_dp(MONEY_SCALE)
}

/// Bonus accrued by the sender of a phone-directed transfer: half of the
/// 1% commission, rounded to money scale. Distinct from the internal
/// transfer policy even though the resulting rate coincides.
fn phone_transfer_accrual(amount: Decimal) -> Decimal {
    (amount * PHONE_TRANSFER_COMMISSION_RATE / dec!(2)).round_dp(MONEY_SCALE)
}

/// Split a ticket price into (cash, bonus) portions. The bonus portion is
/// capped at half the price and at the wallet balance; the cash portion
/// covers the rest exactly.
fn purchase_split(
    price: Decimal,
    wallet: Decimal,
    use_bonus: bool,
) -> (Decimal, Decimal) {
    let bonus = if use_bonus {
        (price * PURCHASE_BONUS_SHARE)
            .round_dp(MONEY_SCALE)
            .min(wallet)
            .max(Decimal::ZERO)
    } else {
        Decimal::ZERO
    };
    (price - bonus, bonus)
}

pub struct LedgerEngine<S> {
    store: S,
    categories: CategoryResolver,
    time_source: TimeSource,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(
        store: S,
        categories: CategoryResolver,
        time_source: TimeSource,
    ) -> Self {
        Self {
            store,
            categories,
            time_source,
        }
    }

    /// Direct store access, for request-layer reads and test seeding.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve and authorize the debited account for a transfer. Checks run
    /// in a fixed order so each failure mode maps to one error.
    async fn debit_account(
        &self,
        principal: &Principal,
        id: &AccountId,
        amount: Decimal,
    ) -> Result<Account, StoreError> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::AmountMustBePositive);
        }
        let account = self.store.account(id).await?;
        if account.owner_id != principal.user_id {
            return Err(StoreError::Forbidden);
        }
        if !account.is_active {
            return Err(StoreError::InvalidAccount);
        }
        if account.balance < amount {
            return Err(StoreError::InsufficientFunds);
        }
        Ok(account)
    }

    /// Category for funds arriving at a recipient: businesses resolve their
    /// declared classification, individuals always take the protocol
    /// fallback.
    fn recipient_category(
        &self,
        recipient: &UserProfile,
        fallback: CategoryId,
    ) -> CategoryId {
        match recipient.kind {
            UserKind::Business => self
                .categories
                .resolve(recipient.declared_category.as_deref(), fallback),
            UserKind::Individual => fallback,
        }
    }

    #[tracing::instrument(skip(self, principal), fields(caller = %principal.user_id))]
    pub async fn internal_transfer(
        &self,
        principal: &Principal,
        request: &requests::InternalTransfer,
    ) -> Result<responses::TransferReceipt, StoreError> {
        let amount = request.amount;
        self.debit_account(principal, &request.source, amount).await?;
        if request.source == request.destination {
            return Err(StoreError::InvalidAccount);
        }
        let destination = self.store.account(&request.destination).await?;
        if !destination.is_active {
            return Err(StoreError::InvalidAccount);
        }
        let recipient = self.store.user_profile(&destination.owner_id).await?;
        let category =
            self.recipient_category(&recipient, CategoryId::TRANSFERS);

        let transaction_id = TransactionId::generate();
        let accrual = internal_transfer_accrual(amount);
        let bonus = (accrual > Decimal::ZERO).then(|| NewBonusOperation {
            user_id: principal.user_id,
            amount: accrual,
            kind: BonusOperationKind::Accrual,
            description: format!("Transfer cashback for {transaction_id}"),
        });

        self.store
            .commit(LedgerCommit {
                transaction: TransactionRecord {
                    id: transaction_id,
                    source_account: Some(request.source),
                    destination_account: Some(request.destination),
                    amount,
                    kind: TransactionKind::InternalTransfer,
                    category,
                    recipient_phone: None,
                    bonus_used: false,
                    created_at: self.time_source.now(),
                },
                lines: vec![
                    (request.source, -amount),
                    (request.destination, amount),
                ],
                bonus,
                ticket_sale: None,
            })
            .await?;

        tracing::info!(
            "Committed internal transfer {transaction_id} of {amount}"
        );
        Ok(responses::TransferReceipt { transaction_id })
    }

    #[tracing::instrument(skip(self, principal), fields(caller = %principal.user_id))]
    pub async fn phone_transfer(
        &self,
        principal: &Principal,
        request: &requests::PhoneTransfer,
    ) -> Result<responses::TransferReceipt, StoreError> {
        let amount = request.amount;
        self.debit_account(principal, &request.source, amount).await?;
        // A malformed phone number cannot match anyone.
        if request.recipient_phone.is_empty()
            || request.recipient_phone.len()
                > requests::PHONE_NUMBER_MAX_LEN
        {
            return Err(StoreError::RecipientNotFound);
        }
        let recipient = self
            .store
            .user_by_phone(&request.recipient_phone)
            .await?
            .ok_or(StoreError::RecipientNotFound)?;
        let destination = self
            .store
            .primary_account(&recipient.id)
            .await?
            .ok_or(StoreError::NoActiveAccount)?;
        if destination.id == request.source {
            return Err(StoreError::InvalidAccount);
        }

        let (kind, category) = match recipient.kind {
            UserKind::Business => (
                TransactionKind::P2b,
                self.recipient_category(&recipient, CategoryId::OTHER),
            ),
            UserKind::Individual => {
                (TransactionKind::P2p, CategoryId::OTHER)
            }
        };

        let transaction_id = TransactionId::generate();
        let accrual = phone_transfer_accrual(amount);
        let bonus = (accrual > Decimal::ZERO).then(|| NewBonusOperation {
            user_id: principal.user_id,
            amount: accrual,
            kind: BonusOperationKind::Accrual,
            description: format!("Transfer cashback for {transaction_id}"),
        });

        self.store
            .commit(LedgerCommit {
                transaction: TransactionRecord {
                    id: transaction_id,
                    source_account: Some(request.source),
                    destination_account: Some(destination.id),
                    amount,
                    kind,
                    category,
                    recipient_phone: Some(request.recipient_phone.clone()),
                    bonus_used: false,
                    created_at: self.time_source.now(),
                },
                lines: vec![
                    (request.source, -amount),
                    (destination.id, amount),
                ],
                bonus,
                ticket_sale: None,
            })
            .await?;

        tracing::info!(
            "Committed phone transfer {transaction_id} of {amount}"
        );
        Ok(responses::TransferReceipt { transaction_id })
    }

    #[tracing::instrument(skip(self, principal), fields(caller = %principal.user_id))]
    pub async fn deposit(
        &self,
        principal: &Principal,
        request: &requests::Deposit,
    ) -> Result<responses::DepositReceipt, StoreError> {
        let amount = request.amount;
        if amount <= Decimal::ZERO {
            return Err(StoreError::AmountMustBePositive);
        }
        // An account the caller cannot deposit into is indistinguishable
        // from a missing one.
        let destination = self
            .store
            .account(&request.destination)
            .await
            .map_err(|e| match e {
                StoreError::AccountNotFound => StoreError::InvalidAccount,
                e => e,
            })?;
        if destination.owner_id != principal.user_id || !destination.is_active
        {
            return Err(StoreError::InvalidAccount);
        }

        let transaction_id = TransactionId::generate();
        self.store
            .commit(LedgerCommit {
                transaction: TransactionRecord {
                    id: transaction_id,
                    source_account: None,
                    destination_account: Some(request.destination),
                    amount,
                    kind: TransactionKind::Deposit,
                    category: CategoryId::TRANSFERS,
                    recipient_phone: None,
                    bonus_used: false,
                    created_at: self.time_source.now(),
                },
                lines: vec![(request.destination, amount)],
                bonus: None,
                ticket_sale: None,
            })
            .await?;

        tracing::info!("Committed deposit {transaction_id} of {amount}");
        Ok(responses::DepositReceipt { transaction_id })
    }

    #[tracing::instrument(skip(self, principal), fields(caller = %principal.user_id))]
    pub async fn purchase_ticket(
        &self,
        principal: &Principal,
        request: &requests::PurchaseTicket,
    ) -> Result<responses::PurchaseReceipt, StoreError> {
        let ticket = self
            .store
            .ticket(&request.ticket)
            .await?
            .ok_or(StoreError::ItemUnavailable)?;
        if ticket.is_sold {
            return Err(StoreError::ItemUnavailable);
        }
        let account = self.store.account(&request.account).await?;
        if account.owner_id != principal.user_id {
            return Err(StoreError::Forbidden);
        }
        if !account.is_active {
            return Err(StoreError::InvalidAccount);
        }

        let wallet = if request.use_bonus {
            self.store.bonus_balance(&principal.user_id).await?
        } else {
            Decimal::ZERO
        };
        let (cash_portion, bonus_portion) =
            purchase_split(ticket.price, wallet, request.use_bonus);
        if account.balance < cash_portion {
            return Err(StoreError::InsufficientFunds);
        }

        let transaction_id = TransactionId::generate();
        let bonus = (bonus_portion > Decimal::ZERO).then(|| {
            NewBonusOperation {
                user_id: principal.user_id,
                amount: bonus_portion,
                kind: BonusOperationKind::Withdrawal,
                description: format!(
                    "Bonus payment for ticket {}",
                    ticket.id
                ),
            }
        });
        let mut lines = Vec::new();
        if cash_portion > Decimal::ZERO {
            lines.push((request.account, -cash_portion));
        }

        self.store
            .commit(LedgerCommit {
                transaction: TransactionRecord {
                    id: transaction_id,
                    source_account: Some(request.account),
                    destination_account: None,
                    // The record carries the full price; the split is on
                    // the receipt and in the bonus log.
                    amount: ticket.price,
                    kind: TransactionKind::Purchase,
                    category: CategoryId::OTHER,
                    recipient_phone: None,
                    bonus_used: bonus_portion > Decimal::ZERO,
                    created_at: self.time_source.now(),
                },
                lines,
                bonus,
                ticket_sale: Some(TicketSale {
                    ticket: ticket.id,
                    buyer: principal.user_id,
                }),
            })
            .await?;

        tracing::info!(
            "Committed purchase {transaction_id}: cash {cash_portion}, \
             bonus {bonus_portion}"
        );
        Ok(responses::PurchaseReceipt {
            transaction_id,
            cash_portion,
            bonus_portion,
        })
    }

    #[tracing::instrument(skip(self, principal), fields(caller = %principal.user_id))]
    pub async fn open_account(
        &self,
        principal: &Principal,
        request: &requests::OpenAccount,
    ) -> Result<responses::AccountSummary, StoreError> {
        let account = self
            .store
            .open_account(
                &principal.user_id,
                request.kind,
                self.time_source.now(),
            )
            .await?;
        tracing::info!("Opened {} account {}", account.kind, account.id);
        Ok(account.into())
    }

    #[tracing::instrument(skip(self, principal), fields(caller = %principal.user_id))]
    pub async fn close_account(
        &self,
        principal: &Principal,
        request: &requests::CloseAccount,
    ) -> Result<(), StoreError> {
        let account = self.store.account(&request.account).await?;
        if account.owner_id != principal.user_id {
            return Err(StoreError::Forbidden);
        }
        self.store.close_account(&request.account).await?;
        tracing::info!("Closed account {}", request.account);
        Ok(())
    }

    pub async fn accounts(
        &self,
        principal: &Principal,
    ) -> Result<Vec<responses::AccountSummary>, StoreError> {
        let accounts = self.store.accounts_of(&principal.user_id).await?;
        Ok(accounts.into_iter().map(Into::into).collect())
    }

    /// Transaction log for one account, newest first. Owners see their own
    /// accounts; admins see any.
    pub async fn account_transactions(
        &self,
        principal: &Principal,
        request: &requests::ListTransactions,
    ) -> Result<Vec<responses::TransactionView>, StoreError> {
        let account = self.store.account(&request.account).await?;
        if account.owner_id != principal.user_id && !principal.role.is_admin()
        {
            return Err(StoreError::Forbidden);
        }
        let records = self
            .store
            .transactions_for_account(
                &request.account,
                request.limit,
                request.offset,
            )
            .await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    pub async fn bonus_wallet(
        &self,
        principal: &Principal,
    ) -> Result<responses::BonusWallet, StoreError> {
        let balance = self.store.bonus_balance(&principal.user_id).await?;
        let operations = self
            .store
            .bonus_operations(&principal.user_id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(responses::BonusWallet {
            balance,
            operations,
        })
    }
}
