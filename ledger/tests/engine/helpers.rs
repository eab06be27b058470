use jiff::Timestamp;
use ledger::category::CategoryResolver;
use ledger::engine::LedgerEngine;
use ledger::store::memory::MemStore;
use ledger::store::{Account, Ticket, UserProfile};
use ledger::time::TimeSource;
use payloads::{
    AccountId, AccountKind, CategoryId, Principal, TicketId, UserId, UserKind,
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Category configured for recipients declaring the "airline"
/// classification.
pub const AIRLINE_CATEGORY: CategoryId = CategoryId(3);

pub struct TestApp {
    pub engine: LedgerEngine<MemStore>,
    pub time_source: TimeSource,
}

// Set TEST_LOG to see engine spans and events while running tests.
static TRACING: std::sync::Once = std::sync::Once::new();

pub fn spawn_engine() -> TestApp {
    TRACING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            let subscriber =
                ledger::telemetry::get_subscriber("debug".into());
            ledger::telemetry::init_subscriber(subscriber);
        }
    });

    let time_source = TimeSource::new(
        "2026-01-15T12:00:00Z".parse().expect("valid timestamp"),
    );
    let categories =
        CategoryResolver::new([("airline".to_string(), AIRLINE_CATEGORY)]);
    TestApp {
        engine: LedgerEngine::new(
            MemStore::new(),
            categories,
            time_source.clone(),
        ),
        time_source,
    }
}

impl TestApp {
    pub fn seed_individual(&self, phone: &str) -> Principal {
        self.seed_user(phone, UserKind::Individual, None, Decimal::ZERO)
    }

    pub fn seed_business(
        &self,
        phone: &str,
        declared_category: Option<&str>,
    ) -> Principal {
        self.seed_user(
            phone,
            UserKind::Business,
            declared_category,
            Decimal::ZERO,
        )
    }

    pub fn seed_user(
        &self,
        phone: &str,
        kind: UserKind,
        declared_category: Option<&str>,
        bonus_balance: Decimal,
    ) -> Principal {
        let user_id = UserId(Uuid::new_v4());
        self.engine.store().seed_user(UserProfile {
            id: user_id,
            phone_number: phone.to_string(),
            kind,
            declared_category: declared_category.map(str::to_string),
            bonus_balance,
        });
        Principal::customer(user_id)
    }

    /// Seed an active checking account with a starting balance.
    pub fn seed_account(
        &self,
        owner: &Principal,
        balance: Decimal,
    ) -> AccountId {
        self.seed_account_with(
            owner,
            AccountKind::Checking,
            balance,
            self.time_source.now(),
        )
    }

    pub fn seed_account_with(
        &self,
        owner: &Principal,
        kind: AccountKind,
        balance: Decimal,
        created_at: Timestamp,
    ) -> AccountId {
        let id = AccountId(Uuid::new_v4());
        self.engine.store().seed_account(Account {
            id,
            owner_id: owner.user_id,
            kind,
            balance,
            is_active: true,
            created_at,
        });
        id
    }

    pub fn seed_ticket(&self, price: Decimal) -> TicketId {
        let id = TicketId(Uuid::new_v4());
        self.engine.store().seed_ticket(Ticket {
            id,
            flight_number: "SU-1042".to_string(),
            price,
            is_sold: false,
            sold_to: None,
        });
        id
    }

    pub async fn balance(&self, account: &AccountId) -> Decimal {
        self.engine
            .store()
            .account(account)
            .await
            .expect("account exists")
            .balance
    }

    /// Assert that a wallet's balance equals the net of its append-only
    /// operation log.
    pub async fn assert_bonus_log_consistent(&self, principal: &Principal) {
        let wallet = self
            .engine
            .bonus_wallet(principal)
            .await
            .expect("wallet readable");
        let net: Decimal = wallet
            .operations
            .iter()
            .map(|op| match op.kind {
                payloads::BonusOperationKind::Accrual => op.amount,
                payloads::BonusOperationKind::Withdrawal => -op.amount,
            })
            .sum();
        assert_eq!(wallet.balance, net);
    }
}

// MemStore implements the store trait, whose methods tests call directly.
pub use ledger::store::LedgerStore;
