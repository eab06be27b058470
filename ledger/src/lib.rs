//! Funds & bonus ledger engine.
//!
//! Account balances, an immutable transaction log, and a bonus wallet per
//! user, with every money movement applied as one atomic commit. The
//! request-handling layer (not part of this crate) authenticates callers
//! and hands the engine a [`payloads::Principal`] plus a typed request.
//!
//! Entry points: [`engine::LedgerEngine`] over a [`store::LedgerStore`]
//! implementation ([`store::postgres::PgStore`] in production,
//! [`store::memory::MemStore`] in tests).

pub mod category;
pub mod engine;
pub mod store;
pub mod telemetry;
pub mod time;

pub struct Config {
    pub database_url: String,
}

impl Config {
    /// Read configuration from the environment, loading a `.env` file first
    /// if one exists.
    ///
    /// Required environment variables:
    /// - DATABASE_URL: PostgreSQL connection string
    pub fn from_env() -> Self {
        use std::env::var;

        let _ = dotenvy::dotenv();

        Config {
            database_url: var("DATABASE_URL").unwrap(),
        }
    }
}
