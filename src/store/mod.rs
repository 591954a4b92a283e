//! Persistence for domains, check history, the alert ledger and accounts.
//!
//! The rest of the crate only talks to the `DomainStore` trait. `SqliteStore`
//! keeps everything in a database file so the alert ledger and domain ids
//! survive restarts and separate `run-once` invocations. `MemoryStore` keeps
//! everything in process memory and is meant for tests and trying things out.
//! Both can be seeded from a YAML file at startup.

pub mod memory;
pub mod seed;
pub mod sqlite;

use thiserror::Error;

pub use memory::MemoryStore;
pub use seed::{SeedAccount, SeedData, SeedDomain, SeedWebhook};
pub use sqlite::SqliteStore;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("domain '{0}' is already monitored by this account")]
    Duplicate(String),

    #[error("domain limit reached ({current}/{limit})")]
    QuotaExceeded { current: usize, limit: usize },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid seed data: {0}")]
    Seed(String),
}
