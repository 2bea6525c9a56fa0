//! Bounded PostgreSQL connection pool.
//!
//! Connections are opened eagerly and parked behind a `may` semaphore;
//! callers check one out for the duration of a ledger operation so each
//! transaction has its connection to itself. A coroutine waiting for a
//! connection yields instead of blocking its worker thread.

pub mod config;
pub mod manager;

pub use config::DatabaseConfig;
pub use manager::{ConnectionPool, PooledClient};
