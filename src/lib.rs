//! # Stockledger
//!
//! Stock-quantity ledger for a materials inventory on the `may` coroutine
//! runtime. Every change to a material's quantity is an append-only history
//! entry, applied atomically and serialized per material, so the stored
//! quantity always equals the sum of its history.
//!
//! - [`ledger`]: the [`LedgerStore`] trait with in-memory and PostgreSQL
//!   backends, plus the stock alert policy.
//! - [`aggregation`]: dashboard counts, open alerts and the single
//!   stock classification rule.

pub mod aggregation;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod metrics;
pub mod model;
pub mod pool;
pub mod schema;
pub mod seed;
pub mod transaction;

pub use aggregation::{
    classify_quantity, classify_stock, AggregationService, DashboardStats, MaterialFilter,
    StockStatus,
};
pub use config::{DatabaseConfig, LedgerSettings, StockLedgerConfig};
pub use connection::{connect, ConnectionError};
pub use error::{LedgerError, LedgerResult};
pub use executor::{DbError, SqlExecutor};
pub use ledger::{
    verify_ledger, LedgerReconciliation, LedgerStore, MaterialLedger, MaterialUpdate,
    MemoryLedgerStore, NewMaterial, PgLedgerStore, TransactionRequest, UsageRequest,
};
pub use model::{
    AlertType, AlertView, DailyUsageRecord, Material, MaterialDetail, MaterialId,
    StockAlert, StockTransaction, TransactionType,
};
pub use pool::{ConnectionPool, PooledClient};
pub use seed::seed_sample_materials;
pub use transaction::{IsolationLevel, Transaction, TransactionError};

#[cfg(feature = "metrics")]
pub use metrics::render_metrics;
