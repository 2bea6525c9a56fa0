//! Ledger records.
//!
//! One canonical schema: every struct serializes with the snake_case column
//! names used in the tables, and decodes from a `may_postgres::Row` by name.

pub mod alert;
pub mod material;
pub mod transaction;
pub mod usage;

pub use alert::{AlertType, AlertView, StockAlert};
pub use material::{Material, MaterialDetail};
pub use transaction::{StockTransaction, TransactionType};
pub use usage::DailyUsageRecord;

use crate::executor::DbError;
use may_postgres::types::FromSql;
use may_postgres::Row;

/// Surrogate key of a material
pub type MaterialId = i64;
/// Surrogate key of a stock transaction
pub type TransactionId = i64;
/// Surrogate key of a daily usage record
pub type UsageId = i64;
/// Surrogate key of a stock alert
pub type AlertId = i64;

pub(crate) fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T, DbError> {
    row.try_get::<&str, T>(name)
        .map_err(|e| DbError::ParseError(format!("column '{name}': {e}")))
}
