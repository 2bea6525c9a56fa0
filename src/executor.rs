//! `SqlExecutor` abstracts statement execution over `may_postgres`.
//!
//! The schema manager and the PostgreSQL ledger backend are written against
//! this trait so a pooled connection and an open transaction can be used
//! interchangeably.

use may_postgres::types::ToSql;
use may_postgres::{Error as PostgresError, Row};
use std::fmt;
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Executor error type
#[derive(Debug)]
pub enum DbError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other execution errors
    Other(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            DbError::QueryError(s) => write!(f, "Query error: {s}"),
            DbError::ParseError(s) => write!(f, "Parse error: {s}"),
            DbError::Other(s) => write!(f, "Execution error: {s}"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<PostgresError> for DbError {
    fn from(err: PostgresError) -> Self {
        DbError::PostgresError(err)
    }
}

/// Trait for executing database operations
pub trait SqlExecutor {
    /// Execute a statement and return the number of rows affected.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError>;

    /// Execute a query that must return exactly one row.
    ///
    /// # Errors
    ///
    /// Fails when the query errors or returns zero or several rows.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError>;

    /// Execute a query and return all rows.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError>;

    /// Execute a query that returns zero or one row.
    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, DbError> {
        let mut rows = self.query_all(query, params)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(DbError::QueryError(format!(
                "expected at most one row, got {n}"
            ))),
        }
    }
}

/// Runs one client call with the query span, duration histogram and error
/// counter applied.
pub(crate) fn instrumented<T>(
    query: &str,
    call: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, DbError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = query;

    let start = Instant::now();
    let result = call().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        DbError::PostgresError(e)
    });

    #[cfg(feature = "metrics")]
    METRICS.record_query(start.elapsed());
    #[cfg(not(feature = "metrics"))]
    let _ = start;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_display() {
        let err = DbError::QueryError("test error".to_string());
        assert!(err.to_string().contains("Query error"));

        let err = DbError::ParseError("test".to_string());
        assert!(err.to_string().contains("Parse error"));

        let err = DbError::Other("test".to_string());
        assert!(err.to_string().contains("Execution error"));
    }
}
