//! Ledger error taxonomy
//!
//! Every ledger operation either fully commits or fails with one of these
//! variants and leaves no visible side effect behind.

use crate::connection::ConnectionError;
use crate::executor::DbError;
use crate::transaction::TransactionError;
use std::fmt;

/// Result alias used throughout the ledger and aggregation layers
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error type
#[derive(Debug)]
pub enum LedgerError {
    /// Missing or malformed input, rejected before any mutation
    Validation(String),
    /// A material with this code already exists
    DuplicateCode(String),
    /// Referenced record does not exist (or the material is inactive)
    NotFound(String),
    /// Query or row decoding failure
    Database(DbError),
    /// Connection establishment or pool acquisition failure
    Connection(ConnectionError),
    /// Invariant breakage inside the store (poisoned lock and the like)
    Internal(String),
}

impl LedgerError {
    pub(crate) fn material_not_found(id: i64) -> Self {
        LedgerError::NotFound(format!("material {id}"))
    }

    pub(crate) fn alert_not_found(id: i64) -> Self {
        LedgerError::NotFound(format!("alert {id}"))
    }

    /// Whether a caller may retry the same request unchanged.
    ///
    /// Input and lookup failures cannot succeed on retry; only
    /// infrastructure failures can.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Validation(_)
            | LedgerError::DuplicateCode(_)
            | LedgerError::NotFound(_)
            | LedgerError::Internal(_) => false,
            LedgerError::Database(_) | LedgerError::Connection(_) => true,
        }
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Validation(s) => write!(f, "Validation error: {s}"),
            LedgerError::DuplicateCode(code) => {
                write!(f, "Material code '{code}' already exists")
            }
            LedgerError::NotFound(what) => write!(f, "Not found: {what}"),
            LedgerError::Database(e) => write!(f, "Database error: {e}"),
            LedgerError::Connection(e) => write!(f, "Connection error: {e}"),
            LedgerError::Internal(s) => write!(f, "Internal ledger error: {s}"),
        }
    }
}

impl std::error::Error for LedgerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LedgerError::Database(e) => Some(e),
            LedgerError::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        LedgerError::Database(err)
    }
}

impl From<ConnectionError> for LedgerError {
    fn from(err: ConnectionError) -> Self {
        LedgerError::Connection(err)
    }
}

impl From<TransactionError> for LedgerError {
    fn from(err: TransactionError) -> Self {
        LedgerError::Database(err.into())
    }
}

impl From<may_postgres::Error> for LedgerError {
    fn from(err: may_postgres::Error) -> Self {
        LedgerError::Database(DbError::PostgresError(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_code_display_carries_code() {
        let err = LedgerError::DuplicateCode("STL-001".to_string());
        assert_eq!(err.to_string(), "Material code 'STL-001' already exists");
    }

    #[test]
    fn test_not_found_helpers() {
        assert!(LedgerError::material_not_found(7)
            .to_string()
            .contains("material 7"));
        assert!(LedgerError::alert_not_found(3).to_string().contains("alert 3"));
    }

    #[test]
    fn test_input_errors_are_not_retryable() {
        assert!(!LedgerError::Validation("x".into()).is_retryable());
        assert!(!LedgerError::DuplicateCode("x".into()).is_retryable());
        assert!(!LedgerError::NotFound("x".into()).is_retryable());
        assert!(LedgerError::Database(DbError::QueryError("x".into())).is_retryable());
        assert!(LedgerError::Connection(ConnectionError::PoolTimeout(30)).is_retryable());
    }

    #[test]
    fn test_transaction_error_conversion() {
        let err: LedgerError = TransactionError::TransactionClosed.into();
        assert!(matches!(err, LedgerError::Database(_)));
    }
}
