//! Explicit database transactions.
//!
//! A `Transaction` owns a client handle, issues `BEGIN` on creation and
//! must be finished with `commit()` or `rollback()`. Dropping an open
//! transaction rolls it back so a pooled connection is never handed out
//! mid-transaction.

use crate::executor::{instrumented, DbError, SqlExecutor};
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read committed (default). Used by every mutation; the row lock
    /// taken on the material serializes writers.
    ReadCommitted,
    /// Repeatable read. One snapshot for multi-statement reads.
    RepeatableRead,
}

impl IsolationLevel {
    fn begin_statement(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "BEGIN",
            IsolationLevel::RepeatableRead => "BEGIN ISOLATION LEVEL REPEATABLE READ",
        }
    }
}

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    PostgresError(PostgresError),
    /// Transaction already committed or rolled back
    TransactionClosed,
    /// Other transaction errors
    Other(String),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::PostgresError(e) => {
                write!(f, "PostgreSQL error: {}", e)
            }
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            TransactionError::Other(s) => {
                write!(f, "Transaction error: {}", s)
            }
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::PostgresError(err)
    }
}

impl From<TransactionError> for DbError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::PostgresError(e) => DbError::PostgresError(e),
            TransactionError::TransactionClosed => DbError::Other("Transaction closed".to_string()),
            TransactionError::Other(s) => DbError::Other(s),
        }
    }
}

/// A database transaction on one pooled connection
///
/// Statements go through [`SqlExecutor`]. The ledger backend opens one per
/// mutation at `READ COMMITTED` and one per history read at
/// `REPEATABLE READ`.
pub struct Transaction {
    client: Client,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(client: Client) -> Result<Self, TransactionError> {
        Self::new_with_isolation(client, IsolationLevel::ReadCommitted)
    }

    pub(crate) fn new_with_isolation(
        client: Client,
        isolation_level: IsolationLevel,
    ) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        client
            .execute(isolation_level.begin_statement(), &[])
            .map_err(TransactionError::from)?;

        Ok(Self {
            client,
            closed: false,
        })
    }

    /// Commit the transaction
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        // Mark closed first so Drop never issues a rollback after a failed COMMIT.
        self.closed = true;
        self.client
            .execute("COMMIT", &[])
            .map_err(TransactionError::from)?;
        Ok(())
    }

    /// Roll the transaction back
    pub fn rollback(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        self.closed = true;
        self.rollback_inner()
    }

    fn rollback_inner(&self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.client
            .execute("ROLLBACK", &[])
            .map_err(TransactionError::from)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DbError> {
        if self.closed {
            return Err(DbError::Other("Transaction is closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.rollback_inner() {
                log::warn!("Rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}

impl SqlExecutor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.execute(query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query_one(query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
        self.ensure_open()?;
        instrumented(query, || self.client.query(query, params))
    }
}
