use super::{column, MaterialId, TransactionId};
use crate::executor::DbError;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub(crate) const TRANSACTION_COLUMNS: &str = "id, material_id, transaction_type, quantity, \
     balance_after_transaction, reference_number, project_code, department, notes, \
     created_by, created_at";

/// Kind of stock movement recorded in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    /// Goods received from a supplier (also used for initial stock)
    PurchaseIn,
    /// Consumption logged through a daily usage record
    DailyUsage,
    /// Stock count correction, either sign
    ManualAdjustment,
    /// Material returned to stock from a project
    ReturnIn,
    /// Damaged, expired or lost stock
    WriteOff,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::PurchaseIn,
        TransactionType::DailyUsage,
        TransactionType::ManualAdjustment,
        TransactionType::ReturnIn,
        TransactionType::WriteOff,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::PurchaseIn => "PURCHASE_IN",
            TransactionType::DailyUsage => "DAILY_USAGE",
            TransactionType::ManualAdjustment => "MANUAL_ADJUSTMENT",
            TransactionType::ReturnIn => "RETURN_IN",
            TransactionType::WriteOff => "WRITE_OFF",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| LedgerError::Validation(format!("unknown transaction type '{s}'")))
    }
}

/// One signed quantity delta applied to one material. Never updated or
/// deleted once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: TransactionId,
    pub material_id: MaterialId,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    /// Material quantity immediately after this entry
    pub balance_after_transaction: Decimal,
    pub reference_number: Option<String>,
    pub project_code: Option<String>,
    pub department: Option<String>,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl StockTransaction {
    pub(crate) fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        let kind: String = column(row, "transaction_type")?;
        let transaction_type = kind
            .parse()
            .map_err(|e: LedgerError| DbError::ParseError(e.to_string()))?;

        Ok(Self {
            id: column(row, "id")?,
            material_id: column(row, "material_id")?,
            transaction_type,
            quantity: column(row, "quantity")?,
            balance_after_transaction: column(row, "balance_after_transaction")?,
            reference_number: column(row, "reference_number")?,
            project_code: column(row, "project_code")?,
            department: column(row, "department")?,
            notes: column(row, "notes")?,
            created_by: column(row, "created_by")?,
            created_at: column(row, "created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_type_parse_round_trip() {
        for kind in TransactionType::ALL {
            assert_eq!(kind.as_str().parse::<TransactionType>().ok(), Some(kind));
        }
    }

    #[test]
    fn test_unknown_transaction_type_is_validation_error() {
        let err = "purchase_in".parse::<TransactionType>().unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&TransactionType::DailyUsage).unwrap();
        assert_eq!(json, "\"DAILY_USAGE\"");
    }
}
