use super::{column, MaterialId, TransactionId, UsageId};
use crate::executor::DbError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub(crate) const USAGE_COLUMNS: &str = "id, material_id, transaction_id, usage_date, quantity_used, \
     project_code, department, recorded_by, notes, created_at";

/// A consumption event. Always paired with the `DAILY_USAGE` transaction
/// (`transaction_id`) that carries its negative delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsageRecord {
    pub id: UsageId,
    pub material_id: MaterialId,
    pub transaction_id: TransactionId,
    pub usage_date: NaiveDate,
    /// Always positive
    pub quantity_used: Decimal,
    pub project_code: Option<String>,
    pub department: Option<String>,
    pub recorded_by: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DailyUsageRecord {
    pub(crate) fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            material_id: column(row, "material_id")?,
            transaction_id: column(row, "transaction_id")?,
            usage_date: column(row, "usage_date")?,
            quantity_used: column(row, "quantity_used")?,
            project_code: column(row, "project_code")?,
            department: column(row, "department")?,
            recorded_by: column(row, "recorded_by")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
        })
    }
}
