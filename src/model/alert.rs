use super::{column, AlertId, MaterialId};
use crate::executor::DbError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub(crate) const ALERT_COLUMNS: &str = "id, material_id, alert_type, current_quantity, \
     threshold_quantity, alert_message, is_resolved, resolved_by, resolved_at, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// At or below minimum stock, still positive
    Warning,
    /// Out of stock (zero or negative)
    Critical,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Warning => "WARNING",
            AlertType::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WARNING" => Ok(AlertType::Warning),
            "CRITICAL" => Ok(AlertType::Critical),
            other => Err(format!("unknown alert type '{other}'")),
        }
    }
}

/// A threshold breach recorded against a material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAlert {
    pub id: AlertId,
    pub material_id: MaterialId,
    pub alert_type: AlertType,
    /// Quantity when the alert was raised
    pub current_quantity: Decimal,
    pub threshold_quantity: Decimal,
    pub alert_message: String,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StockAlert {
    pub(crate) fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        let kind: String = column(row, "alert_type")?;
        Ok(Self {
            id: column(row, "id")?,
            material_id: column(row, "material_id")?,
            alert_type: kind.parse().map_err(DbError::ParseError)?,
            current_quantity: column(row, "current_quantity")?,
            threshold_quantity: column(row, "threshold_quantity")?,
            alert_message: column(row, "alert_message")?,
            is_resolved: column(row, "is_resolved")?,
            resolved_by: column(row, "resolved_by")?,
            resolved_at: column(row, "resolved_at")?,
            created_at: column(row, "created_at")?,
        })
    }
}

/// An unresolved alert joined with its material
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: StockAlert,
    pub material_name: String,
    pub material_code: String,
    pub unit: String,
}

impl AlertView {
    pub(crate) fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        Ok(Self {
            alert: StockAlert::from_row(row)?,
            material_name: column(row, "material_name")?,
            material_code: column(row, "material_code")?,
            unit: column(row, "unit")?,
        })
    }
}
