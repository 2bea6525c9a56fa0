use super::{column, MaterialId, StockTransaction};
use crate::executor::DbError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Column list matching [`Material::from_row`]
pub(crate) const MATERIAL_COLUMNS: &str = "id, code, name, description, category, supplier, unit, \
     current_quantity, min_stock_level, reorder_level, max_stock_level, current_cost, \
     is_active, created_at, updated_at";

/// A stocked item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    /// Unique and immutable once assigned
    pub code: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub supplier: String,
    pub unit: String,
    /// Running sum of every history entry for this material
    pub current_quantity: Decimal,
    pub min_stock_level: Decimal,
    pub reorder_level: Decimal,
    pub max_stock_level: Decimal,
    pub current_cost: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Material {
    /// Value of the stock on hand; negative balances count as zero.
    /// `None` if the product does not fit a `Decimal`.
    pub fn stock_value(&self) -> Option<Decimal> {
        self.current_quantity
            .max(Decimal::ZERO)
            .checked_mul(self.current_cost)
    }

    pub(crate) fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            code: column(row, "code")?,
            name: column(row, "name")?,
            description: column(row, "description")?,
            category: column(row, "category")?,
            supplier: column(row, "supplier")?,
            unit: column(row, "unit")?,
            current_quantity: column(row, "current_quantity")?,
            min_stock_level: column(row, "min_stock_level")?,
            reorder_level: column(row, "reorder_level")?,
            max_stock_level: column(row, "max_stock_level")?,
            current_cost: column(row, "current_cost")?,
            is_active: column(row, "is_active")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

/// A material with its most recent transactions, newest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialDetail {
    #[serde(flatten)]
    pub material: Material,
    pub transactions: Vec<StockTransaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(quantity: Decimal, cost: Decimal) -> Material {
        let now = Utc::now();
        Material {
            id: 1,
            code: "STL-001".to_string(),
            name: "Steel Plates".to_string(),
            description: String::new(),
            category: "Raw Material".to_string(),
            supplier: "General Supplies".to_string(),
            unit: "units".to_string(),
            current_quantity: quantity,
            min_stock_level: Decimal::from(20),
            reorder_level: Decimal::from(30),
            max_stock_level: Decimal::from(60),
            current_cost: cost,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_stock_value() {
        let cost = Decimal::new(4550, 2);
        assert_eq!(material(Decimal::from(5), cost).stock_value(), Some(Decimal::new(22750, 2)));
        assert_eq!(material(Decimal::from(-5), cost).stock_value(), Some(Decimal::ZERO));
        assert_eq!(material(Decimal::MAX, Decimal::from(2)).stock_value(), None);
    }
}
