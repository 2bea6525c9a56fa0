//! Threshold classification.
//!
//! The one place that compares quantity against minimum stock. Stats,
//! search filters and the alert policy all call [`classify_quantity`].

use crate::model::Material;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    /// `current_quantity > min_stock_level`
    Healthy,
    /// `0 < current_quantity <= min_stock_level`
    Low,
    /// `current_quantity <= 0`
    Critical,
}

impl StockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::Healthy => "HEALTHY",
            StockStatus::Low => "LOW",
            StockStatus::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify_quantity(current_quantity: Decimal, min_stock_level: Decimal) -> StockStatus {
    if current_quantity <= Decimal::ZERO {
        StockStatus::Critical
    } else if current_quantity <= min_stock_level {
        StockStatus::Low
    } else {
        StockStatus::Healthy
    }
}

pub fn classify_stock(material: &Material) -> StockStatus {
    classify_quantity(material.current_quantity, material.min_stock_level)
}
