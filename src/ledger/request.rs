//! Inbound requests and their validation.
//!
//! Requests deserialize from the canonical snake_case field names only;
//! unknown fields (including camelCase spellings) are rejected.

use super::limits::{check_cost, check_quantity, derived_level};
use crate::error::{LedgerError, LedgerResult};
use crate::model::{MaterialId, TransactionType};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

const DEFAULT_CATEGORY: &str = "Raw Material";
const DEFAULT_SUPPLIER: &str = "General Supplies";

/// Input of `create_material`
///
/// `name`, `code`, `unit` and `min_stock_level` are required; a blank string
/// counts as missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMaterial {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub unit: String,
    pub min_stock_level: Option<Decimal>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub initial_quantity: Option<Decimal>,
    pub current_cost: Option<Decimal>,
}

impl NewMaterial {
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        unit: impl Into<String>,
        min_stock_level: Decimal,
    ) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            unit: unit.into(),
            min_stock_level: Some(min_stock_level),
            ..Self::default()
        }
    }

    pub fn with_initial_quantity(mut self, quantity: Decimal) -> Self {
        self.initial_quantity = Some(quantity);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_cost(mut self, cost: Decimal) -> Self {
        self.current_cost = Some(cost);
        self
    }

    pub(crate) fn validate(&self) -> LedgerResult<MaterialDraft> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.code.trim().is_empty() {
            missing.push("code");
        }
        if self.unit.trim().is_empty() {
            missing.push("unit");
        }
        if self.min_stock_level.is_none() {
            missing.push("min_stock_level");
        }
        let min_stock_level = match self.min_stock_level {
            Some(level) if missing.is_empty() => level,
            _ => {
                return Err(LedgerError::Validation(format!(
                    "Missing required fields: {}",
                    missing.join(", ")
                )))
            }
        };

        if min_stock_level < Decimal::ZERO {
            return Err(LedgerError::Validation(
                "min_stock_level cannot be negative".to_string(),
            ));
        }
        check_quantity("min_stock_level", min_stock_level)?;
        let initial_quantity = self.initial_quantity.unwrap_or(Decimal::ZERO);
        if initial_quantity < Decimal::ZERO {
            return Err(LedgerError::Validation(
                "initial_quantity cannot be negative".to_string(),
            ));
        }
        check_quantity("initial_quantity", initial_quantity)?;
        let current_cost = self.current_cost.unwrap_or(Decimal::ZERO);
        if current_cost < Decimal::ZERO {
            return Err(LedgerError::Validation(
                "current_cost cannot be negative".to_string(),
            ));
        }
        check_cost("current_cost", current_cost)?;
        let reorder_level = derived_level("reorder_level", min_stock_level, Decimal::new(15, 1))?;
        let max_stock_level = derived_level("max_stock_level", min_stock_level, Decimal::from(3))?;

        Ok(MaterialDraft {
            name: self.name.trim().to_string(),
            code: self.code.trim().to_string(),
            unit: self.unit.trim().to_string(),
            description: self.description.clone().unwrap_or_default(),
            category: non_blank(&self.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            supplier: non_blank(&self.supplier).unwrap_or_else(|| DEFAULT_SUPPLIER.to_string()),
            min_stock_level,
            reorder_level,
            max_stock_level,
            current_cost,
            initial_quantity,
        })
    }
}

/// A validated `NewMaterial` with derived levels filled in
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MaterialDraft {
    pub name: String,
    pub code: String,
    pub unit: String,
    pub description: String,
    pub category: String,
    pub supplier: String,
    pub min_stock_level: Decimal,
    pub reorder_level: Decimal,
    pub max_stock_level: Decimal,
    pub current_cost: Decimal,
    pub initial_quantity: Decimal,
}

/// Input of `record_transaction`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionRequest {
    pub material_id: MaterialId,
    pub transaction_type: TransactionType,
    /// Signed delta
    pub quantity: Decimal,
    pub reference_number: Option<String>,
    pub project_code: Option<String>,
    pub department: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl TransactionRequest {
    pub fn new(material_id: MaterialId, transaction_type: TransactionType, quantity: Decimal) -> Self {
        Self {
            material_id,
            transaction_type,
            quantity,
            reference_number: None,
            project_code: None,
            department: None,
            notes: None,
            created_by: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_number = Some(reference.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.created_by = Some(author.into());
        self
    }

    pub(crate) fn validate(&self) -> LedgerResult<()> {
        check_quantity("quantity", self.quantity)?;
        Ok(())
    }

    pub(crate) fn author_or<'a>(&'a self, default_author: &'a str) -> &'a str {
        author_or(&self.created_by, default_author)
    }
}

/// Input of `record_daily_usage`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsageRequest {
    pub material_id: MaterialId,
    /// Must be positive
    pub quantity_used: Decimal,
    /// Defaults to today (UTC)
    pub usage_date: Option<NaiveDate>,
    pub project_code: Option<String>,
    pub department: Option<String>,
    pub recorded_by: Option<String>,
    pub notes: Option<String>,
}

impl UsageRequest {
    pub fn new(material_id: MaterialId, quantity_used: Decimal) -> Self {
        Self {
            material_id,
            quantity_used,
            usage_date: None,
            project_code: None,
            department: None,
            recorded_by: None,
            notes: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.usage_date = Some(date);
        self
    }

    pub fn with_project(mut self, project_code: impl Into<String>) -> Self {
        self.project_code = Some(project_code.into());
        self
    }

    pub fn with_recorder(mut self, recorded_by: impl Into<String>) -> Self {
        self.recorded_by = Some(recorded_by.into());
        self
    }

    pub(crate) fn validate(&self) -> LedgerResult<()> {
        if self.quantity_used <= Decimal::ZERO {
            return Err(LedgerError::Validation(format!(
                "quantity_used must be positive, got {}",
                self.quantity_used
            )));
        }
        check_quantity("quantity_used", self.quantity_used)?;
        Ok(())
    }

    pub(crate) fn recorder_or<'a>(&'a self, default_author: &'a str) -> &'a str {
        author_or(&self.recorded_by, default_author)
    }

    pub(crate) fn date_or_today(&self) -> NaiveDate {
        self.usage_date
            .unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

/// Input of `update_material`. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub supplier: Option<String>,
    pub unit: Option<String>,
    pub min_stock_level: Option<Decimal>,
    pub current_cost: Option<Decimal>,
}

impl MaterialUpdate {
    pub(crate) fn validate(&self) -> LedgerResult<()> {
        if *self == MaterialUpdate::default() {
            return Err(LedgerError::Validation("update has no fields set".to_string()));
        }
        for (field, value) in [("name", &self.name), ("unit", &self.unit)] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(LedgerError::Validation(format!("{field} cannot be blank")));
            }
        }
        if let Some(level) = self.min_stock_level {
            if level < Decimal::ZERO {
                return Err(LedgerError::Validation(
                    "min_stock_level cannot be negative".to_string(),
                ));
            }
            check_quantity("min_stock_level", level)?;
        }
        if let Some(cost) = self.current_cost {
            if cost < Decimal::ZERO {
                return Err(LedgerError::Validation(
                    "current_cost cannot be negative".to_string(),
                ));
            }
            check_cost("current_cost", cost)?;
        }
        Ok(())
    }

    /// Apply onto a material in place. Derived levels are left as they are.
    pub(crate) fn apply_to(&self, material: &mut crate::model::Material) {
        if let Some(name) = &self.name {
            material.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            material.description = description.clone();
        }
        if let Some(category) = &self.category {
            material.category = category.clone();
        }
        if let Some(supplier) = &self.supplier {
            material.supplier = supplier.clone();
        }
        if let Some(unit) = &self.unit {
            material.unit = unit.trim().to_string();
        }
        if let Some(level) = self.min_stock_level {
            material.min_stock_level = level;
        }
        if let Some(cost) = self.current_cost {
            material.current_cost = cost;
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn author_or<'a>(author: &'a Option<String>, default_author: &'a str) -> &'a str {
    match author.as_deref().map(str::trim) {
        Some(a) if !a.is_empty() => a,
        _ => default_author,
    }
}
