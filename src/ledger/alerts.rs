//! Alert trigger policy.
//!
//! Re-evaluated after every mutation that can change a material's status,
//! inside the same atomic unit. A material has at most one open alert.
//!
//! | status   | open alert | action                       |
//! |----------|------------|------------------------------|
//! | HEALTHY  | any        | resolve                      |
//! | LOW      | none       | raise WARNING                |
//! | LOW      | CRITICAL   | resolve, raise WARNING       |
//! | CRITICAL | none       | raise CRITICAL               |
//! | CRITICAL | WARNING    | resolve, raise CRITICAL      |
//! | same     | same type  | keep                         |

use crate::aggregation::status::{classify_stock, StockStatus};
use crate::model::{AlertType, Material};
use rust_decimal::Decimal;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// A new alert about to be written
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub current_quantity: Decimal,
    pub threshold_quantity: Decimal,
    pub alert_message: String,
}

impl AlertDraft {
    fn for_material(alert_type: AlertType, material: &Material) -> Self {
        let (threshold_quantity, alert_message) = match alert_type {
            AlertType::Warning => (
                material.min_stock_level,
                format!(
                    "Low stock! Only {} {} remaining.",
                    material.current_quantity.normalize(),
                    material.unit
                ),
            ),
            AlertType::Critical => (Decimal::ZERO, "Out of stock!".to_string()),
        };
        Self {
            alert_type,
            current_quantity: material.current_quantity,
            threshold_quantity,
            alert_message,
        }
    }
}

/// What to do with a material's alerts after a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum AlertAction {
    /// Leave the open alert (or its absence) as is
    Keep,
    /// Resolve the open alert
    Resolve,
    /// No alert is open; raise this one
    Raise(AlertDraft),
    /// Resolve the open alert and raise this one instead
    Replace(AlertDraft),
}

impl AlertAction {
    /// The alert this action raises, if any
    pub fn raised(&self) -> Option<&AlertDraft> {
        match self {
            AlertAction::Raise(draft) | AlertAction::Replace(draft) => Some(draft),
            AlertAction::Keep | AlertAction::Resolve => None,
        }
    }

    pub fn resolves_open(&self) -> bool {
        matches!(self, AlertAction::Resolve | AlertAction::Replace(_))
    }
}

/// Decide the alert action for `material` given the type of its open alert.
pub fn evaluate(material: &Material, open: Option<AlertType>) -> AlertAction {
    if !material.is_active {
        return match open {
            Some(_) => AlertAction::Resolve,
            None => AlertAction::Keep,
        };
    }

    let wanted = match classify_stock(material) {
        StockStatus::Healthy => None,
        StockStatus::Low => Some(AlertType::Warning),
        StockStatus::Critical => Some(AlertType::Critical),
    };

    match (open, wanted) {
        (None, None) => AlertAction::Keep,
        (Some(_), None) => AlertAction::Resolve,
        (None, Some(kind)) => AlertAction::Raise(AlertDraft::for_material(kind, material)),
        (Some(current), Some(kind)) if current == kind => AlertAction::Keep,
        (Some(_), Some(kind)) => AlertAction::Replace(AlertDraft::for_material(kind, material)),
    }
}

pub(crate) fn announce(material: &Material, draft: &AlertDraft) {
    log::warn!(
        "{} alert for {} ({}): {}",
        draft.alert_type,
        material.name,
        material.code,
        draft.alert_message
    );
    #[cfg(feature = "metrics")]
    METRICS.record_alert(draft.alert_type.as_str());
}
