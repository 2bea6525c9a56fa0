//! Ledger Store: materials plus their append-only stock history.
//!
//! Every mutation reads the current quantity, applies a signed delta,
//! writes the new quantity and appends the history entry as one unit that
//! is serialized per material. `current_quantity` therefore always equals
//! the sum of the material's history, and each entry's
//! `balance_after_transaction` equals the running sum up to that entry.
//!
//! Two backends implement [`LedgerStore`]:
//! - [`MemoryLedgerStore`]: in-process, one lock per material.
//! - [`PgLedgerStore`]: PostgreSQL, one row lock per material via
//!   `SELECT ... FOR UPDATE` followed by the write of the new balance.
//!
//! Both compute the new balance with [`limits`], so a delta that would
//! leave the storable range is rejected before anything is written.

pub mod alerts;
pub mod limits;
pub mod memory;
pub mod postgres;
mod request;

pub use alerts::{AlertAction, AlertDraft};
pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;
pub use request::{MaterialUpdate, NewMaterial, TransactionRequest, UsageRequest};
pub(crate) use request::MaterialDraft;

use crate::error::LedgerResult;
use crate::model::{
    AlertId, AlertView, DailyUsageRecord, Material, MaterialDetail, MaterialId, StockAlert,
    StockTransaction, TransactionId, UsageId,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Operations every ledger backend provides
pub trait LedgerStore: Send + Sync {
    /// Insert a material; appends a `PURCHASE_IN` entry when it starts with stock.
    fn create_material(&self, new: &NewMaterial) -> LedgerResult<MaterialId>;

    /// Apply a signed delta and append the matching history entry.
    fn record_transaction(&self, request: &TransactionRequest) -> LedgerResult<TransactionId>;

    /// Record consumption: a usage row plus a `DAILY_USAGE` entry of `-quantity_used`.
    fn record_daily_usage(&self, request: &UsageRequest) -> LedgerResult<UsageId>;

    /// Active material with its most recent transactions, newest first.
    fn get_material(&self, id: MaterialId) -> LedgerResult<MaterialDetail>;

    /// Active materials whose name or code contains `search` (case-insensitive), by name.
    fn list_materials(&self, search: Option<&str>) -> LedgerResult<Vec<Material>>;

    /// Edit descriptive fields, cost or minimum level. Quantity is not editable.
    fn update_material(&self, id: MaterialId, update: &MaterialUpdate) -> LedgerResult<Material>;

    /// Soft delete. History is kept and open alerts are resolved.
    fn deactivate_material(&self, id: MaterialId) -> LedgerResult<()>;

    /// The material with its full history oldest first, inactive materials included.
    fn material_history(&self, id: MaterialId) -> LedgerResult<MaterialLedger>;

    /// Usage records dated `date`, across all materials.
    fn usage_on(&self, date: NaiveDate) -> LedgerResult<Vec<DailyUsageRecord>>;

    /// Unresolved alerts of active materials joined with their material, newest first.
    fn unresolved_alerts(&self) -> LedgerResult<Vec<AlertView>>;

    /// Number of alerts `unresolved_alerts` would return.
    fn unresolved_alert_count(&self) -> LedgerResult<u64>;

    /// Mark an open alert resolved.
    fn resolve_alert(&self, id: AlertId, resolved_by: &str) -> LedgerResult<StockAlert>;

    /// Number of history entries across all materials.
    fn transaction_count(&self) -> LedgerResult<u64>;
}

/// A material and every history entry recorded against it, oldest first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialLedger {
    pub material: Material,
    pub history: Vec<StockTransaction>,
}

/// Result of replaying a material's history against its stored quantity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerReconciliation {
    pub material_id: MaterialId,
    pub recorded_quantity: Decimal,
    pub ledger_sum: Decimal,
    pub entries: usize,
    /// First entry whose `balance_after_transaction` disagrees with the running sum
    pub first_bad_balance: Option<TransactionId>,
}

impl LedgerReconciliation {
    pub fn is_balanced(&self) -> bool {
        self.recorded_quantity == self.ledger_sum && self.first_bad_balance.is_none()
    }
}

/// Replay the full history of one material and compare it to the stored quantity.
///
/// Works for inactive materials too, since deactivation keeps history.
pub fn verify_ledger<S: LedgerStore + ?Sized>(
    store: &S,
    id: MaterialId,
) -> LedgerResult<LedgerReconciliation> {
    let MaterialLedger { material, history } = store.material_history(id)?;

    let mut running = Decimal::ZERO;
    let mut first_bad_balance = None;
    for entry in &history {
        match running.checked_add(entry.quantity) {
            Some(next) => running = next,
            None => {
                first_bad_balance.get_or_insert(entry.id);
                break;
            }
        }
        if first_bad_balance.is_none() && entry.balance_after_transaction != running {
            first_bad_balance = Some(entry.id);
        }
    }

    let reconciliation = LedgerReconciliation {
        material_id: id,
        recorded_quantity: material.current_quantity,
        ledger_sum: running,
        entries: history.len(),
        first_bad_balance,
    };
    if !reconciliation.is_balanced() {
        log::warn!(
            "Ledger out of balance for material {}: recorded {} vs history {}",
            id,
            reconciliation.recorded_quantity,
            reconciliation.ledger_sum
        );
    }
    Ok(reconciliation)
}

/// Case-insensitive substring match on name or code
pub fn matches_search(material: &Material, search: &str) -> bool {
    let needle = search.trim().to_lowercase();
    needle.is_empty()
        || material.name.to_lowercase().contains(&needle)
        || material.code.to_lowercase().contains(&needle)
}

pub(crate) fn initial_stock_reference(code: &str) -> String {
    format!("INIT-{}-{}", code, Utc::now().timestamp_millis())
}

pub(crate) fn usage_reference() -> String {
    format!("USAGE-{}", Utc::now().timestamp_millis())
}

pub(crate) const INITIAL_STOCK_NOTE: &str = "Initial stock";
pub(crate) const SYSTEM_AUTHOR: &str = "System";

pub(crate) fn committed(operation: &'static str, material_id: MaterialId) {
    log::debug!("{} committed for material {}", operation, material_id);
    #[cfg(feature = "metrics")]
    METRICS.record_mutation(operation);
}
