//! In-memory ledger backend.
//!
//! Each material lives in its own slot behind a coroutine-aware mutex, so
//! the read-modify-append sequence is serialized per material while
//! different materials proceed in parallel. Lock order is always
//! catalog -> slot -> alerts.

use super::alerts::{self, AlertAction};
use super::limits::next_balance;
use super::{
    committed, initial_stock_reference, matches_search, usage_reference, LedgerStore,
    MaterialDraft, MaterialLedger, MaterialUpdate, NewMaterial, TransactionRequest, UsageRequest,
    INITIAL_STOCK_NOTE, SYSTEM_AUTHOR,
};
use crate::config::LedgerSettings;
use crate::error::{LedgerError, LedgerResult};
use crate::model::{
    AlertId, AlertView, DailyUsageRecord, Material, MaterialDetail, MaterialId, StockAlert,
    StockTransaction, TransactionId, TransactionType, UsageId,
};
use chrono::{DateTime, NaiveDate, Utc};
use may::sync::{Mutex, MutexGuard, RwLock};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

struct MaterialSlot {
    material: Material,
    /// Oldest first
    transactions: Vec<StockTransaction>,
    usage: Vec<DailyUsageRecord>,
}

#[derive(Default)]
struct Catalog {
    by_id: BTreeMap<MaterialId, Arc<Mutex<MaterialSlot>>>,
    by_code: HashMap<String, MaterialId>,
}

#[derive(Default)]
struct AlertBook {
    next_id: AlertId,
    alerts: Vec<StockAlert>,
}

impl AlertBook {
    fn open_for(&mut self, material_id: MaterialId) -> Option<&mut StockAlert> {
        self.alerts
            .iter_mut()
            .find(|a| a.material_id == material_id && !a.is_resolved)
    }

    fn apply(&mut self, material: &Material, action: AlertAction, now: DateTime<Utc>) {
        if action.resolves_open() {
            if let Some(open) = self.open_for(material.id) {
                resolve(open, SYSTEM_AUTHOR, now);
            }
        }
        if let Some(draft) = action.raised() {
            alerts::announce(material, draft);
            self.next_id += 1;
            self.alerts.push(StockAlert {
                id: self.next_id,
                material_id: material.id,
                alert_type: draft.alert_type,
                current_quantity: draft.current_quantity,
                threshold_quantity: draft.threshold_quantity,
                alert_message: draft.alert_message.clone(),
                is_resolved: false,
                resolved_by: None,
                resolved_at: None,
                created_at: now,
            });
        }
    }
}

fn resolve(alert: &mut StockAlert, resolved_by: &str, now: DateTime<Utc>) {
    alert.is_resolved = true;
    alert.resolved_by = Some(resolved_by.to_string());
    alert.resolved_at = Some(now);
}

/// Ledger held entirely in process memory
pub struct MemoryLedgerStore {
    settings: LedgerSettings,
    catalog: RwLock<Catalog>,
    alerts: Mutex<AlertBook>,
    next_material_id: AtomicI64,
    next_transaction_id: AtomicI64,
    next_usage_id: AtomicI64,
    transaction_count: AtomicU64,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(LedgerSettings::default())
    }
}

impl MemoryLedgerStore {
    pub fn new(settings: LedgerSettings) -> Self {
        Self {
            settings,
            catalog: RwLock::new(Catalog::default()),
            alerts: Mutex::new(AlertBook::default()),
            next_material_id: AtomicI64::new(1),
            next_transaction_id: AtomicI64::new(1),
            next_usage_id: AtomicI64::new(1),
            transaction_count: AtomicU64::new(0),
        }
    }

    fn slot(&self, id: MaterialId) -> LedgerResult<Arc<Mutex<MaterialSlot>>> {
        let catalog = self
            .catalog
            .read()
            .map_err(|_| poisoned("catalog"))?;
        catalog
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| LedgerError::material_not_found(id))
    }

    fn all_slots(&self) -> LedgerResult<Vec<Arc<Mutex<MaterialSlot>>>> {
        let catalog = self
            .catalog
            .read()
            .map_err(|_| poisoned("catalog"))?;
        Ok(catalog.by_id.values().cloned().collect())
    }

    fn alert_book(&self) -> LedgerResult<MutexGuard<'_, AlertBook>> {
        self.alerts.lock().map_err(|_| poisoned("alerts"))
    }

    fn next_transaction(&self) -> TransactionId {
        self.transaction_count.fetch_add(1, Ordering::SeqCst);
        self.next_transaction_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Apply the alert policy for `material`. With alerts disabled only
    /// deactivation still resolves the open alert.
    fn reevaluate(&self, book: &mut AlertBook, material: &Material, now: DateTime<Utc>) {
        if !self.settings.alerts_enabled && material.is_active {
            return;
        }
        let open = book.open_for(material.id).map(|a| a.alert_type);
        let action = alerts::evaluate(material, open);
        book.apply(material, action, now);
    }

    fn build_material(&self, id: MaterialId, draft: &MaterialDraft, now: DateTime<Utc>) -> Material {
        Material {
            id,
            code: draft.code.clone(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            category: draft.category.clone(),
            supplier: draft.supplier.clone(),
            unit: draft.unit.clone(),
            current_quantity: draft.initial_quantity,
            min_stock_level: draft.min_stock_level,
            reorder_level: draft.reorder_level,
            max_stock_level: draft.max_stock_level,
            current_cost: draft.current_cost,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

fn poisoned(what: &str) -> LedgerError {
    LedgerError::Internal(format!("{what} lock poisoned"))
}

fn lock_slot(slot: &Mutex<MaterialSlot>) -> LedgerResult<MutexGuard<'_, MaterialSlot>> {
    slot.lock().map_err(|_| poisoned("material"))
}

fn active_slot<'a>(
    slot: &'a Mutex<MaterialSlot>,
    id: MaterialId,
) -> LedgerResult<MutexGuard<'a, MaterialSlot>> {
    let guard = lock_slot(slot)?;
    if !guard.material.is_active {
        return Err(LedgerError::material_not_found(id));
    }
    Ok(guard)
}

impl LedgerStore for MemoryLedgerStore {
    fn create_material(&self, new: &NewMaterial) -> LedgerResult<MaterialId> {
        let draft = new.validate()?;
        let now = Utc::now();

        // Uniqueness check and insertion share the catalog write lock.
        let mut catalog = self
            .catalog
            .write()
            .map_err(|_| poisoned("catalog"))?;
        if catalog.by_code.contains_key(&draft.code) {
            return Err(LedgerError::DuplicateCode(draft.code));
        }
        let mut book = self.alert_book()?;

        let id = self.next_material_id.fetch_add(1, Ordering::SeqCst);
        let material = self.build_material(id, &draft, now);
        let mut transactions = Vec::new();
        if draft.initial_quantity > Decimal::ZERO {
            transactions.push(StockTransaction {
                id: self.next_transaction(),
                material_id: id,
                transaction_type: TransactionType::PurchaseIn,
                quantity: draft.initial_quantity,
                balance_after_transaction: draft.initial_quantity,
                reference_number: Some(initial_stock_reference(&draft.code)),
                project_code: None,
                department: None,
                notes: Some(INITIAL_STOCK_NOTE.to_string()),
                created_by: SYSTEM_AUTHOR.to_string(),
                created_at: now,
            });
        }

        self.reevaluate(&mut book, &material, now);
        log::info!("Material '{}' ({}) created with id {}", material.name, material.code, id);

        catalog.by_code.insert(draft.code.clone(), id);
        catalog.by_id.insert(
            id,
            Arc::new(Mutex::new(MaterialSlot {
                material,
                transactions,
                usage: Vec::new(),
            })),
        );
        committed("create_material", id);
        Ok(id)
    }

    fn record_transaction(&self, request: &TransactionRequest) -> LedgerResult<TransactionId> {
        request.validate()?;
        let slot = self.slot(request.material_id)?;
        let mut guard = active_slot(&slot, request.material_id)?;
        let new_quantity = next_balance(guard.material.current_quantity, request.quantity)?;
        let mut book = self.alert_book()?;
        let now = Utc::now();

        let id = self.next_transaction();
        guard.transactions.push(StockTransaction {
            id,
            material_id: request.material_id,
            transaction_type: request.transaction_type,
            quantity: request.quantity,
            balance_after_transaction: new_quantity,
            reference_number: request.reference_number.clone(),
            project_code: request.project_code.clone(),
            department: request.department.clone(),
            notes: request.notes.clone(),
            created_by: request.author_or(&self.settings.default_author).to_string(),
            created_at: now,
        });
        guard.material.current_quantity = new_quantity;
        guard.material.updated_at = now;

        self.reevaluate(&mut book, &guard.material, now);
        committed("record_transaction", request.material_id);
        Ok(id)
    }

    fn record_daily_usage(&self, request: &UsageRequest) -> LedgerResult<UsageId> {
        request.validate()?;
        let slot = self.slot(request.material_id)?;
        let mut guard = active_slot(&slot, request.material_id)?;
        let new_quantity = next_balance(guard.material.current_quantity, -request.quantity_used)?;
        let mut book = self.alert_book()?;
        let now = Utc::now();

        let recorded_by = request.recorder_or(&self.settings.default_author).to_string();
        let transaction_id = self.next_transaction();
        guard.transactions.push(StockTransaction {
            id: transaction_id,
            material_id: request.material_id,
            transaction_type: TransactionType::DailyUsage,
            quantity: -request.quantity_used,
            balance_after_transaction: new_quantity,
            reference_number: Some(usage_reference()),
            project_code: request.project_code.clone(),
            department: request.department.clone(),
            notes: request.notes.clone(),
            created_by: recorded_by.clone(),
            created_at: now,
        });

        let usage_id = self.next_usage_id.fetch_add(1, Ordering::SeqCst);
        guard.usage.push(DailyUsageRecord {
            id: usage_id,
            material_id: request.material_id,
            transaction_id,
            usage_date: request.date_or_today(),
            quantity_used: request.quantity_used,
            project_code: request.project_code.clone(),
            department: request.department.clone(),
            recorded_by,
            notes: request.notes.clone(),
            created_at: now,
        });
        guard.material.current_quantity = new_quantity;
        guard.material.updated_at = now;

        self.reevaluate(&mut book, &guard.material, now);
        committed("record_daily_usage", request.material_id);
        Ok(usage_id)
    }

    fn get_material(&self, id: MaterialId) -> LedgerResult<MaterialDetail> {
        let slot = self.slot(id)?;
        let guard = active_slot(&slot, id)?;
        let transactions = guard
            .transactions
            .iter()
            .rev()
            .take(self.settings.recent_transactions_limit)
            .cloned()
            .collect();
        Ok(MaterialDetail {
            material: guard.material.clone(),
            transactions,
        })
    }

    fn list_materials(&self, search: Option<&str>) -> LedgerResult<Vec<Material>> {
        let mut materials = Vec::new();
        for slot in self.all_slots()? {
            let guard = lock_slot(&slot)?;
            let material = &guard.material;
            if material.is_active && search.map_or(true, |s| matches_search(material, s)) {
                materials.push(material.clone());
            }
        }
        materials.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(materials)
    }

    fn update_material(&self, id: MaterialId, update: &MaterialUpdate) -> LedgerResult<Material> {
        update.validate()?;
        let slot = self.slot(id)?;
        let mut guard = active_slot(&slot, id)?;
        let mut book = self.alert_book()?;
        let now = Utc::now();

        update.apply_to(&mut guard.material);
        guard.material.updated_at = now;

        self.reevaluate(&mut book, &guard.material, now);
        committed("update_material", id);
        Ok(guard.material.clone())
    }

    fn deactivate_material(&self, id: MaterialId) -> LedgerResult<()> {
        let slot = self.slot(id)?;
        let mut guard = active_slot(&slot, id)?;
        let mut book = self.alert_book()?;
        let now = Utc::now();

        guard.material.is_active = false;
        guard.material.updated_at = now;
        self.reevaluate(&mut book, &guard.material, now);

        log::info!("Material '{}' ({}) deactivated", guard.material.name, guard.material.code);
        committed("deactivate_material", id);
        Ok(())
    }

    fn material_history(&self, id: MaterialId) -> LedgerResult<MaterialLedger> {
        let slot = self.slot(id)?;
        let guard = lock_slot(&slot)?;
        Ok(MaterialLedger {
            material: guard.material.clone(),
            history: guard.transactions.clone(),
        })
    }

    fn usage_on(&self, date: NaiveDate) -> LedgerResult<Vec<DailyUsageRecord>> {
        let mut records = Vec::new();
        for slot in self.all_slots()? {
            let guard = lock_slot(&slot)?;
            records.extend(guard.usage.iter().filter(|u| u.usage_date == date).cloned());
        }
        records.sort_by_key(|u| u.id);
        Ok(records)
    }

    fn unresolved_alerts(&self) -> LedgerResult<Vec<AlertView>> {
        // Snapshot first: alerts -> slot would invert the lock order.
        let open: Vec<StockAlert> = {
            let book = self.alert_book()?;
            book.alerts.iter().filter(|a| !a.is_resolved).cloned().collect()
        };

        let mut views = Vec::with_capacity(open.len());
        for alert in open {
            let slot = self.slot(alert.material_id)?;
            let guard = lock_slot(&slot)?;
            if !guard.material.is_active {
                continue;
            }
            views.push(AlertView {
                material_name: guard.material.name.clone(),
                material_code: guard.material.code.clone(),
                unit: guard.material.unit.clone(),
                alert,
            });
        }
        views.sort_by(|a, b| {
            b.alert
                .created_at
                .cmp(&a.alert.created_at)
                .then(b.alert.id.cmp(&a.alert.id))
        });
        Ok(views)
    }

    fn unresolved_alert_count(&self) -> LedgerResult<u64> {
        let material_ids: Vec<MaterialId> = {
            let book = self.alert_book()?;
            book.alerts
                .iter()
                .filter(|a| !a.is_resolved)
                .map(|a| a.material_id)
                .collect()
        };
        let mut count = 0;
        for id in material_ids {
            if lock_slot(&self.slot(id)?)?.material.is_active {
                count += 1;
            }
        }
        Ok(count)
    }

    fn resolve_alert(&self, id: AlertId, resolved_by: &str) -> LedgerResult<StockAlert> {
        let mut book = self.alert_book()?;
        let alert = book
            .alerts
            .iter_mut()
            .find(|a| a.id == id && !a.is_resolved)
            .ok_or_else(|| LedgerError::alert_not_found(id))?;
        let resolved_by = match resolved_by.trim() {
            "" => self.settings.default_author.as_str(),
            name => name,
        };
        resolve(alert, resolved_by, Utc::now());
        committed("resolve_alert", alert.material_id);
        Ok(alert.clone())
    }

    fn transaction_count(&self) -> LedgerResult<u64> {
        Ok(self.transaction_count.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertType;

    fn store() -> MemoryLedgerStore {
        MemoryLedgerStore::default()
    }

    fn steel(store: &MemoryLedgerStore, initial: i64) -> MaterialId {
        store
            .create_material(
                &NewMaterial::new("Steel Plates", "STL-001", "units", Decimal::from(20))
                    .with_initial_quantity(Decimal::from(initial)),
            )
            .unwrap()
    }

    #[test]
    fn test_zero_initial_quantity_writes_no_history() {
        let store = store();
        let id = steel(&store, 0);
        let ledger = store.material_history(id).unwrap();
        assert!(ledger.history.is_empty());
        assert_eq!(ledger.material.current_quantity, Decimal::ZERO);
        assert_eq!(store.transaction_count().unwrap(), 0);
    }

    #[test]
    fn test_recent_transactions_are_bounded_and_newest_first() {
        let store = MemoryLedgerStore::new(LedgerSettings {
            recent_transactions_limit: 3,
            ..LedgerSettings::default()
        });
        let id = steel(&store, 100);
        for i in 1..=5 {
            store
                .record_transaction(&TransactionRequest::new(
                    id,
                    TransactionType::ManualAdjustment,
                    Decimal::from(i),
                ))
                .unwrap();
        }
        let detail = store.get_material(id).unwrap();
        assert_eq!(detail.transactions.len(), 3);
        assert_eq!(detail.transactions[0].quantity, Decimal::from(5));
        assert_eq!(detail.transactions[2].quantity, Decimal::from(3));
    }

    #[test]
    fn test_deactivated_material_is_hidden_and_rejects_mutations() {
        let store = store();
        let id = steel(&store, 5);
        store.deactivate_material(id).unwrap();

        assert!(matches!(store.get_material(id), Err(LedgerError::NotFound(_))));
        assert!(store.list_materials(None).unwrap().is_empty());
        let err = store
            .record_transaction(&TransactionRequest::new(id, TransactionType::PurchaseIn, Decimal::ONE))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
        assert!(store.unresolved_alerts().unwrap().is_empty());
        // History survives deactivation.
        assert_eq!(store.material_history(id).unwrap().history.len(), 1);
    }

    #[test]
    fn test_code_stays_reserved_after_deactivation() {
        let store = store();
        let id = steel(&store, 0);
        store.deactivate_material(id).unwrap();
        let err = store
            .create_material(&NewMaterial::new("Other", "STL-001", "units", Decimal::ONE))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateCode(code) if code == "STL-001"));
    }

    #[test]
    fn test_update_does_not_rederive_levels() {
        let store = store();
        let id = steel(&store, 25);
        let updated = store
            .update_material(
                id,
                &MaterialUpdate {
                    min_stock_level: Some(Decimal::from(40)),
                    ..MaterialUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.min_stock_level, Decimal::from(40));
        assert_eq!(updated.reorder_level, Decimal::from(30));
        assert_eq!(updated.max_stock_level, Decimal::from(60));
        // 25 <= 40 now: the raised threshold opens a warning.
        let alerts = store.unresolved_alerts().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert.alert_type, AlertType::Warning);
    }

    #[test]
    fn test_alerts_disabled_setting() {
        let store = MemoryLedgerStore::new(LedgerSettings {
            alerts_enabled: false,
            ..LedgerSettings::default()
        });
        steel(&store, 0);
        assert!(store.unresolved_alerts().unwrap().is_empty());
    }

    #[test]
    fn test_deactivation_resolves_alerts_even_when_disabled() {
        let store = store();
        let id = steel(&store, 5);
        assert_eq!(store.unresolved_alert_count().unwrap(), 1);

        let quiet = MemoryLedgerStore {
            settings: LedgerSettings {
                alerts_enabled: false,
                ..LedgerSettings::default()
            },
            ..store
        };
        quiet.deactivate_material(id).unwrap();
        let book = quiet.alert_book().unwrap();
        assert!(book.alerts.iter().all(|a| a.is_resolved));
        assert_eq!(book.alerts[0].resolved_by.as_deref(), Some(SYSTEM_AUTHOR));
    }

    #[test]
    fn test_overflowing_delta_is_rejected_and_store_stays_usable() {
        let store = store();
        let top = crate::ledger::limits::quantity_limit() - Decimal::ONE;
        let big = store
            .create_material(
                &NewMaterial::new("Big", "BIG-1", "units", Decimal::ZERO).with_initial_quantity(top),
            )
            .unwrap();
        let other = steel(&store, 5);

        let err = store
            .record_transaction(&TransactionRequest::new(big, TransactionType::PurchaseIn, Decimal::ONE))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let err = store
            .record_transaction(&TransactionRequest::new(big, TransactionType::PurchaseIn, Decimal::MAX))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        let ledger = store.material_history(big).unwrap();
        assert_eq!(ledger.material.current_quantity, top);
        assert_eq!(ledger.history.len(), 1);

        // No lock was poisoned: both materials still accept writes.
        store
            .record_transaction(&TransactionRequest::new(big, TransactionType::WriteOff, Decimal::from(-1)))
            .unwrap();
        store
            .record_daily_usage(&UsageRequest::new(other, Decimal::ONE))
            .unwrap();
        assert_eq!(store.get_material(other).unwrap().material.current_quantity, Decimal::from(4));
        assert!(store.unresolved_alerts().is_ok());
    }

    #[test]
    fn test_usage_below_negative_limit_is_rejected() {
        let store = store();
        let id = steel(&store, 0);
        let floor = -(crate::ledger::limits::quantity_limit() - Decimal::ONE);
        store
            .record_transaction(&TransactionRequest::new(id, TransactionType::WriteOff, floor))
            .unwrap();
        let err = store
            .record_daily_usage(&UsageRequest::new(id, Decimal::ONE))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(store.get_material(id).unwrap().material.current_quantity, floor);
        assert!(store.usage_on(chrono::Utc::now().date_naive()).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_alert_twice_is_not_found() {
        let store = store();
        steel(&store, 5);
        let alert_id = store.unresolved_alerts().unwrap()[0].alert.id;
        let resolved = store.resolve_alert(alert_id, "maria").unwrap();
        assert!(resolved.is_resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("maria"));
        assert!(matches!(
            store.resolve_alert(alert_id, "maria"),
            Err(LedgerError::NotFound(_))
        ));
    }
}
