//! PostgreSQL ledger backend.
//!
//! Each mutation runs in its own transaction on a pooled connection. The
//! quantity change reads the material with `SELECT ... FOR UPDATE`, checks
//! the new balance against the column range and writes it back. The row
//! lock is held until commit, so concurrent writers to the same material
//! queue behind each other and no update is lost.

use super::alerts;
use super::limits::next_balance;
use super::{
    committed, initial_stock_reference, usage_reference, LedgerStore, MaterialLedger,
    MaterialUpdate, NewMaterial, TransactionRequest, UsageRequest, INITIAL_STOCK_NOTE,
    SYSTEM_AUTHOR,
};
use crate::config::{LedgerSettings, StockLedgerConfig};
use crate::error::{LedgerError, LedgerResult};
use crate::executor::{DbError, SqlExecutor};
use crate::model::alert::ALERT_COLUMNS;
use crate::model::material::MATERIAL_COLUMNS;
use crate::model::transaction::TRANSACTION_COLUMNS;
use crate::model::usage::USAGE_COLUMNS;
use crate::model::{
    column, AlertId, AlertType, AlertView, DailyUsageRecord, Material, MaterialDetail,
    MaterialId, StockAlert, StockTransaction, TransactionId, TransactionType, UsageId,
};
use crate::pool::ConnectionPool;
use crate::transaction::{IsolationLevel, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Ledger stored in PostgreSQL
pub struct PgLedgerStore {
    pool: ConnectionPool,
    settings: LedgerSettings,
}

impl PgLedgerStore {
    pub fn new(pool: ConnectionPool, settings: LedgerSettings) -> Self {
        Self { pool, settings }
    }

    /// Open the pool described by `config` and ensure the schema exists.
    pub fn connect(config: &StockLedgerConfig) -> LedgerResult<Self> {
        let pool = ConnectionPool::connect(&config.database)?;
        let store = Self::new(pool, config.ledger.clone());
        store.apply_schema()?;
        Ok(store)
    }

    /// Create the ledger tables and indexes if they are missing.
    pub fn apply_schema(&self) -> LedgerResult<()> {
        let client = self.pool.acquire()?;
        crate::schema::apply_schema(&client)?;
        Ok(())
    }

    /// `SELECT 1` on a pooled connection
    pub fn check_health(&self) -> LedgerResult<bool> {
        let client = self.pool.acquire()?;
        Ok(crate::connection::check_connection_health(&client)?)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Run `body` in a transaction: commit on `Ok`, roll back on `Err`.
    fn with_transaction<T>(
        &self,
        operation: &'static str,
        material_id: Option<MaterialId>,
        body: impl FnOnce(&Transaction) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::ledger_operation_span(operation, material_id).entered();
        #[cfg(not(feature = "tracing"))]
        let _ = material_id;

        let client = self.pool.acquire()?;
        let txn = Transaction::new((*client).clone())?;
        match body(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    log::warn!("Rollback after failed {} failed: {}", operation, rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Apply the alert policy to `material` inside `txn`. With alerts
    /// disabled only deactivation still resolves the open alert.
    fn reevaluate(&self, txn: &Transaction, material: &Material) -> LedgerResult<()> {
        if !self.settings.alerts_enabled && material.is_active {
            return Ok(());
        }

        let open = txn
            .query_opt(
                "SELECT alert_type FROM stock_alerts \
                 WHERE material_id = $1 AND NOT is_resolved \
                 ORDER BY id DESC LIMIT 1",
                &[&material.id],
            )?
            .map(|row| {
                let kind: String = column(&row, "alert_type")?;
                kind.parse::<AlertType>().map_err(DbError::ParseError)
            })
            .transpose()?;

        let action = alerts::evaluate(material, open);
        if action.resolves_open() {
            txn.execute(
                "UPDATE stock_alerts SET is_resolved = TRUE, resolved_by = $2, resolved_at = NOW() \
                 WHERE material_id = $1 AND NOT is_resolved",
                &[&material.id, &SYSTEM_AUTHOR],
            )?;
        }
        if let Some(draft) = action.raised() {
            let alert_type = draft.alert_type.as_str();
            txn.execute(
                "INSERT INTO stock_alerts (material_id, alert_type, current_quantity, \
                 threshold_quantity, alert_message, is_resolved, created_at) \
                 VALUES ($1, $2, $3, $4, $5, FALSE, NOW())",
                &[
                    &material.id,
                    &alert_type,
                    &draft.current_quantity,
                    &draft.threshold_quantity,
                    &draft.alert_message,
                ],
            )?;
            alerts::announce(material, draft);
        }
        Ok(())
    }

    /// Add `delta` to an active material's quantity, locking its row.
    fn apply_delta(
        &self,
        txn: &Transaction,
        material_id: MaterialId,
        delta: Decimal,
    ) -> LedgerResult<Material> {
        let row = txn
            .query_opt(
                "SELECT current_quantity FROM materials WHERE id = $1 AND is_active FOR UPDATE",
                &[&material_id],
            )?
            .ok_or_else(|| LedgerError::material_not_found(material_id))?;
        let current: Decimal = column(&row, "current_quantity")?;
        let balance = next_balance(current, delta)?;

        let sql = format!(
            "UPDATE materials SET current_quantity = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {MATERIAL_COLUMNS}"
        );
        let row = txn.query_one(&sql, &[&material_id, &balance])?;
        Ok(Material::from_row(&row)?)
    }

    #[allow(clippy::too_many_arguments)]
    fn append_entry(
        &self,
        txn: &Transaction,
        material_id: MaterialId,
        transaction_type: TransactionType,
        quantity: Decimal,
        balance_after: Decimal,
        reference_number: &Option<String>,
        project_code: &Option<String>,
        department: &Option<String>,
        notes: &Option<String>,
        created_by: &str,
    ) -> LedgerResult<TransactionId> {
        let kind = transaction_type.as_str();
        let row = txn.query_one(
            "INSERT INTO stock_transactions (material_id, transaction_type, quantity, \
             balance_after_transaction, reference_number, project_code, department, notes, \
             created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW()) RETURNING id",
            &[
                &material_id,
                &kind,
                &quantity,
                &balance_after,
                reference_number,
                project_code,
                department,
                notes,
                &created_by,
            ],
        )?;
        Ok(column(&row, "id")?)
    }
}

impl LedgerStore for PgLedgerStore {
    fn create_material(&self, new: &NewMaterial) -> LedgerResult<MaterialId> {
        let draft = new.validate()?;

        let material = self.with_transaction("create_material", None, |txn| {
            let sql = format!(
                "INSERT INTO materials (code, name, description, category, supplier, unit, \
                 current_quantity, min_stock_level, reorder_level, max_stock_level, current_cost, \
                 is_active, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, TRUE, NOW(), NOW()) \
                 ON CONFLICT (code) DO NOTHING RETURNING {MATERIAL_COLUMNS}"
            );
            let row = txn
                .query_opt(
                    &sql,
                    &[
                        &draft.code,
                        &draft.name,
                        &draft.description,
                        &draft.category,
                        &draft.supplier,
                        &draft.unit,
                        &draft.initial_quantity,
                        &draft.min_stock_level,
                        &draft.reorder_level,
                        &draft.max_stock_level,
                        &draft.current_cost,
                    ],
                )?
                .ok_or_else(|| LedgerError::DuplicateCode(draft.code.clone()))?;
            let material = Material::from_row(&row)?;
            #[cfg(feature = "tracing")]
            tracing::Span::current().record("material_id", material.id);

            if draft.initial_quantity > Decimal::ZERO {
                self.append_entry(
                    txn,
                    material.id,
                    TransactionType::PurchaseIn,
                    draft.initial_quantity,
                    draft.initial_quantity,
                    &Some(initial_stock_reference(&draft.code)),
                    &None,
                    &None,
                    &Some(INITIAL_STOCK_NOTE.to_string()),
                    SYSTEM_AUTHOR,
                )?;
            }
            self.reevaluate(txn, &material)?;
            Ok(material)
        })?;

        log::info!(
            "Material '{}' ({}) created with id {}",
            material.name,
            material.code,
            material.id
        );
        committed("create_material", material.id);
        Ok(material.id)
    }

    fn record_transaction(&self, request: &TransactionRequest) -> LedgerResult<TransactionId> {
        request.validate()?;
        let material_id = request.material_id;
        let id = self.with_transaction("record_transaction", Some(material_id), |txn| {
            let material = self.apply_delta(txn, material_id, request.quantity)?;
            let id = self.append_entry(
                txn,
                material_id,
                request.transaction_type,
                request.quantity,
                material.current_quantity,
                &request.reference_number,
                &request.project_code,
                &request.department,
                &request.notes,
                request.author_or(&self.settings.default_author),
            )?;
            self.reevaluate(txn, &material)?;
            Ok(id)
        })?;
        committed("record_transaction", material_id);
        Ok(id)
    }

    fn record_daily_usage(&self, request: &UsageRequest) -> LedgerResult<UsageId> {
        request.validate()?;
        let material_id = request.material_id;
        let recorded_by = request.recorder_or(&self.settings.default_author);
        let usage_date = request.date_or_today();

        let usage_id = self.with_transaction("record_daily_usage", Some(material_id), |txn| {
            let material = self.apply_delta(txn, material_id, -request.quantity_used)?;
            let transaction_id = self.append_entry(
                txn,
                material_id,
                TransactionType::DailyUsage,
                -request.quantity_used,
                material.current_quantity,
                &Some(usage_reference()),
                &request.project_code,
                &request.department,
                &request.notes,
                recorded_by,
            )?;
            let row = txn.query_one(
                "INSERT INTO daily_usage (material_id, transaction_id, usage_date, quantity_used, \
                 project_code, department, recorded_by, notes, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW()) RETURNING id",
                &[
                    &material_id,
                    &transaction_id,
                    &usage_date,
                    &request.quantity_used,
                    &request.project_code,
                    &request.department,
                    &recorded_by,
                    &request.notes,
                ],
            )?;
            let usage_id: UsageId = column(&row, "id")?;
            self.reevaluate(txn, &material)?;
            Ok(usage_id)
        })?;
        committed("record_daily_usage", material_id);
        Ok(usage_id)
    }

    fn get_material(&self, id: MaterialId) -> LedgerResult<MaterialDetail> {
        let client = self.pool.acquire()?;
        let sql = format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1 AND is_active");
        let row = client
            .query_opt(&sql, &[&id])?
            .ok_or_else(|| LedgerError::material_not_found(id))?;
        let material = Material::from_row(&row)?;

        let limit = i64::try_from(self.settings.recent_transactions_limit).unwrap_or(i64::MAX);
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions WHERE material_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2"
        );
        let transactions = client
            .query_all(&sql, &[&id, &limit])?
            .iter()
            .map(StockTransaction::from_row)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(MaterialDetail {
            material,
            transactions,
        })
    }

    fn list_materials(&self, search: Option<&str>) -> LedgerResult<Vec<Material>> {
        let client = self.pool.acquire()?;
        let needle = search.map(str::trim).filter(|s| !s.is_empty());
        let rows = match needle {
            Some(needle) => {
                let sql = format!(
                    "SELECT {MATERIAL_COLUMNS} FROM materials WHERE is_active \
                     AND (strpos(lower(name), lower($1)) > 0 OR strpos(lower(code), lower($1)) > 0) \
                     ORDER BY name, id"
                );
                client.query_all(&sql, &[&needle])?
            }
            None => {
                let sql = format!(
                    "SELECT {MATERIAL_COLUMNS} FROM materials WHERE is_active ORDER BY name, id"
                );
                client.query_all(&sql, &[])?
            }
        };
        Ok(rows
            .iter()
            .map(Material::from_row)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    fn update_material(&self, id: MaterialId, update: &MaterialUpdate) -> LedgerResult<Material> {
        update.validate()?;
        let name = update.name.as_deref().map(str::trim);
        let unit = update.unit.as_deref().map(str::trim);

        let material = self.with_transaction("update_material", Some(id), |txn| {
            let sql = format!(
                "UPDATE materials SET name = COALESCE($2, name), \
                 description = COALESCE($3, description), category = COALESCE($4, category), \
                 supplier = COALESCE($5, supplier), unit = COALESCE($6, unit), \
                 min_stock_level = COALESCE($7, min_stock_level), \
                 current_cost = COALESCE($8, current_cost), updated_at = NOW() \
                 WHERE id = $1 AND is_active RETURNING {MATERIAL_COLUMNS}"
            );
            let row = txn
                .query_opt(
                    &sql,
                    &[
                        &id,
                        &name,
                        &update.description,
                        &update.category,
                        &update.supplier,
                        &unit,
                        &update.min_stock_level,
                        &update.current_cost,
                    ],
                )?
                .ok_or_else(|| LedgerError::material_not_found(id))?;
            let material = Material::from_row(&row)?;
            self.reevaluate(txn, &material)?;
            Ok(material)
        })?;
        committed("update_material", id);
        Ok(material)
    }

    fn deactivate_material(&self, id: MaterialId) -> LedgerResult<()> {
        let material = self.with_transaction("deactivate_material", Some(id), |txn| {
            let sql = format!(
                "UPDATE materials SET is_active = FALSE, updated_at = NOW() \
                 WHERE id = $1 AND is_active RETURNING {MATERIAL_COLUMNS}"
            );
            let row = txn
                .query_opt(&sql, &[&id])?
                .ok_or_else(|| LedgerError::material_not_found(id))?;
            let material = Material::from_row(&row)?;
            self.reevaluate(txn, &material)?;
            Ok(material)
        })?;
        log::info!("Material '{}' ({}) deactivated", material.name, material.code);
        committed("deactivate_material", id);
        Ok(())
    }

    fn material_history(&self, id: MaterialId) -> LedgerResult<MaterialLedger> {
        let client = self.pool.acquire()?;
        // One snapshot for both reads so a concurrent write cannot split them.
        let txn = Transaction::new_with_isolation((*client).clone(), IsolationLevel::RepeatableRead)?;

        let sql = format!("SELECT {MATERIAL_COLUMNS} FROM materials WHERE id = $1");
        let row = txn
            .query_opt(&sql, &[&id])?
            .ok_or_else(|| LedgerError::material_not_found(id))?;
        let material = Material::from_row(&row)?;

        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM stock_transactions WHERE material_id = $1 \
             ORDER BY id"
        );
        let history = txn
            .query_all(&sql, &[&id])?
            .iter()
            .map(StockTransaction::from_row)
            .collect::<Result<Vec<_>, DbError>>()?;
        txn.commit()?;

        Ok(MaterialLedger { material, history })
    }

    fn usage_on(&self, date: NaiveDate) -> LedgerResult<Vec<DailyUsageRecord>> {
        let client = self.pool.acquire()?;
        let sql = format!("SELECT {USAGE_COLUMNS} FROM daily_usage WHERE usage_date = $1 ORDER BY id");
        Ok(client
            .query_all(&sql, &[&date])?
            .iter()
            .map(DailyUsageRecord::from_row)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    fn unresolved_alerts(&self) -> LedgerResult<Vec<AlertView>> {
        let client = self.pool.acquire()?;
        let rows = client.query_all(
            "SELECT a.id, a.material_id, a.alert_type, a.current_quantity, a.threshold_quantity, \
             a.alert_message, a.is_resolved, a.resolved_by, a.resolved_at, a.created_at, \
             m.name AS material_name, m.code AS material_code, m.unit \
             FROM stock_alerts a JOIN materials m ON m.id = a.material_id \
             WHERE NOT a.is_resolved AND m.is_active \
             ORDER BY a.created_at DESC, a.id DESC",
            &[],
        )?;
        Ok(rows
            .iter()
            .map(AlertView::from_row)
            .collect::<Result<Vec<_>, DbError>>()?)
    }

    fn unresolved_alert_count(&self) -> LedgerResult<u64> {
        let client = self.pool.acquire()?;
        let row = client.query_one(
            "SELECT COUNT(*) AS total FROM stock_alerts a JOIN materials m ON m.id = a.material_id \
             WHERE NOT a.is_resolved AND m.is_active",
            &[],
        )?;
        let total: i64 = column(&row, "total")?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    fn resolve_alert(&self, id: AlertId, resolved_by: &str) -> LedgerResult<StockAlert> {
        let resolved_by = match resolved_by.trim() {
            "" => self.settings.default_author.as_str(),
            name => name,
        };
        let client = self.pool.acquire()?;
        let sql = format!(
            "UPDATE stock_alerts SET is_resolved = TRUE, resolved_by = $2, resolved_at = NOW() \
             WHERE id = $1 AND NOT is_resolved RETURNING {ALERT_COLUMNS}"
        );
        let row = client
            .query_opt(&sql, &[&id, &resolved_by])?
            .ok_or_else(|| LedgerError::alert_not_found(id))?;
        let alert = StockAlert::from_row(&row)?;
        committed("resolve_alert", alert.material_id);
        Ok(alert)
    }

    fn transaction_count(&self) -> LedgerResult<u64> {
        let client = self.pool.acquire()?;
        let row = client.query_one("SELECT COUNT(*) AS total FROM stock_transactions", &[])?;
        let total: i64 = column(&row, "total")?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}
