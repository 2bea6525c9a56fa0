//! Read-only views over a [`LedgerStore`]: dashboard counts, open alerts
//! and status-filtered search.

pub mod status;

pub use status::{classify_quantity, classify_stock, StockStatus};

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{matches_search, LedgerStore};
use crate::model::{AlertView, Material, MaterialId};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Dashboard counters for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_materials: usize,
    /// `HEALTHY` materials
    pub in_stock: usize,
    /// `LOW` materials
    pub low_stock: usize,
    /// `CRITICAL` materials
    pub out_of_stock: usize,
    pub active_alerts: usize,
    /// Sum of `quantity_used` over usage records dated the reporting day
    pub today_usage: Decimal,
    pub total_transactions: u64,
    /// Stock value of active materials, negative balances counted as zero
    pub total_value: Decimal,
}

/// Filter for [`AggregationService::search_materials`]
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialFilter {
    /// Case-insensitive substring of name or code
    pub query: Option<String>,
    /// Exact category
    pub category: Option<String>,
    /// Exact supplier
    pub supplier: Option<String>,
    pub status: Option<StockStatus>,
}

impl MaterialFilter {
    pub fn matches(&self, material: &Material) -> bool {
        self.query
            .as_deref()
            .map_or(true, |q| matches_search(material, q))
            && self.category.as_deref().map_or(true, |c| material.category == c)
            && self.supplier.as_deref().map_or(true, |s| material.supplier == s)
            && self.status.map_or(true, |s| classify_stock(material) == s)
    }
}

pub struct AggregationService<'a, S: LedgerStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: LedgerStore + ?Sized> AggregationService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Stats with "today" taken as the current UTC date.
    pub fn dashboard_stats(&self) -> LedgerResult<DashboardStats> {
        self.dashboard_stats_on(Utc::now().date_naive())
    }

    pub fn dashboard_stats_on(&self, day: NaiveDate) -> LedgerResult<DashboardStats> {
        let materials = self.store.list_materials(None)?;

        let mut stats = DashboardStats {
            total_materials: materials.len(),
            ..DashboardStats::default()
        };
        for material in &materials {
            match classify_stock(material) {
                StockStatus::Healthy => stats.in_stock += 1,
                StockStatus::Low => stats.low_stock += 1,
                StockStatus::Critical => stats.out_of_stock += 1,
            }
            stats.total_value = material
                .stock_value()
                .and_then(|value| stats.total_value.checked_add(value))
                .ok_or_else(|| out_of_range("total_value"))?;
        }

        stats.active_alerts = usize::try_from(self.store.unresolved_alert_count()?)
            .map_err(|_| out_of_range("active_alerts"))?;
        stats.today_usage = self
            .store
            .usage_on(day)?
            .iter()
            .try_fold(Decimal::ZERO, |sum, usage| sum.checked_add(usage.quantity_used))
            .ok_or_else(|| out_of_range("today_usage"))?;
        stats.total_transactions = self.store.transaction_count()?;

        log::debug!(
            "Dashboard for {}: {} materials, {} low, {} out, {} alerts",
            day,
            stats.total_materials,
            stats.low_stock,
            stats.out_of_stock,
            stats.active_alerts
        );
        Ok(stats)
    }

    /// Unresolved alerts with material name, code and unit, newest first
    pub fn list_alerts(&self) -> LedgerResult<Vec<AlertView>> {
        self.store.unresolved_alerts()
    }

    pub fn classify_stock(&self, material: &Material) -> StockStatus {
        classify_stock(material)
    }

    pub fn search_materials(&self, filter: &MaterialFilter) -> LedgerResult<Vec<Material>> {
        let mut materials = self.store.list_materials(filter.query.as_deref())?;
        materials.retain(|material| filter.matches(material));
        Ok(materials)
    }

    pub fn status_of(&self, id: MaterialId) -> LedgerResult<StockStatus> {
        let detail = self.store.get_material(id)?;
        Ok(classify_stock(&detail.material))
    }
}

fn out_of_range(field: &str) -> LedgerError {
    LedgerError::Validation(format!("{field} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryLedgerStore, NewMaterial, TransactionRequest, UsageRequest};
    use crate::model::TransactionType;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn stocked_store() -> MemoryLedgerStore {
        let store = MemoryLedgerStore::default();
        for (name, code, qty, min, cost) in [
            ("Steel Plates", "STL-001", 5, 20, Decimal::new(4550, 2)),
            ("Electrical Wire", "EW-100", 80, 50, Decimal::new(230, 2)),
            ("PVC Pipes", "PVC-50", 0, 10, Decimal::new(875, 2)),
        ] {
            store
                .create_material(
                    &NewMaterial::new(name, code, "units", d(min))
                        .with_initial_quantity(d(qty))
                        .with_cost(cost),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_dashboard_partitions_materials() {
        let store = stocked_store();
        let service = AggregationService::new(&store);
        let stats = service.dashboard_stats().unwrap();

        assert_eq!(stats.total_materials, 3);
        assert_eq!(stats.in_stock, 1);
        assert_eq!(stats.low_stock, 1);
        assert_eq!(stats.out_of_stock, 1);
        assert_eq!(stats.active_alerts, 2);
        assert_eq!(stats.today_usage, Decimal::ZERO);
        // Initial stock of STL-001 and EW-100; PVC-50 started empty.
        assert_eq!(stats.total_transactions, 2);
        // 5 * 45.50 + 80 * 2.30
        assert_eq!(stats.total_value, Decimal::new(41150, 2));
    }

    #[test]
    fn test_largest_storable_values_fit_the_dashboard() {
        let store = MemoryLedgerStore::default();
        let quantity = crate::ledger::limits::quantity_limit() - Decimal::new(1, 3);
        let cost = crate::ledger::limits::cost_limit() - Decimal::new(1, 2);
        for i in 0..3 {
            store
                .create_material(
                    &NewMaterial::new(format!("Bulk {i}"), format!("BULK-{i}"), "kg", d(0))
                        .with_initial_quantity(quantity)
                        .with_cost(cost),
                )
                .unwrap();
        }
        let stats = AggregationService::new(&store).dashboard_stats().unwrap();
        assert_eq!(stats.total_value, quantity * cost * d(3));
    }

    #[test]
    fn test_alert_count_skips_deactivated_materials() {
        let store = stocked_store();
        let service = AggregationService::new(&store);
        let steel = store.list_materials(Some("STL-001")).unwrap()[0].id;
        assert_eq!(store.unresolved_alert_count().unwrap(), 2);

        store.deactivate_material(steel).unwrap();
        let stats = service.dashboard_stats().unwrap();
        assert_eq!(stats.active_alerts, 1);
        assert_eq!(stats.active_alerts, service.list_alerts().unwrap().len());
    }

    #[test]
    fn test_today_usage_only_counts_the_reporting_day() {
        let store = stocked_store();
        let wire = store.list_materials(Some("EW-100")).unwrap()[0].id;
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let other = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        store
            .record_daily_usage(&UsageRequest::new(wire, d(4)).on(day))
            .unwrap();
        store
            .record_daily_usage(&UsageRequest::new(wire, Decimal::new(25, 1)).on(day))
            .unwrap();
        store
            .record_daily_usage(&UsageRequest::new(wire, d(7)).on(other))
            .unwrap();

        let stats = AggregationService::new(&store).dashboard_stats_on(day).unwrap();
        assert_eq!(stats.today_usage, Decimal::new(65, 1));
    }

    #[test]
    fn test_search_by_status_and_category() {
        let store = stocked_store();
        let service = AggregationService::new(&store);

        let critical = service
            .search_materials(&MaterialFilter {
                status: Some(StockStatus::Critical),
                ..MaterialFilter::default()
            })
            .unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].code, "PVC-50");

        let none = service
            .search_materials(&MaterialFilter {
                query: Some("steel".to_string()),
                category: Some("Electrical".to_string()),
                ..MaterialFilter::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_status_of_follows_transactions() {
        let store = stocked_store();
        let service = AggregationService::new(&store);
        let steel = store.list_materials(Some("stl")).unwrap()[0].id;
        assert_eq!(service.status_of(steel).unwrap(), StockStatus::Low);

        store
            .record_transaction(&TransactionRequest::new(
                steel,
                TransactionType::PurchaseIn,
                d(100),
            ))
            .unwrap();
        assert_eq!(service.status_of(steel).unwrap(), StockStatus::Healthy);
        assert!(service.list_alerts().unwrap().iter().all(|a| a.alert.material_id != steel));
    }
}
