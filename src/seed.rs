//! Sample catalog for empty stores.

use crate::error::LedgerResult;
use crate::ledger::{LedgerStore, NewMaterial};
use crate::model::MaterialId;
use rust_decimal::Decimal;

fn sample_materials() -> Vec<NewMaterial> {
    vec![
        NewMaterial::new("Steel Plates", "STL-001", "units", Decimal::from(20))
            .with_initial_quantity(Decimal::from(5))
            .with_cost(Decimal::new(4550, 2))
            .with_supplier("General Supplies Inc.")
            .with_category("Raw Material")
            .with_description("Raw materials for construction"),
        NewMaterial::new("Electrical Wire", "EW-100", "meters", Decimal::from(50))
            .with_initial_quantity(Decimal::from(15))
            .with_cost(Decimal::new(230, 2))
            .with_supplier("Electrical Components Ltd.")
            .with_category("Electrical")
            .with_description("Copper electrical wiring"),
        NewMaterial::new("PVC Pipes", "PVC-50", "units", Decimal::from(10))
            .with_initial_quantity(Decimal::ZERO)
            .with_cost(Decimal::new(875, 2))
            .with_supplier("General Supplies Inc.")
            .with_category("Raw Material")
            .with_description("Plastic piping for construction"),
        NewMaterial::new("Bolts", "BLT-10", "units", Decimal::from(50))
            .with_initial_quantity(Decimal::from(45))
            .with_cost(Decimal::new(25, 2))
            .with_supplier("General Supplies Inc.")
            .with_category("Mechanical")
            .with_description("Assorted bolts and nuts"),
    ]
}

/// Load the four-item sample catalog if `store` has no active materials.
///
/// Goes through `create_material`, so every initial quantity is backed by a
/// `PURCHASE_IN` entry. Returns the ids created (empty when skipped).
pub fn seed_sample_materials<S: LedgerStore + ?Sized>(store: &S) -> LedgerResult<Vec<MaterialId>> {
    if !store.list_materials(None)?.is_empty() {
        log::debug!("Store already has materials, skipping sample data");
        return Ok(Vec::new());
    }

    let ids = sample_materials()
        .iter()
        .map(|material| store.create_material(material))
        .collect::<LedgerResult<Vec<_>>>()?;
    log::info!("Seeded {} sample materials", ids.len());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::AggregationService;
    use crate::ledger::{verify_ledger, MemoryLedgerStore};

    #[test]
    fn test_seed_is_balanced_and_runs_once() {
        let store = MemoryLedgerStore::default();
        let ids = seed_sample_materials(&store).unwrap();
        assert_eq!(ids.len(), 4);
        for id in &ids {
            assert!(verify_ledger(&store, *id).unwrap().is_balanced());
        }

        assert!(seed_sample_materials(&store).unwrap().is_empty());
        assert_eq!(store.list_materials(None).unwrap().len(), 4);
    }

    #[test]
    fn test_seeded_dashboard() {
        let store = MemoryLedgerStore::default();
        seed_sample_materials(&store).unwrap();
        let stats = AggregationService::new(&store).dashboard_stats().unwrap();
        assert_eq!(stats.in_stock, 0);
        assert_eq!(stats.low_stock, 3);
        assert_eq!(stats.out_of_stock, 1);
        assert_eq!(stats.active_alerts, 4);
        assert_eq!(stats.total_transactions, 3);
    }
}
