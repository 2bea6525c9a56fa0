//! Concurrent writers against one material must not lose updates.

use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use stockledger::{
    verify_ledger, LedgerStore, MemoryLedgerStore, NewMaterial, TransactionRequest,
    TransactionType, UsageRequest,
};

const WRITERS: usize = 8;
const WRITES_PER_WRITER: usize = 50;

fn random_deltas() -> Vec<i64> {
    let mut rng = rand::thread_rng();
    (0..WRITES_PER_WRITER)
        .map(|_| rng.gen_range(-20..=30))
        .collect()
}

fn setup() -> (Arc<MemoryLedgerStore>, i64) {
    let store = Arc::new(MemoryLedgerStore::default());
    let id = store
        .create_material(
            &NewMaterial::new("Electrical Wire", "EW-100", "meters", Decimal::from(50))
                .with_initial_quantity(Decimal::from(15)),
        )
        .unwrap();
    (store, id)
}

fn write_all(store: &MemoryLedgerStore, id: i64, deltas: &[i64]) {
    for delta in deltas {
        let kind = if *delta >= 0 {
            TransactionType::PurchaseIn
        } else {
            TransactionType::ManualAdjustment
        };
        store
            .record_transaction(&TransactionRequest::new(id, kind, Decimal::from(*delta)))
            .unwrap();
    }
}

#[test]
fn threads_on_one_material() {
    let (store, id) = setup();
    let batches: Vec<Vec<i64>> = (0..WRITERS).map(|_| random_deltas()).collect();
    let expected: i64 = 15 + batches.iter().flatten().sum::<i64>();

    let handles: Vec<_> = batches
        .into_iter()
        .map(|deltas| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || write_all(&store, id, &deltas))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let detail = store.get_material(id).unwrap();
    assert_eq!(detail.material.current_quantity, Decimal::from(expected));
    let reconciliation = verify_ledger(store.as_ref(), id).unwrap();
    assert!(reconciliation.is_balanced());
    assert_eq!(reconciliation.entries, 1 + WRITERS * WRITES_PER_WRITER);
}

#[test]
fn coroutines_on_one_material() {
    let (store, id) = setup();
    let batches: Vec<Vec<i64>> = (0..WRITERS).map(|_| random_deltas()).collect();
    let expected: i64 = 15 + batches.iter().flatten().sum::<i64>();

    let handles: Vec<_> = batches
        .into_iter()
        .map(|deltas| {
            let store = Arc::clone(&store);
            may::go!(move || {
                write_all(&store, id, &deltas);
                store
                    .record_daily_usage(&UsageRequest::new(id, Decimal::ONE))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let quantity = store.get_material(id).unwrap().material.current_quantity;
    assert_eq!(quantity, Decimal::from(expected - WRITERS as i64));
    assert!(verify_ledger(store.as_ref(), id).unwrap().is_balanced());
}

#[test]
fn separate_materials_do_not_interfere() {
    let store = Arc::new(MemoryLedgerStore::default());
    let ids: Vec<i64> = (0..4)
        .map(|i| {
            store
                .create_material(&NewMaterial::new(
                    format!("Material {i}"),
                    format!("MAT-{i}"),
                    "units",
                    Decimal::from(10),
                ))
                .unwrap()
        })
        .collect();

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || write_all(&store, id, &[1; 25]))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for id in ids {
        assert_eq!(
            store.get_material(id).unwrap().material.current_quantity,
            Decimal::from(25)
        );
    }
}
