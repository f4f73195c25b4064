//! End-to-end energization scenarios against the in-memory store.

use std::sync::Arc;

use proptest::prelude::*;
use sld_energize::{
    domain::{Device, DevicePatch, EnergizeField},
    graph::EdgeConvention,
    propagation::{ChangeTriggers, Propagator},
    repo::{DeviceStore, MemoryStore},
};

const F: EnergizeField = EnergizeField::Energized;

fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn panel(id: &str, energized: bool) -> Device {
    Device::new(id, "panel board").with_field(F, energized)
}

fn field_of(store: &MemoryStore, id: &str, field: EnergizeField) -> bool {
    let device = store.snapshot(id).unwrap_or_else(|| panic!("{id} missing"));
    field.get(&device)
}

/// BUS1 feeds P1..P3 through `from = bus` edges, and is itself fed by T1.
fn feeder(panels: [bool; 3]) -> Arc<MemoryStore> {
    let mut rows = vec![
        Device::new("T1", "transformer"),
        Device::new("BUS1", "Bus"),
        Device::edge("E-T1", "T1", "BUS1"),
    ];
    for (i, energized) in panels.iter().enumerate() {
        let id = format!("P{}", i + 1);
        rows.push(Device::edge(format!("E-{id}"), "BUS1", id.clone()));
        rows.push(panel(&id, *energized));
    }
    Arc::new(MemoryStore::with_devices(rows))
}

/// Bus and edge values; the only state propagation writes.
fn energization(store: &MemoryStore) -> Vec<(String, bool)> {
    ["BUS1", "E-T1", "E-P1", "E-P2", "E-P3"]
        .iter()
        .map(|id| (id.to_string(), field_of(store, id, F)))
        .collect()
}

#[tokio::test]
async fn test_mixed_panels_keep_shared_bus_energized() {
    // Drawings where edges point from the panel to the bus.
    let store = Arc::new(MemoryStore::with_devices([
        panel("A", true),
        panel("B", false),
        Device::new("X", "Bus"),
        Device::edge("A-X", "A", "X"),
        Device::edge("B-X", "B", "X"),
    ]));
    let engine = Propagator::new(store.clone(), EdgeConvention::DeviceToBus);

    engine.propagate(F, &ids(&["A"]), true).await.unwrap();
    engine.propagate(F, &ids(&["B"]), false).await.unwrap();

    assert!(field_of(&store, "X", F));
    assert!(field_of(&store, "A-X", F));
    assert!(field_of(&store, "B-X", F));
}

#[tokio::test]
async fn test_bus_follows_last_energized_panel_going_dark() {
    let store = feeder([true, false, false]);
    let engine = Propagator::new(store.clone(), EdgeConvention::BusToDevice);

    engine.propagate(F, &ids(&["P1"]), true).await.unwrap();
    assert!(field_of(&store, "BUS1", F));

    store.update("P1", &DevicePatch { energized: Some(false), ..Default::default() }).await.unwrap();
    let report = engine.propagate(F, &ids(&["P1"]), false).await.unwrap();

    assert_eq!(report.buses.len(), 1);
    assert!(!report.buses[0].value);
    assert!(!field_of(&store, "BUS1", F));
    assert!(!field_of(&store, "E-P2", F));
    // Upstream feeder edges are never rewritten by a downstream change.
    assert!(!field_of(&store, "E-T1", F));
}

#[tokio::test]
async fn test_bulk_import_matches_one_at_a_time() {
    let rows = vec![panel("P1", true), panel("P2", true), panel("P3", false)];

    let batch_store = feeder([false; 3]);
    batch_store.upsert_many(&rows).await.unwrap();
    let triggers = ChangeTriggers::new(Propagator::new(batch_store.clone(), EdgeConvention::BusToDevice));
    let summary = triggers.devices_imported(&rows).await;
    assert_eq!(summary.failures, 0);
    assert!(field_of(&batch_store, "BUS1", F));

    let serial_store = feeder([false; 3]);
    let triggers = ChangeTriggers::new(Propagator::new(serial_store.clone(), EdgeConvention::BusToDevice));
    for row in &rows {
        let patch = DevicePatch { energized: Some(row.energized), ..Default::default() };
        let updated = serial_store.update(&row.id, &patch).await.unwrap().unwrap();
        triggers.device_updated(&updated, &patch).await;
    }

    assert_eq!(energization(&batch_store), energization(&serial_store));
}

#[tokio::test]
async fn test_propagation_is_idempotent() {
    let store = feeder([true, false, true]);
    let engine = Propagator::new(store.clone(), EdgeConvention::BusToDevice);

    engine.propagate(F, &ids(&["P1", "P3"]), true).await.unwrap();
    let once = energization(&store);
    engine.propagate(F, &ids(&["P1", "P3"]), true).await.unwrap();

    assert_eq!(energization(&store), once);
}

#[tokio::test]
async fn test_comments_only_update_runs_no_propagation() {
    let store = feeder([true, false, false]);
    let triggers = ChangeTriggers::new(Propagator::new(store.clone(), EdgeConvention::BusToDevice));

    let patch = DevicePatch { comments: Some("inspected".into()), ..Default::default() };
    let updated = store.update("P1", &patch).await.unwrap().unwrap();
    let summary = triggers.device_updated(&updated, &patch).await;

    assert_eq!(summary.invocations, 0);
    assert!(!field_of(&store, "BUS1", F));
}

#[tokio::test]
async fn test_energized_today_is_independent() {
    let store = feeder([false; 3]);
    let engine = Propagator::new(store.clone(), EdgeConvention::BusToDevice);

    store
        .update("P2", &DevicePatch { energized_today: Some(true), ..Default::default() })
        .await
        .unwrap();
    engine.propagate(EnergizeField::EnergizedToday, &ids(&["P2"]), true).await.unwrap();

    assert!(field_of(&store, "BUS1", EnergizeField::EnergizedToday));
    assert!(!field_of(&store, "BUS1", F));
}

#[tokio::test]
async fn test_empty_batch_changes_nothing() {
    let store = feeder([true, true, true]);
    let before = energization(&store);
    let engine = Propagator::new(store.clone(), EdgeConvention::BusToDevice);

    let report = engine.propagate(F, &[], true).await.unwrap();

    assert_eq!(report.edges_mirrored, 0);
    assert!(report.buses.is_empty());
    assert_eq!(energization(&store), before);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_update_order_does_not_matter(
        values in proptest::array::uniform3(any::<bool>()),
        order in Just(vec![0usize, 1, 2]).prop_shuffle(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (shuffled, batched) = rt.block_on(async {
            let shuffled = feeder([false; 3]);
            let triggers = ChangeTriggers::new(Propagator::new(shuffled.clone(), EdgeConvention::BusToDevice));
            for &i in &order {
                let id = format!("P{}", i + 1);
                let patch = DevicePatch { energized: Some(values[i]), ..Default::default() };
                let updated = shuffled.update(&id, &patch).await.unwrap().unwrap();
                triggers.device_updated(&updated, &patch).await;
            }

            let batched = feeder([false; 3]);
            let rows: Vec<Device> = (0..3).map(|i| panel(&format!("P{}", i + 1), values[i])).collect();
            batched.upsert_many(&rows).await.unwrap();
            ChangeTriggers::new(Propagator::new(batched.clone(), EdgeConvention::BusToDevice))
                .devices_imported(&rows)
                .await;

            (energization(&shuffled), energization(&batched))
        });

        prop_assert_eq!(&shuffled, &batched);
        prop_assert_eq!(shuffled[0].1, values.iter().any(|v| *v));
    }
}
