use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{EnergizeField, Subject};
use crate::graph::{Direction, EdgeConvention, Graph};
use crate::repo::{GraphStore, StoreError};

/// Engine step at which a store call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    EdgeMirroring,
    AggregatorDiscovery,
    AffectedBusDiscovery,
    DownstreamDiscovery,
    Aggregation,
    BusWrite,
    ConnectionMirroring,
}

#[derive(Debug, Error)]
pub enum PropagationError {
    #[error("propagating {field} failed during {stage}: {source}")]
    Store {
        field: EnergizeField,
        stage: Stage,
        #[source]
        source: StoreError,
    },
}

impl PropagationError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Store { stage, .. } => *stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusOutcome {
    pub bus_id: String,
    pub value: bool,
    pub downstream: usize,
    pub edges_written: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    pub edges_mirrored: u64,
    pub buses: Vec<BusOutcome>,
}

/// Recomputes one boolean field across the edges and buses touched by a
/// batch of changed devices.
///
/// Runs are stateless: every bus value is re-derived from its complete
/// downstream set as currently stored, so repeated or reordered runs settle
/// on the same rows. Writes are individual store statements; a failure stops
/// the run and leaves earlier writes in place.
#[derive(Clone)]
pub struct Propagator {
    store: Arc<dyn GraphStore>,
    convention: EdgeConvention,
}

impl Propagator {
    pub fn new(store: Arc<dyn GraphStore>, convention: EdgeConvention) -> Self {
        Self { store, convention }
    }

    pub async fn propagate(
        &self,
        field: EnergizeField,
        changed: &[String],
        value: bool,
    ) -> Result<PropagationReport, PropagationError> {
        let mut report = PropagationReport::default();
        if changed.is_empty() {
            return Ok(report);
        }

        let graph = Graph::new(self.store.as_ref(), self.convention);
        let at = |stage: Stage| move |source: StoreError| PropagationError::Store { field, stage, source };

        report.edges_mirrored = graph
            .set_edges_into(changed, field, value)
            .await
            .map_err(at(Stage::EdgeMirroring))?;
        debug!(%field, value, changed = changed.len(), edges = report.edges_mirrored, "mirrored edges into changed devices");

        let buses = graph
            .nodes_tagged(&[Subject::Bus])
            .await
            .map_err(at(Stage::AggregatorDiscovery))?;
        if buses.is_empty() {
            debug!(%field, "no buses in diagram");
            return Ok(report);
        }

        let affected = graph
            .connected_among(changed, &buses)
            .await
            .map_err(at(Stage::AffectedBusDiscovery))?;
        debug!(%field, affected = affected.len(), "buses adjacent to changed devices");

        for bus_id in &affected {
            let downstream = graph
                .neighbors(bus_id, Direction::Downstream)
                .await
                .map_err(at(Stage::DownstreamDiscovery))?;
            if downstream.is_empty() {
                debug!(%field, bus_id = %bus_id, "bus has no downstream devices, skipped");
                continue;
            }

            let bus_value = graph
                .any_set(&downstream, field)
                .await
                .map_err(at(Stage::Aggregation))?;

            graph
                .set_nodes(Subject::Bus, std::slice::from_ref(bus_id), field, bus_value)
                .await
                .map_err(at(Stage::BusWrite))?;

            let edges_written = graph
                .set_connection_edges(bus_id, &downstream, field, bus_value)
                .await
                .map_err(at(Stage::ConnectionMirroring))?;

            info!(
                %field,
                bus_id = %bus_id,
                value = bus_value,
                downstream = downstream.len(),
                edges = edges_written,
                "bus re-aggregated"
            );
            report.buses.push(BusOutcome {
                bus_id: bus_id.clone(),
                value: bus_value,
                downstream: downstream.len(),
                edges_written,
            });
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Device;
    use crate::repo::{MemoryStore, MockGraphStore};

    const F: EnergizeField = EnergizeField::Energized;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn engine(store: Arc<MemoryStore>) -> Propagator {
        Propagator::new(store, EdgeConvention::BusToDevice)
    }

    #[tokio::test]
    async fn test_empty_batch_touches_no_store() {
        // A mock with no expectations panics on any call.
        let store = Arc::new(MockGraphStore::new());
        let engine = Propagator::new(store, EdgeConvention::BusToDevice);

        let report = engine.propagate(F, &[], true).await.unwrap();
        assert_eq!(report, PropagationReport::default());
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_stages() {
        let mut store = MockGraphStore::new();
        store.expect_update_edge_field().times(1).returning(|_, _, _| Ok(2));
        store
            .expect_find_ids()
            .times(1)
            .returning(|_| Err(StoreError::Backend("connection reset".into())));
        store.expect_find_edge_endpoints().times(0);
        store.expect_update_field().times(0);

        let engine = Propagator::new(Arc::new(store), EdgeConvention::BusToDevice);
        let err = engine.propagate(F, &ids(&["P1"]), true).await.unwrap_err();
        assert_eq!(err.stage(), Stage::AggregatorDiscovery);
        assert!(err.to_string().contains("energized"));
    }

    #[tokio::test]
    async fn test_partial_writes_are_kept_on_failure() {
        let mut store = MockGraphStore::new();
        store.expect_update_edge_field().times(1).returning(|_, _, _| Ok(1));
        store.expect_find_ids().returning(|_| Ok(vec!["BUS1".to_string()]));
        store.expect_find_edge_endpoints().returning(|_, _| Ok(vec!["BUS1".to_string()]));
        store
            .expect_count_where_true()
            .returning(|_, _| Err(StoreError::Backend("timeout".into())));
        store.expect_update_field().times(0);

        let engine = Propagator::new(Arc::new(store), EdgeConvention::BusToDevice);
        let err = engine.propagate(F, &ids(&["P1"]), false).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Aggregation);
    }

    #[tokio::test]
    async fn test_without_buses_only_edges_change() {
        let store = Arc::new(MemoryStore::with_devices([
            Device::new("T1", "transformer"),
            Device::new("P1", "panel board"),
            Device::edge("E1", "T1", "P1"),
        ]));
        let report = engine(store.clone()).propagate(F, &ids(&["P1"]), true).await.unwrap();

        assert_eq!(report.edges_mirrored, 1);
        assert!(report.buses.is_empty());
        assert!(store.snapshot("E1").unwrap().energized);
        assert!(!store.snapshot("T1").unwrap().energized);
    }

    #[tokio::test]
    async fn test_bus_without_downstream_is_not_written() {
        // BUS1 is only reachable upstream of P1 under the reversed drawing.
        let store = Arc::new(MemoryStore::with_devices([
            Device::new("BUS1", "Bus").with_field(F, true),
            Device::new("P1", "panel board"),
            Device::edge("E1", "P1", "BUS1"),
        ]));
        let before = store.snapshot("BUS1").unwrap();

        let report = engine(store.clone()).propagate(F, &ids(&["P1"]), false).await.unwrap();

        assert!(report.buses.is_empty());
        assert_eq!(store.snapshot("BUS1").unwrap(), before);
    }

    #[tokio::test]
    async fn test_bus_takes_or_of_full_downstream_set() {
        let store = Arc::new(MemoryStore::with_devices([
            Device::new("BUS1", "Bus"),
            Device::new("P1", "panel board").with_field(F, true),
            Device::new("P2", "panel board"),
            Device::edge("E1", "BUS1", "P1"),
            Device::edge("E2", "BUS1", "P2"),
        ]));

        // Only P2 is in the batch, but P1 keeps the bus energized.
        let report = engine(store.clone()).propagate(F, &ids(&["P2"]), false).await.unwrap();

        assert_eq!(report.buses.len(), 1);
        assert!(report.buses[0].value);
        assert_eq!(report.buses[0].downstream, 2);
        assert!(store.snapshot("BUS1").unwrap().energized);
        assert!(store.snapshot("E1").unwrap().energized);
        assert!(store.snapshot("E2").unwrap().energized);
    }

    #[tokio::test]
    async fn test_other_field_untouched() {
        let store = Arc::new(MemoryStore::with_devices([
            Device::new("BUS1", "Bus"),
            Device::new("P1", "panel board").with_field(F, true),
            Device::edge("E1", "BUS1", "P1"),
        ]));
        engine(store.clone()).propagate(F, &ids(&["P1"]), true).await.unwrap();

        let bus = store.snapshot("BUS1").unwrap();
        assert!(bus.energized);
        assert!(!bus.energized_today);
    }

    #[tokio::test]
    async fn test_feeder_edge_keeps_its_value() {
        let store = Arc::new(MemoryStore::with_devices([
            Device::new("T1", "transformer"),
            Device::new("BUS1", "Bus"),
            Device::new("P1", "panel board").with_field(F, true),
            Device::edge("E0", "T1", "BUS1"),
            Device::edge("E1", "BUS1", "P1"),
        ]));
        engine(store.clone()).propagate(F, &ids(&["P1"]), true).await.unwrap();

        assert!(store.snapshot("BUS1").unwrap().energized);
        assert!(!store.snapshot("E0").unwrap().energized);
    }
}
