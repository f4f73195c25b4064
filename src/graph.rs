//! Graph view over the flat device relation.
//!
//! Nodes and edges live in the same table; an edge is a `PolyLine` row whose
//! `from`/`to` columns hold node ids. [`Graph`] turns the filtered store
//! primitives into traversal vocabulary (neighbors, connections) so the
//! propagation engine never builds ad hoc filters itself.
//!
//! Which endpoint is upstream is a deployment property captured by
//! [`EdgeConvention`]. Under the default `BusToDevice`, an edge reads
//! `from` = upstream and `to` = downstream.

use itertools::Itertools;
use serde::Deserialize;

use crate::domain::{EnergizeField, Subject};
use crate::repo::{EdgeFilter, Endpoint, GraphStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeConvention {
    /// `from` is the feeding side (e.g. the bus), `to` the fed device.
    #[default]
    BusToDevice,
    /// `to` is the feeding side.
    DeviceToBus,
}

impl EdgeConvention {
    fn upstream(self) -> Endpoint {
        match self {
            Self::BusToDevice => Endpoint::From,
            Self::DeviceToBus => Endpoint::To,
        }
    }

    fn downstream(self) -> Endpoint {
        match self {
            Self::BusToDevice => Endpoint::To,
            Self::DeviceToBus => Endpoint::From,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Downstream,
    Upstream,
}

pub struct Graph<'a> {
    store: &'a dyn GraphStore,
    convention: EdgeConvention,
}

impl<'a> Graph<'a> {
    pub fn new(store: &'a dyn GraphStore, convention: EdgeConvention) -> Self {
        Self { store, convention }
    }

    pub async fn nodes_tagged(&self, subjects: &[Subject]) -> Result<Vec<String>, StoreError> {
        self.store.find_ids(subjects).await
    }

    /// Distinct nodes one edge away from `id` in `direction`.
    pub async fn neighbors(&self, id: &str, direction: Direction) -> Result<Vec<String>, StoreError> {
        let (anchor_side, other_side) = match direction {
            Direction::Downstream => (self.convention.upstream(), self.convention.downstream()),
            Direction::Upstream => (self.convention.downstream(), self.convention.upstream()),
        };
        let origin = [id.to_string()];
        let filter = match anchor_side {
            Endpoint::From => EdgeFilter::from_ids(&origin),
            Endpoint::To => EdgeFilter::to_ids(&origin),
        };
        let found = self.store.find_edge_endpoints(&filter, other_side).await?;
        Ok(found.into_iter().unique().collect())
    }

    /// Members of `candidates` joined to any of `ids` by an edge, in either
    /// orientation. Result is distinct and in first-seen order.
    pub async fn connected_among(
        &self,
        ids: &[String],
        candidates: &[String],
    ) -> Result<Vec<String>, StoreError> {
        if ids.is_empty() || candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut found = self
            .store
            .find_edge_endpoints(&EdgeFilter::between(candidates, ids), Endpoint::From)
            .await?;
        found.extend(
            self.store
                .find_edge_endpoints(&EdgeFilter::between(ids, candidates), Endpoint::To)
                .await?,
        );
        Ok(found.into_iter().unique().collect())
    }

    /// Sets `field` on every edge terminating at one of `ids`.
    pub async fn set_edges_into(
        &self,
        ids: &[String],
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        self.store
            .update_edge_field(&EdgeFilter::to_ids(ids), field, value)
            .await
    }

    /// Sets `field` on both orientations of every `hub`-`peer` edge.
    pub async fn set_connection_edges(
        &self,
        hub: &str,
        peers: &[String],
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        let hub = [hub.to_string()];
        let forward = self
            .store
            .update_edge_field(&EdgeFilter::between(&hub, peers), field, value)
            .await?;
        let backward = self
            .store
            .update_edge_field(&EdgeFilter::between(peers, &hub), field, value)
            .await?;
        Ok(forward + backward)
    }

    pub async fn set_nodes(
        &self,
        subject: Subject,
        ids: &[String],
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        self.store.update_field(subject, ids, field, value).await
    }

    /// OR of `field` over `ids`; false for an empty set.
    pub async fn any_set(&self, ids: &[String], field: EnergizeField) -> Result<bool, StoreError> {
        if ids.is_empty() {
            return Ok(false);
        }
        Ok(self.store.count_where_true(ids, field).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Device;
    use crate::repo::MemoryStore;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn store() -> MemoryStore {
        MemoryStore::with_devices([
            Device::new("T1", "transformer"),
            Device::new("BUS1", "Bus"),
            Device::new("P1", "panel board"),
            Device::new("P2", "panel board"),
            Device::edge("E0", "T1", "BUS1"),
            Device::edge("E1", "BUS1", "P1"),
            Device::edge("E2", "BUS1", "P2"),
            Device::edge("E2b", "BUS1", "P2"),
        ])
    }

    #[tokio::test]
    async fn test_neighbors_follow_convention() {
        let store = store();
        let graph = Graph::new(&store, EdgeConvention::BusToDevice);

        let mut down = graph.neighbors("BUS1", Direction::Downstream).await.unwrap();
        down.sort();
        assert_eq!(down, ids(&["P1", "P2"]));
        assert_eq!(
            graph.neighbors("BUS1", Direction::Upstream).await.unwrap(),
            ids(&["T1"])
        );

        let reversed = Graph::new(&store, EdgeConvention::DeviceToBus);
        assert_eq!(
            reversed.neighbors("BUS1", Direction::Downstream).await.unwrap(),
            ids(&["T1"])
        );
    }

    #[tokio::test]
    async fn test_connected_among_matches_both_orientations() {
        let store = store();
        let graph = Graph::new(&store, EdgeConvention::BusToDevice);
        let buses = ids(&["BUS1"]);

        assert_eq!(graph.connected_among(&ids(&["P2"]), &buses).await.unwrap(), buses);
        assert_eq!(graph.connected_among(&ids(&["T1"]), &buses).await.unwrap(), buses);
        assert!(graph
            .connected_among(&ids(&["GHOST"]), &buses)
            .await
            .unwrap()
            .is_empty());
        assert!(graph.connected_among(&[], &buses).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connection_edges_skip_feeders() {
        let store = store();
        let graph = Graph::new(&store, EdgeConvention::BusToDevice);
        let n = graph
            .set_connection_edges("BUS1", &ids(&["P1", "P2"]), EnergizeField::Energized, true)
            .await
            .unwrap();
        assert_eq!(n, 3);
        assert!(!store.snapshot("E0").unwrap().energized);
    }

    #[tokio::test]
    async fn test_any_set_empty_is_false() {
        let store = store();
        let graph = Graph::new(&store, EdgeConvention::BusToDevice);
        assert!(!graph.any_set(&[], EnergizeField::Energized).await.unwrap());
    }
}
