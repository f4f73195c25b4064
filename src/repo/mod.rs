//! Storage seams for the device relation and its attached documents.
//!
//! Three traits split the store by concern:
//! - [`DeviceStore`]: row CRUD used by the HTTP layer
//! - [`GraphStore`]: the filtered read/write primitives the energization
//!   engine runs on
//! - [`DeviceFileStore`]: document metadata
//!
//! [`MemoryStore`] implements all three and backs the tests; `PgRepo`
//! (feature `db`) is the production implementation.

pub mod memory;

#[cfg(feature = "db")]
pub mod device_files;
#[cfg(feature = "db")]
pub mod devices;
#[cfg(feature = "db")]
pub mod pg;

use anyhow::Result;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

use crate::config::{Config, StoreBackend};
use crate::domain::{
    Device, DeviceFile, DevicePatch, DeviceQuery, EnergizeField, NewDeviceFile, PageRequest,
    Subject,
};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("device {0} already exists")]
    Conflict(String),

    #[error("store backend failure: {0}")]
    Backend(String),

    #[cfg(feature = "db")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Which endpoint column of an edge row to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    From,
    To,
}

impl Endpoint {
    pub fn column(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
        }
    }

    pub fn of(self, edge: &Device) -> Option<&str> {
        match self {
            Self::From => edge.from.as_deref(),
            Self::To => edge.to.as_deref(),
        }
    }
}

/// Endpoint filter over `PolyLine` rows.
///
/// A filter always constrains at least one endpoint, and a constrained
/// endpoint with an empty id list matches nothing. There is no way to build a
/// filter that selects every edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeFilter {
    from: Option<Vec<String>>,
    to: Option<Vec<String>>,
}

impl EdgeFilter {
    pub fn from_ids(ids: &[String]) -> Self {
        Self {
            from: Some(ids.to_vec()),
            to: None,
        }
    }

    pub fn to_ids(ids: &[String]) -> Self {
        Self {
            from: None,
            to: Some(ids.to_vec()),
        }
    }

    pub fn between(from: &[String], to: &[String]) -> Self {
        Self {
            from: Some(from.to_vec()),
            to: Some(to.to_vec()),
        }
    }

    pub fn from(&self) -> Option<&[String]> {
        self.from.as_deref()
    }

    pub fn to(&self) -> Option<&[String]> {
        self.to.as_deref()
    }

    pub fn matches_nothing(&self) -> bool {
        self.from.as_ref().is_some_and(Vec::is_empty) || self.to.as_ref().is_some_and(Vec::is_empty)
    }

    /// Dangling or missing endpoints never match a constrained side.
    pub fn matches(&self, edge: &Device) -> bool {
        if !edge.is_edge() {
            return false;
        }
        let side_ok = |allowed: &Option<Vec<String>>, value: Option<&str>| match allowed {
            None => true,
            Some(ids) => value.is_some_and(|v| ids.iter().any(|id| id == v)),
        };
        side_ok(&self.from, edge.from.as_deref()) && side_ok(&self.to, edge.to.as_deref())
    }
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Device>, StoreError>;

    /// Rows matching `query`, newest `updated_at` first, plus the unpaged total.
    async fn list(
        &self,
        query: &DeviceQuery,
        page: Option<PageRequest>,
    ) -> Result<(Vec<Device>, u64), StoreError>;

    async fn insert(&self, device: Device) -> Result<Device, StoreError>;

    /// Returns the refreshed row, or `None` if `id` does not exist.
    async fn update(&self, id: &str, patch: &DevicePatch) -> Result<Option<Device>, StoreError>;

    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Insert or overwrite by id; `created_at` of existing rows is kept.
    async fn upsert_many(&self, devices: &[Device]) -> Result<u64, StoreError>;
}

/// Filtered primitives over the flat device relation.
///
/// Every write primitive returns `Ok(0)` without touching the backend when
/// its id filter is empty.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Ids of node rows whose subject is any of `subjects`.
    async fn find_ids(&self, subjects: &[Subject]) -> Result<Vec<String>, StoreError>;

    /// Values of the `anchor` column over edge rows matching `filter`.
    /// Duplicates are possible when several edges share an endpoint.
    async fn find_edge_endpoints(
        &self,
        filter: &EdgeFilter,
        anchor: Endpoint,
    ) -> Result<Vec<String>, StoreError>;

    async fn update_field(
        &self,
        subject: Subject,
        ids: &[String],
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError>;

    async fn update_edge_field(
        &self,
        filter: &EdgeFilter,
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError>;

    /// Number of rows among `ids` whose `field` is true.
    async fn count_where_true(&self, ids: &[String], field: EnergizeField) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait DeviceFileStore: Send + Sync {
    async fn insert_file(&self, file: NewDeviceFile) -> Result<DeviceFile, StoreError>;

    async fn get_file(&self, id: i64) -> Result<Option<DeviceFile>, StoreError>;

    /// Newest first.
    async fn list_files(&self, device_id: &str) -> Result<Vec<DeviceFile>, StoreError>;

    async fn delete_file(&self, id: i64) -> Result<bool, StoreError>;

    /// Attachment counts keyed by device id; devices without files are absent.
    async fn count_files(&self, device_ids: &[String]) -> Result<HashMap<String, u64>, StoreError>;
}

/// The store handles injected into the application, all backed by one
/// concrete store.
#[derive(Clone)]
pub struct Repositories {
    pub devices: Arc<dyn DeviceStore>,
    pub graph: Arc<dyn GraphStore>,
    pub files: Arc<dyn DeviceFileStore>,
}

impl Repositories {
    pub async fn new(cfg: &Config) -> Result<Self> {
        match cfg.store.backend {
            StoreBackend::Memory => Ok(Self::in_memory(Arc::new(MemoryStore::new()))),
            #[cfg(feature = "db")]
            StoreBackend::Postgres => {
                let repo = Arc::new(pg::PgRepo::connect(&cfg.db).await?);
                Ok(Self {
                    devices: repo.clone(),
                    graph: repo.clone(),
                    files: repo,
                })
            }
            #[cfg(not(feature = "db"))]
            StoreBackend::Postgres => {
                anyhow::bail!("store.backend = \"postgres\" requires building with the `db` feature")
            }
        }
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            devices: store.clone(),
            graph: store.clone(),
            files: store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_side_matches_nothing() {
        let edge = Device::edge("E1", "BUS1", "P1");
        let filter = EdgeFilter::between(&ids(&["BUS1"]), &[]);
        assert!(filter.matches_nothing());
        assert!(!filter.matches(&edge));
    }

    #[test]
    fn test_open_side_is_wildcard() {
        let edge = Device::edge("E1", "BUS1", "P1");
        assert!(EdgeFilter::to_ids(&ids(&["P1"])).matches(&edge));
        assert!(EdgeFilter::from_ids(&ids(&["BUS1"])).matches(&edge));
        assert!(!EdgeFilter::from_ids(&ids(&["P1"])).matches(&edge));
    }

    #[test]
    fn test_dangling_endpoint_never_matches() {
        let mut edge = Device::edge("E1", "BUS1", "P1");
        edge.to = None;
        assert!(!EdgeFilter::to_ids(&ids(&["P1"])).matches(&edge));
        assert!(EdgeFilter::from_ids(&ids(&["BUS1"])).matches(&edge));
    }

    #[test]
    fn test_nodes_are_not_edges() {
        let mut node = Device::new("P1", "panel board");
        node.to = Some("X".into());
        assert!(!EdgeFilter::to_ids(&ids(&["X"])).matches(&node));
    }
}
