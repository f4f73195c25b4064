use async_trait::async_trait;
use chrono::Utc;
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use super::{DeviceFileStore, DeviceStore, EdgeFilter, Endpoint, GraphStore, StoreError};
use crate::domain::{
    Device, DeviceFile, DevicePatch, DeviceQuery, EnergizeField, NewDeviceFile, PageRequest,
    Subject,
};

/// Process-local store. Used when `store.backend = "memory"` and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    devices: RwLock<BTreeMap<String, Device>>,
    files: RwLock<BTreeMap<i64, DeviceFile>>,
    next_file_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: impl IntoIterator<Item = Device>) -> Self {
        let store = Self::new();
        {
            let mut map = store.devices.write();
            for device in devices {
                map.insert(device.id.clone(), device);
            }
        }
        store
    }

    /// Direct read for assertions and diagnostics.
    pub fn snapshot(&self, id: &str) -> Option<Device> {
        self.devices.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Device>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn list(
        &self,
        query: &DeviceQuery,
        page: Option<PageRequest>,
    ) -> Result<(Vec<Device>, u64), StoreError> {
        let devices = self.devices.read();
        let matched: Vec<Device> = devices
            .values()
            .filter(|d| query.matches(d))
            .sorted_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)))
            .cloned()
            .collect();
        let total = matched.len() as u64;

        let rows = match page {
            Some(p) => matched
                .into_iter()
                .skip(p.offset() as usize)
                .take(p.size as usize)
                .collect(),
            None => matched,
        };
        Ok((rows, total))
    }

    async fn insert(&self, device: Device) -> Result<Device, StoreError> {
        let mut devices = self.devices.write();
        if devices.contains_key(&device.id) {
            return Err(StoreError::Conflict(device.id));
        }
        devices.insert(device.id.clone(), device.clone());
        Ok(device)
    }

    async fn update(&self, id: &str, patch: &DevicePatch) -> Result<Option<Device>, StoreError> {
        let mut devices = self.devices.write();
        Ok(devices.get_mut(id).map(|device| {
            patch.apply(device);
            device.clone()
        }))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.devices.write().remove(id).is_some())
    }

    async fn upsert_many(&self, rows: &[Device]) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut devices = self.devices.write();
        for row in rows {
            let mut row = row.clone();
            row.updated_at = now;
            if let Some(existing) = devices.get(&row.id) {
                row.created_at = existing.created_at;
            }
            devices.insert(row.id.clone(), row);
        }
        Ok(rows.len() as u64)
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn find_ids(&self, subjects: &[Subject]) -> Result<Vec<String>, StoreError> {
        Ok(self
            .devices
            .read()
            .values()
            .filter(|d| subjects.iter().any(|s| d.is_kind(*s)))
            .map(|d| d.id.clone())
            .collect())
    }

    async fn find_edge_endpoints(
        &self,
        filter: &EdgeFilter,
        anchor: Endpoint,
    ) -> Result<Vec<String>, StoreError> {
        if filter.matches_nothing() {
            return Ok(Vec::new());
        }
        Ok(self
            .devices
            .read()
            .values()
            .filter(|d| filter.matches(d))
            .filter_map(|d| anchor.of(d).map(str::to_string))
            .collect())
    }

    async fn update_field(
        &self,
        subject: Subject,
        ids: &[String],
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut devices = self.devices.write();
        let mut count = 0;
        for id in ids.iter().unique() {
            if let Some(device) = devices.get_mut(id).filter(|d| d.is_kind(subject)) {
                field.set(device, value);
                device.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update_edge_field(
        &self,
        filter: &EdgeFilter,
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        if filter.matches_nothing() {
            return Ok(0);
        }
        let now = Utc::now();
        let mut count = 0;
        for device in self.devices.write().values_mut() {
            if filter.matches(device) {
                field.set(device, value);
                device.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn count_where_true(&self, ids: &[String], field: EnergizeField) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let devices = self.devices.read();
        Ok(ids
            .iter()
            .unique()
            .filter_map(|id| devices.get(id))
            .filter(|d| field.get(d))
            .count() as u64)
    }
}

#[async_trait]
impl DeviceFileStore for MemoryStore {
    async fn insert_file(&self, file: NewDeviceFile) -> Result<DeviceFile, StoreError> {
        let id = self.next_file_id.fetch_add(1, Ordering::SeqCst) + 1;
        let file = file.into_file(id);
        self.files.write().insert(id, file.clone());
        Ok(file)
    }

    async fn get_file(&self, id: i64) -> Result<Option<DeviceFile>, StoreError> {
        Ok(self.files.read().get(&id).cloned())
    }

    async fn list_files(&self, device_id: &str) -> Result<Vec<DeviceFile>, StoreError> {
        Ok(self
            .files
            .read()
            .values()
            .filter(|f| f.device_id == device_id)
            .sorted_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)))
            .cloned()
            .collect())
    }

    async fn delete_file(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.files.write().remove(&id).is_some())
    }

    async fn count_files(&self, device_ids: &[String]) -> Result<HashMap<String, u64>, StoreError> {
        if device_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let files = self.files.read();
        Ok(files
            .values()
            .filter(|f| device_ids.contains(&f.device_id))
            .map(|f| f.device_id.clone())
            .counts()
            .into_iter()
            .map(|(id, n)| (id, n as u64))
            .collect())
    }
}
