#![cfg(feature = "db")]

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::collections::HashMap;
use tracing::info;

use super::{
    device_files::DeviceFileRepository, devices::DeviceRepository, DeviceFileStore, DeviceStore,
    EdgeFilter, Endpoint, GraphStore, StoreError,
};
use crate::config::DbConfig;
use crate::domain::{
    Device, DeviceFile, DevicePatch, DeviceQuery, EnergizeField, NewDeviceFile, PageRequest,
    Subject,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS devices (
        id TEXT PRIMARY KEY,
        project TEXT NOT NULL DEFAULT '',
        file_page INTEGER NOT NULL DEFAULT 0,
        subject TEXT NOT NULL DEFAULT '',
        rect_px BIGINT[] NOT NULL DEFAULT '{}',
        polygon_points_px JSONB,
        text TEXT NOT NULL DEFAULT '',
        comments TEXT NOT NULL DEFAULT '',
        energized BOOLEAN NOT NULL DEFAULT FALSE,
        energized_today BOOLEAN NOT NULL DEFAULT FALSE,
        "from" TEXT,
        "to" TEXT,
        will_energized_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS devices_project_idx ON devices (project)",
    "CREATE INDEX IF NOT EXISTS devices_subject_idx ON devices (subject)",
    r#"CREATE INDEX IF NOT EXISTS devices_from_idx ON devices ("from")"#,
    r#"CREATE INDEX IF NOT EXISTS devices_to_idx ON devices ("to")"#,
    "CREATE EXTENSION IF NOT EXISTS pg_trgm",
    "CREATE INDEX IF NOT EXISTS devices_text_trgm_idx ON devices USING gin (text gin_trgm_ops)",
    r#"
    CREATE TABLE IF NOT EXISTS device_files (
        id BIGSERIAL PRIMARY KEY,
        device_id TEXT NOT NULL,
        project TEXT NOT NULL DEFAULT '',
        file_type TEXT NOT NULL DEFAULT 'other',
        file_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        file_size BIGINT NOT NULL DEFAULT 0,
        mime_type TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS device_files_device_idx ON device_files (device_id)",
];

pub struct PgRepo {
    pub pool: PgPool,
}

impl PgRepo {
    pub async fn connect(cfg: &DbConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.url)
            .await?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        info!(max_connections = cfg.max_connections, "connected to postgres");
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get a device repository
    pub fn devices(&self) -> DeviceRepository<'_> {
        DeviceRepository::new(&self.pool)
    }

    /// Get a device file repository
    pub fn device_files(&self) -> DeviceFileRepository<'_> {
        DeviceFileRepository::new(&self.pool)
    }
}

#[async_trait]
impl DeviceStore for PgRepo {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Device>, StoreError> {
        self.devices().find_by_id(id).await
    }

    async fn list(
        &self,
        query: &DeviceQuery,
        page: Option<PageRequest>,
    ) -> Result<(Vec<Device>, u64), StoreError> {
        self.devices().list(query, page).await
    }

    async fn insert(&self, device: Device) -> Result<Device, StoreError> {
        self.devices().insert(&device).await
    }

    async fn update(&self, id: &str, patch: &DevicePatch) -> Result<Option<Device>, StoreError> {
        self.devices().update(id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.devices().delete(id).await
    }

    async fn upsert_many(&self, devices: &[Device]) -> Result<u64, StoreError> {
        self.devices().upsert_many(devices).await
    }
}

#[async_trait]
impl GraphStore for PgRepo {
    async fn find_ids(&self, subjects: &[Subject]) -> Result<Vec<String>, StoreError> {
        self.devices().find_ids(subjects).await
    }

    async fn find_edge_endpoints(
        &self,
        filter: &EdgeFilter,
        anchor: Endpoint,
    ) -> Result<Vec<String>, StoreError> {
        self.devices().find_edge_endpoints(filter, anchor).await
    }

    async fn update_field(
        &self,
        subject: Subject,
        ids: &[String],
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        self.devices().update_field(subject, ids, field, value).await
    }

    async fn update_edge_field(
        &self,
        filter: &EdgeFilter,
        field: EnergizeField,
        value: bool,
    ) -> Result<u64, StoreError> {
        self.devices().update_edge_field(filter, field, value).await
    }

    async fn count_where_true(&self, ids: &[String], field: EnergizeField) -> Result<u64, StoreError> {
        self.devices().count_where_true(ids, field).await
    }
}

#[async_trait]
impl DeviceFileStore for PgRepo {
    async fn insert_file(&self, file: NewDeviceFile) -> Result<DeviceFile, StoreError> {
        self.device_files().insert(&file).await
    }

    async fn get_file(&self, id: i64) -> Result<Option<DeviceFile>, StoreError> {
        self.device_files().find_by_id(id).await
    }

    async fn list_files(&self, device_id: &str) -> Result<Vec<DeviceFile>, StoreError> {
        self.device_files().find_by_device(device_id).await
    }

    async fn delete_file(&self, id: i64) -> Result<bool, StoreError> {
        self.device_files().delete(id).await
    }

    async fn count_files(&self, device_ids: &[String]) -> Result<HashMap<String, u64>, StoreError> {
        self.device_files().count_by_device(device_ids).await
    }
}
