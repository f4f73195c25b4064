#![cfg(feature = "db")]

use std::collections::HashMap;

use sqlx::PgPool;

use super::StoreError;
use crate::domain::{DeviceFile, NewDeviceFile};

const FILE_COLUMNS: &str =
    "id, device_id, project, file_type, file_name, file_path, file_size, mime_type, created_at, updated_at";

pub struct DeviceFileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DeviceFileRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, file: &NewDeviceFile) -> Result<DeviceFile, StoreError> {
        let row = sqlx::query_as::<_, DeviceFile>(&format!(
            r#"
            INSERT INTO device_files (device_id, project, file_type, file_name, file_path, file_size, mime_type)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(&file.device_id)
        .bind(&file.project)
        .bind(&file.file_type)
        .bind(&file.file_name)
        .bind(&file.file_path)
        .bind(file.file_size)
        .bind(&file.mime_type)
        .fetch_one(self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<DeviceFile>, StoreError> {
        let row = sqlx::query_as::<_, DeviceFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM device_files WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_by_device(&self, device_id: &str) -> Result<Vec<DeviceFile>, StoreError> {
        let rows = sqlx::query_as::<_, DeviceFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM device_files WHERE device_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(device_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM device_files WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn count_by_device(&self, device_ids: &[String]) -> Result<HashMap<String, u64>, StoreError> {
        if device_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT device_id, COUNT(*)
            FROM device_files
            WHERE device_id = ANY($1)
            GROUP BY device_id
            "#,
        )
        .bind(device_ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, n)| (id, n.max(0) as u64))
            .collect())
    }
}
