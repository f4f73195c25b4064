use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a document attached to a device. The blob itself lives on
/// disk at `file_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DeviceFile {
    pub id: i64,
    pub device_id: String,
    pub project: String,
    pub file_type: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeviceFile {
    pub device_id: String,
    pub project: String,
    pub file_type: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
}

impl NewDeviceFile {
    pub fn into_file(self, id: i64) -> DeviceFile {
        let now = Utc::now();
        DeviceFile {
            id,
            device_id: self.device_id,
            project: self.project,
            file_type: self.file_type,
            file_name: self.file_name,
            file_path: self.file_path,
            file_size: self.file_size,
            mime_type: self.mime_type,
            created_at: now,
            updated_at: now,
        }
    }
}

pub const DEFAULT_FILE_TYPE: &str = "other";
