//! On-disk storage for device documents.
//!
//! Blobs are laid out as `{root}/{project}/{device_id}/{timestamp}_{name}`,
//! with `{timestamp}_{n}_{name}` used when that path is already taken.
//! Metadata lives in the [`DeviceFileStore`](crate::repo::DeviceFileStore);
//! this module only moves bytes.

use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const MAX_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file name: {0:?}")]
    InvalidName(String),
}

#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub path: PathBuf,
    pub size: i64,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn save(
        &self,
        project: &str,
        device_id: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<StoredBlob, UploadError> {
        let base = base_name(file_name)?;
        let dir = self
            .root
            .join(path_segment(project))
            .join(path_segment(device_id));
        fs::create_dir_all(&dir).await?;

        let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let (path, mut file) = create_unique(&dir, &stamp, &base).await?;
        file.write_all(data).await?;
        file.flush().await?;

        Ok(StoredBlob {
            path,
            size: data.len() as i64,
        })
    }

    /// Missing blobs are not an error.
    pub async fn remove(&self, path: &Path) -> Result<(), UploadError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn open(&self, path: &Path) -> Result<fs::File, UploadError> {
        Ok(fs::File::open(path).await?)
    }
}

/// Opens a fresh file in `dir`, never reusing an existing blob's path.
async fn create_unique(dir: &Path, stamp: &str, base: &str) -> Result<(PathBuf, fs::File), UploadError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = match attempt {
            0 => format!("{stamp}_{base}"),
            n => format!("{stamp}_{n}_{base}"),
        };
        let path = dir.join(name);
        match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("no free name for {base:?} in {}", dir.display()),
    )
    .into())
}

/// Last path component of a client-supplied name.
fn base_name(file_name: &str) -> Result<String, UploadError> {
    let normalized = file_name.replace('\\', "/");
    match Path::new(&normalized).components().last() {
        Some(Component::Normal(name)) => Ok(name.to_string_lossy().into_owned()),
        _ => Err(UploadError::InvalidName(file_name.to_string())),
    }
}

/// Project and device ids become directory names; separators are replaced.
fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
