use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::{
    api::{error::ApiError, response::ApiResponse},
    domain::{DeviceFile, NewDeviceFile, DEFAULT_FILE_TYPE},
    state::AppState,
    uploads::UploadError,
};

struct UploadForm {
    file_name: String,
    mime_type: String,
    data: axum::body::Bytes,
    file_type: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut file = None;
    let mut file_type = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let mime_type = field.content_type().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                file = Some((file_name, mime_type, data));
            }
            Some("file_type") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                file_type = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let (file_name, mime_type, data) =
        file.ok_or_else(|| ApiError::BadRequest("file is required".to_string()))?;
    Ok(UploadForm {
        file_name,
        mime_type,
        data,
        file_type,
    })
}

/// POST /api/v1/devices/:id/files - multipart `file` plus optional `file_type`
pub async fn upload_file(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    multipart: Multipart,
) -> Result<ApiResponse<DeviceFile>, ApiError> {
    let device = state
        .repos
        .devices
        .get(&device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {device_id}")))?;

    let form = read_form(multipart).await?;
    let blob = state
        .uploads
        .save(&device.project, &device.id, &form.file_name, &form.data)
        .await?;

    let record = NewDeviceFile {
        device_id: device.id.clone(),
        project: device.project.clone(),
        file_type: form
            .file_type
            .unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string()),
        file_name: form.file_name,
        file_path: blob.path.to_string_lossy().into_owned(),
        file_size: blob.size,
        mime_type: form.mime_type,
    };

    let stored = match state.repos.files.insert_file(record).await {
        Ok(stored) => stored,
        Err(e) => {
            if let Err(cleanup) = state.uploads.remove(&blob.path).await {
                warn!(path = %blob.path.display(), error = %cleanup, "failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    info!(
        file_id = stored.id,
        device_id = %stored.device_id,
        size = stored.file_size,
        "document uploaded"
    );
    Ok(ApiResponse::created(stored))
}

/// GET /api/v1/devices/:id/files - Newest first
pub async fn list_files(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<ApiResponse<Vec<DeviceFile>>, ApiError> {
    let files = state.repos.files.list_files(&device_id).await?;
    let count = files.len() as u64;
    Ok(ApiResponse::success(files).with_count(count))
}

/// GET /api/v1/files/:id - Streams the stored blob
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let record = state
        .repos
        .files
        .get_file(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {id}")))?;

    let file = match state.uploads.open(&PathBuf::from(&record.file_path)).await {
        Ok(file) => file,
        Err(UploadError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(file_id = id, path = %record.file_path, "document blob missing on disk");
            return Err(ApiError::NotFound(format!("file {id}")));
        }
        Err(e) => return Err(e.into()),
    };

    let mime_type = if record.mime_type.is_empty() {
        "application/octet-stream".to_string()
    } else {
        record.mime_type.clone()
    };
    let disposition = format!(
        "attachment; filename=\"{}\"",
        record.file_name.replace(['"', '\\', '\r', '\n'], "_")
    );

    Ok((
        [
            (header::CONTENT_TYPE, mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// DELETE /api/v1/files/:id - Row first, blob removal is best effort
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let record = state
        .repos
        .files
        .get_file(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("file {id}")))?;

    if !state.repos.files.delete_file(id).await? {
        return Err(ApiError::NotFound(format!("file {id}")));
    }
    if let Err(e) = state.uploads.remove(&PathBuf::from(&record.file_path)).await {
        warn!(file_id = id, path = %record.file_path, error = %e, "failed to remove document blob");
    }

    Ok(StatusCode::NO_CONTENT)
}
