use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::{
    api::{error::ApiError, response::ApiResponse},
    domain::{Device, DevicePatch, DeviceQuery, PageRequest},
    state::AppState,
};

pub const MAX_LIST_SIZE: u32 = 1000;
pub const MAX_SEARCH_SIZE: u32 = 200;

/// `page`/`size` query parameters. Malformed or out-of-range values fall
/// back to the default page instead of failing the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageParams {
    pub fn from_query(query: Result<Query<PageParams>, QueryRejection>) -> Self {
        query.map(|Query(params)| params).unwrap_or_default()
    }

    pub fn is_given(&self) -> bool {
        self.page.is_some() || self.size.is_some()
    }

    pub fn resolve(&self, max_size: u32) -> PageRequest {
        PageRequest::checked(self.page, self.size, max_size)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub project: Option<String>,
    pub file_page: Option<i32>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

/// Search parameters as applied, echoed back under `metadata.query`.
#[derive(Debug, Serialize)]
pub struct SearchEcho {
    pub q: String,
    pub project: Option<String>,
    pub file_page: Option<i32>,
    pub page: u32,
    pub size: u32,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub count: u64,
}

/// GET /api/v1/devices - Newest first, paginated
pub async fn list_devices(
    State(state): State<AppState>,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<Device>>, ApiError> {
    let page = PageParams::from_query(query).resolve(MAX_LIST_SIZE);
    let (devices, total) = state
        .repos
        .devices
        .list(&DeviceQuery::default(), Some(page))
        .await?;

    Ok(ApiResponse::success(devices).with_pagination(page, total))
}

/// GET /api/v1/devices/:id
pub async fn get_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<ApiResponse<Device>, ApiError> {
    let device = state
        .repos
        .devices
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {id}")))?;

    Ok(ApiResponse::success(device))
}

/// POST /api/v1/devices
pub async fn create_device(
    State(state): State<AppState>,
    payload: Result<Json<Device>, JsonRejection>,
) -> Result<ApiResponse<Device>, ApiError> {
    let Json(device) = payload?;
    device.validate()?;

    let created = state.repos.devices.insert(device).await?;
    info!(device_id = %created.id, subject = %created.subject, "device created");

    state.triggers.device_created(&created).await;

    // The row may have been rewritten by propagation (e.g. an edge created
    // after its bus).
    let refreshed = state.repos.devices.get(&created.id).await?;
    Ok(ApiResponse::created(refreshed.unwrap_or(created)))
}

/// PUT /api/v1/devices/:id - Partial update
pub async fn update_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<DevicePatch>, JsonRejection>,
) -> Result<ApiResponse<Device>, ApiError> {
    let Json(patch) = payload?;
    if patch.is_empty() {
        return Err(ApiError::BadRequest("no updatable fields in request".to_string()));
    }

    let updated = state
        .repos
        .devices
        .update(&id, &patch)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("device {id}")))?;

    state.triggers.device_updated(&updated, &patch).await;

    Ok(ApiResponse::success(updated))
}

/// DELETE /api/v1/devices/:id
pub async fn delete_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.repos.devices.delete(&id).await? {
        return Err(ApiError::NotFound(format!("device {id}")));
    }
    info!(device_id = %id, "device deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/devices/import - Bulk upsert by id
pub async fn import_devices(
    State(state): State<AppState>,
    payload: Result<Json<Vec<Device>>, JsonRejection>,
) -> Result<ApiResponse<ImportResult>, ApiError> {
    let Json(devices) = payload?;
    if devices.is_empty() {
        return Err(ApiError::BadRequest("empty device array".to_string()));
    }
    for (index, device) in devices.iter().enumerate() {
        device
            .validate()
            .map_err(|e| ApiError::ValidationError(format!("row {index}: {e}")))?;
    }

    let count = state.repos.devices.upsert_many(&devices).await?;
    let summary = state.triggers.devices_imported(&devices).await;
    info!(
        rows = devices.len(),
        written = count,
        propagations = summary.invocations,
        propagation_failures = summary.failures,
        "devices imported"
    );

    Ok(ApiResponse::created(ImportResult { count }))
}

/// GET /api/v1/devices/search - Case-insensitive substring match on `text`
pub async fn search_devices(
    State(state): State<AppState>,
    query: Result<Query<SearchParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<Device>>, ApiError> {
    let Ok(Query(params)) = query else {
        return Err(ApiError::BadRequest("q is required".to_string()));
    };
    let needle = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("q is required".to_string()))?;

    let page = PageRequest {
        page: params.page.filter(|p| *p >= 1).unwrap_or(1),
        size: params
            .size
            .filter(|s| (1..=MAX_SEARCH_SIZE).contains(s))
            .unwrap_or(PageRequest::default().size),
    };
    let echo = SearchEcho {
        q: needle.clone(),
        project: params.project.filter(|p| !p.is_empty()),
        file_page: params.file_page.filter(|p| *p != 0),
        page: page.page,
        size: page.size,
    };
    let query = DeviceQuery {
        project: echo.project.clone(),
        text_contains: Some(needle),
        file_page: echo.file_page,
        ..Default::default()
    };

    let (devices, total) = state.repos.devices.list(&query, Some(page)).await?;
    Ok(ApiResponse::success(devices)
        .with_pagination(page, total)
        .with_query(&echo))
}
