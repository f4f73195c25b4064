use axum::extract::{rejection::QueryRejection, Path, Query, State};
use serde::Serialize;

use crate::{
    api::{
        devices::{PageParams, MAX_LIST_SIZE},
        error::ApiError,
        response::ApiResponse,
    },
    domain::{Device, DeviceQuery, Subject},
    state::AppState,
};

/// Device kinds listed as equipment on a project page.
const EQUIPMENT: &[Subject] = &[Subject::Panel, Subject::Transformer, Subject::Generator];

#[derive(Debug, Serialize)]
pub struct Equipment {
    #[serde(flatten)]
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
}

/// GET /api/v1/projects/:project/devices
pub async fn project_devices(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<ApiResponse<Vec<Device>>, ApiError> {
    let query = DeviceQuery {
        project: Some(project),
        ..Default::default()
    };
    let (devices, total) = state.repos.devices.list(&query, None).await?;

    Ok(ApiResponse::success(devices).with_count(total))
}

/// GET /api/v1/projects/:project/equipments
///
/// Without `page`/`size` every equipment row is returned as-is. With either
/// one the result is paginated and each row carries its document count.
pub async fn project_equipments(
    State(state): State<AppState>,
    Path(project): Path<String>,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<ApiResponse<Vec<Equipment>>, ApiError> {
    let params = match query {
        Ok(Query(params)) => params,
        // A malformed value still asks for pagination.
        Err(_) => PageParams {
            page: Some(1),
            size: None,
        },
    };
    let filter = DeviceQuery {
        project: Some(project),
        subjects: Some(EQUIPMENT.to_vec()),
        ..Default::default()
    };

    if !params.is_given() {
        let (devices, total) = state.repos.devices.list(&filter, None).await?;
        let rows = devices
            .into_iter()
            .map(|device| Equipment {
                device,
                file_count: None,
            })
            .collect();
        return Ok(ApiResponse::success(rows).with_count(total));
    }

    let page = params.resolve(MAX_LIST_SIZE);
    let (devices, total) = state.repos.devices.list(&filter, Some(page)).await?;
    let ids: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
    let counts = state.repos.files.count_files(&ids).await?;

    let rows = devices
        .into_iter()
        .map(|device| {
            let file_count = counts.get(&device.id).copied().unwrap_or(0);
            Equipment {
                device,
                file_count: Some(file_count),
            }
        })
        .collect();

    Ok(ApiResponse::success(rows).with_pagination(page, total))
}
