use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    api::{devices, files, health, projects},
    auth::require_bearer,
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    let mut api = Router::new()
        .route("/devices", get(devices::list_devices).post(devices::create_device))
        .route("/devices/import", post(devices::import_devices))
        .route("/devices/search", get(devices::search_devices))
        .route(
            "/devices/:id",
            get(devices::get_device)
                .put(devices::update_device)
                .delete(devices::delete_device),
        )
        .route(
            "/devices/:id/files",
            get(files::list_files).post(files::upload_file),
        )
        .route(
            "/files/:id",
            get(files::download_file).delete(files::delete_file),
        )
        .route("/projects/:project/devices", get(projects::project_devices))
        .route(
            "/projects/:project/equipments",
            get(projects::project_equipments),
        );

    if state.cfg.auth.enabled {
        api = api.route_layer(middleware::from_fn_with_state(
            state.cfg.auth.clone(),
            require_bearer,
        ));
    }

    let probes = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check));

    api.merge(probes).with_state(state)
}
