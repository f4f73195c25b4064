pub mod devices;
pub mod error;
pub mod files;
pub mod health;
pub mod projects;
pub mod response;
pub mod v1;

use axum::{extract::DefaultBodyLimit, http::Method, routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let server = state.cfg.server.clone();
    // Unversioned liveness path; the full probe set lives under /api/v1.
    let mut router = Router::new()
        .route("/healthz", get(health::healthz))
        .nest("/api/v1", v1::router(state));

    if server.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]);
        router = router.layer(cors);
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(server.max_upload_bytes()))
                .layer(TimeoutLayer::new(Duration::from_secs(
                    server.request_timeout_secs,
                ))),
        )
        .layer(TraceLayer::new_for_http())
}
