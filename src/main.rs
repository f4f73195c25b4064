use anyhow::Result;
use sld_energize::{api, config::Config, state::AppState, telemetry};
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Config::load()?;

    if !cfg.auth.enabled {
        warn!("authentication disabled - every /api/v1 route is open");
    }

    let addr = cfg.server.socket_addr()?;
    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0 - service will be reachable from the network");
    }

    let state = AppState::new(cfg).await?;
    info!(
        %addr,
        backend = ?state.cfg.store.backend,
        edge_convention = ?state.cfg.topology.edge_convention,
        uploads = %state.uploads.root().display(),
        "starting sld-energize"
    );

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
