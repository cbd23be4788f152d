mod metrics;
mod middleware;
mod router;
mod routes;
mod state;

use std::net::SocketAddr;

use anyhow::Result;
use tollgate_admission::Admission;
use tollgate_common::AppConfig;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::router::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    // Config path from the first argument
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/tollgate.yaml".to_string());

    info!(config_path = %config_path, "starting tollgate");

    let config = AppConfig::load(&config_path)?;
    let admission = Admission::from_config(&config)?;
    let reapers = admission.start_cleanup_tasks()?;
    info!(reapers, "idle client eviction started");

    let app = build_router(AppState::new(admission)?);

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    info!(addr = %config.server.listen, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("tollgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
