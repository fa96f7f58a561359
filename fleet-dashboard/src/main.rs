/*!
 * Fleet dashboard - HTTP entry point
 *
 * Serves the read-only API on 0.0.0.0:$DASHBOARD_PORT (default 5000),
 * backed by the InfluxDB log configured through the usual INFLUX_* variables.
 */

mod http;

use anyhow::{Context, Result};
use fleet_core::{FleetConfig, InfluxLog};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_PORT: u16 = 5000;

#[tokio::main]
async fn main() -> Result<()> {
    fleet_core::init_tracing();

    let config = FleetConfig::from_env().context("Failed to load configuration")?;
    let port = match std::env::var("DASHBOARD_PORT") {
        Ok(raw) => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("invalid value for DASHBOARD_PORT: {:?}", raw))?,
        Err(_) => DEFAULT_PORT,
    };

    let log = InfluxLog::new(config.influx.clone()).context("Failed to build InfluxDB client")?;
    let app = http::build_router(http::AppState { log: Arc::new(log) });

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Dashboard API on http://{}", addr);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;
    Ok(())
}
