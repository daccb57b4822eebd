//! # funkhaus-observability
//!
//! Observability-Crate fuer Funkhaus:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber
//! - Request-Tracing fuer die HTTP-Endpunkte

pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, FunkhausMetrics, HubKennzahlen};
pub use middleware::request_timing_layer;

use anyhow::Result;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
///
/// Laeuft, bis `abbruch` ausgeloest wird.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: FunkhausMetrics,
    health: HealthState,
    abbruch: CancellationToken,
) -> Result<()> {
    use axum::Router;

    let app = Router::new()
        .merge(metrics_router(metriken))
        .merge(health_router(health))
        .layer(request_timing_layer());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { abbruch.cancelled().await })
        .await?;
    tracing::info!("Observability-Server beendet");
    Ok(())
}
