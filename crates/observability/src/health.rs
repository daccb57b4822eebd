//! Health-Check-Endpunkt fuer Funkhaus
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Hub-Zustand und Verbindungszahl

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub hub_aktiv: bool,
    pub verbindungen: u64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    hub_aktiv: Arc<AtomicBool>,
    verbindungen: Arc<AtomicU64>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            hub_aktiv: Arc::new(AtomicBool::new(true)),
            verbindungen: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn hub_aktiv(&self) -> bool {
        self.hub_aktiv.load(Ordering::Relaxed)
    }

    pub fn hub_status_setzen(&self, aktiv: bool) {
        self.hub_aktiv.store(aktiv, Ordering::Relaxed);
    }

    pub fn verbindungen_setzen(&self, anzahl: u64) {
        self.verbindungen.store(anzahl, Ordering::Relaxed);
    }

    /// Baut die aktuelle Antwort
    pub fn antwort(&self) -> HealthResponse {
        let hub_aktiv = self.hub_aktiv();
        HealthResponse {
            status: if hub_aktiv {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            hub_aktiv,
            verbindungen: self.verbindungen.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn health_state_standard_aktiv() {
        let state = HealthState::neu();
        assert!(state.hub_aktiv());
        assert!(state.uptime_seconds() < 5);
    }

    #[test]
    fn antwort_folgt_hub_status() {
        let state = HealthState::neu();
        state.verbindungen_setzen(7);
        let antwort = state.antwort();
        assert_eq!(antwort.status, HealthStatus::Healthy);
        assert_eq!(antwort.verbindungen, 7);

        state.hub_status_setzen(false);
        assert_eq!(state.antwort().status, HealthStatus::Unhealthy);
    }

    #[test]
    fn health_response_serialisierung() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            version: "0.1.0".to_string(),
            uptime_seconds: 3600,
            hub_aktiv: true,
            verbindungen: 2,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"hub_aktiv\":true"));
    }

    #[tokio::test]
    async fn endpunkt_meldet_503_bei_gestopptem_hub() {
        let state = HealthState::neu();
        state.hub_status_setzen(false);
        let antwort = health_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
