//! Prometheus-kompatible Metriken fuer Funkhaus
//!
//! Registrierte Metriken:
//! - `funkhaus_verbindungen` – Gauge: Aktuell registrierte Verbindungen
//! - `funkhaus_online_benutzer` – Gauge: Benutzer mit mindestens einer Verbindung
//! - `funkhaus_aktive_raeume` – Gauge: Raeume mit mindestens einem Mitglied
//! - `funkhaus_frames_zugestellt_total` – Counter: In Send-Queues eingereihte Frames
//! - `funkhaus_frames_verworfen_total` – Counter: Wegen voller Queue verworfene Frames
//! - `funkhaus_verbindungen_total` – Counter: Seit Start registrierte Verbindungen
//! - `funkhaus_lese_timeouts_total` – Counter: Wegen Lese-Timeout getrennte Verbindungen

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Momentaufnahme des Hubs, wie sie in die Metriken uebernommen wird
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubKennzahlen {
    pub verbindungen: u64,
    pub online_benutzer: u64,
    pub aktive_raeume: u64,
    pub zugestellt: u64,
    pub verworfen: u64,
    pub verbindungen_gesamt: u64,
    pub timeouts: u64,
}

/// Alle Funkhaus-Prometheus-Metriken
#[derive(Clone)]
pub struct FunkhausMetrics {
    pub registry: Arc<Registry>,

    pub verbindungen: IntGauge,
    pub online_benutzer: IntGauge,
    pub aktive_raeume: IntGauge,

    pub frames_zugestellt: IntCounter,
    pub frames_verworfen: IntCounter,
    pub verbindungen_gesamt: IntCounter,
    pub lese_timeouts: IntCounter,
}

impl FunkhausMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let gauge = |name: &str, hilfe: &str| -> Result<IntGauge> {
            let g = IntGauge::with_opts(Opts::new(name, hilfe))?;
            registry.register(Box::new(g.clone()))?;
            Ok(g)
        };
        let verbindungen = gauge("funkhaus_verbindungen", "Aktuell registrierte Verbindungen")?;
        let online_benutzer = gauge(
            "funkhaus_online_benutzer",
            "Benutzer mit mindestens einer Verbindung",
        )?;
        let aktive_raeume = gauge(
            "funkhaus_aktive_raeume",
            "Raeume mit mindestens einem Mitglied",
        )?;

        let counter = |name: &str, hilfe: &str| -> Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, hilfe))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let frames_zugestellt = counter(
            "funkhaus_frames_zugestellt_total",
            "In Send-Queues eingereihte Frames",
        )?;
        let frames_verworfen = counter(
            "funkhaus_frames_verworfen_total",
            "Wegen voller Send-Queue verworfene Frames",
        )?;
        let verbindungen_gesamt = counter(
            "funkhaus_verbindungen_total",
            "Seit Start registrierte Verbindungen",
        )?;
        let lese_timeouts = counter(
            "funkhaus_lese_timeouts_total",
            "Wegen Lese-Timeout getrennte Verbindungen",
        )?;

        Ok(Self {
            registry: Arc::new(registry),
            verbindungen,
            online_benutzer,
            aktive_raeume,
            frames_zugestellt,
            frames_verworfen,
            verbindungen_gesamt,
            lese_timeouts,
        })
    }

    /// Uebernimmt eine Hub-Momentaufnahme
    ///
    /// Gauges werden gesetzt, Counter um die Differenz zum letzten Stand
    /// erhoeht (Counter duerfen nie sinken).
    pub fn kennzahlen_uebernehmen(&self, kennzahlen: &HubKennzahlen) {
        self.verbindungen.set(kennzahlen.verbindungen as i64);
        self.online_benutzer.set(kennzahlen.online_benutzer as i64);
        self.aktive_raeume.set(kennzahlen.aktive_raeume as i64);

        nachziehen(&self.frames_zugestellt, kennzahlen.zugestellt);
        nachziehen(&self.frames_verworfen, kennzahlen.verworfen);
        nachziehen(&self.verbindungen_gesamt, kennzahlen.verbindungen_gesamt);
        nachziehen(&self.lese_timeouts, kennzahlen.timeouts);
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn nachziehen(counter: &IntCounter, stand: u64) {
    let bisher = counter.get();
    if stand > bisher {
        counter.inc_by(stand - bisher);
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: FunkhausMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<FunkhausMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
