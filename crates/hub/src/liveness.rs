//! Globaler Liveness-Ticker
//!
//! Schickt in festem Abstand einen `ping` an jede registrierte Verbindung.
//! Liest nur die globale Tabelle und schreibt direkt in die Send-Queues,
//! die Registry selbst wird nicht veraendert.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::registry::MembershipRegistry;

pub(crate) async fn liveness_schleife(
    registry: Arc<MembershipRegistry>,
    intervall: Duration,
    abbruch: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + intervall, intervall);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = abbruch.cancelled() => break,
            _ = ticker.tick() => {
                let erreicht = registry.ping_an_alle();
                tracing::trace!(verbindungen = erreicht, "Liveness-Ping verteilt");
            }
        }
    }
    tracing::debug!("Liveness-Task beendet");
}
