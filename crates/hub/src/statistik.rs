//! Laufzeit-Zaehler des Hubs
//!
//! Atomare Zaehler, die von Queues, Dispatcher und Verbindungen ohne Lock
//! hochgezaehlt werden. Die Observability-Schicht liest sie per Snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

/// Gemeinsame Zaehler aller Verbindungen
#[derive(Debug, Default)]
pub struct HubStatistik {
    zugestellt: AtomicU64,
    verworfen: AtomicU64,
    verbindungen_gesamt: AtomicU64,
    timeouts: AtomicU64,
}

/// Momentaufnahme der Zaehler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatistikSnapshot {
    /// Erfolgreich eingereihte Frames
    pub zugestellt: u64,
    /// Wegen voller Queue verworfene Frames
    pub verworfen: u64,
    /// Seit Start registrierte Verbindungen
    pub verbindungen_gesamt: u64,
    /// Wegen Lese-Timeout getrennte Verbindungen
    pub timeouts: u64,
}

impl HubStatistik {
    pub fn neu() -> Self {
        Self::default()
    }

    pub(crate) fn zugestellt_zaehlen(&self) {
        self.zugestellt.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn verworfen_zaehlen(&self) {
        self.verworfen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn verbindung_zaehlen(&self) {
        self.verbindungen_gesamt.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn timeout_zaehlen(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatistikSnapshot {
        StatistikSnapshot {
            zugestellt: self.zugestellt.load(Ordering::Relaxed),
            verworfen: self.verworfen.load(Ordering::Relaxed),
            verbindungen_gesamt: self.verbindungen_gesamt.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}
