//! Hub-Konfiguration
//!
//! Laufzeitparameter fuer Queues und Liveness. Die Werte kommen aus der
//! `[hub]`-Sektion der Server-Konfiguration.

use funkhaus_core::{FunkhausError, Result};
use funkhaus_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use std::time::Duration;

/// Kapazitaet der Send-Queue pro Verbindung
pub const STANDARD_QUEUE_KAPAZITAET: usize = 256;

/// Kapazitaet der Befehls-Queue des Dispatchers
pub const STANDARD_BEFEHL_QUEUE_KAPAZITAET: usize = 1024;

/// Lese-Frist: so lange darf ein Client schweigen
pub const STANDARD_LESE_TIMEOUT: Duration = Duration::from_secs(60);

/// Schreib-Frist pro Stapel
pub const STANDARD_SCHREIB_TIMEOUT: Duration = Duration::from_secs(10);

/// Intervall der globalen Liveness-Pings
pub const STANDARD_LIVENESS_INTERVALL: Duration = Duration::from_secs(30);

/// Konfiguration des Hubs
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximale Anzahl wartender Frames pro Verbindung
    pub queue_kapazitaet: usize,
    /// Maximale Anzahl wartender Befehle beim Dispatcher
    pub befehl_queue_kapazitaet: usize,
    /// Verbindung gilt als tot, wenn so lange nichts ankommt
    pub lese_timeout: Duration,
    /// Ping-Intervall der Ausgangsschleife (kleiner als `lese_timeout`)
    pub probe_intervall: Duration,
    /// Intervall der globalen Liveness-Pings
    pub liveness_intervall: Duration,
    /// Frist fuer einen Schreibvorgang
    pub schreib_timeout: Duration,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_kapazitaet: STANDARD_QUEUE_KAPAZITAET,
            befehl_queue_kapazitaet: STANDARD_BEFEHL_QUEUE_KAPAZITAET,
            lese_timeout: STANDARD_LESE_TIMEOUT,
            probe_intervall: STANDARD_LESE_TIMEOUT * 9 / 10,
            liveness_intervall: STANDARD_LIVENESS_INTERVALL,
            schreib_timeout: STANDARD_SCHREIB_TIMEOUT,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl HubConfig {
    /// Setzt die Lese-Frist; das Probe-Intervall folgt mit 9/10 davon
    pub fn mit_lese_timeout(mut self, timeout: Duration) -> Self {
        self.lese_timeout = timeout;
        self.probe_intervall = timeout * 9 / 10;
        self
    }

    pub fn mit_queue_kapazitaet(mut self, kapazitaet: usize) -> Self {
        self.queue_kapazitaet = kapazitaet;
        self
    }

    pub fn mit_liveness_intervall(mut self, intervall: Duration) -> Self {
        self.liveness_intervall = intervall;
        self
    }

    /// Prueft die Werte auf Konsistenz
    pub fn validieren(&self) -> Result<()> {
        if self.queue_kapazitaet == 0 || self.befehl_queue_kapazitaet == 0 {
            return Err(FunkhausError::konfiguration(
                "Queue-Kapazitaeten muessen groesser als 0 sein",
            ));
        }
        if self.lese_timeout.is_zero() || self.schreib_timeout.is_zero() {
            return Err(FunkhausError::konfiguration(
                "Lese- und Schreib-Timeout muessen groesser als 0 sein",
            ));
        }
        if self.probe_intervall.is_zero() || self.probe_intervall >= self.lese_timeout {
            return Err(FunkhausError::konfiguration(
                "Probe-Intervall muss kleiner als das Lese-Timeout sein",
            ));
        }
        if self.liveness_intervall.is_zero() {
            return Err(FunkhausError::konfiguration(
                "Liveness-Intervall muss groesser als 0 sein",
            ));
        }
        if self.max_frame_groesse == 0 {
            return Err(FunkhausError::konfiguration(
                "Maximale Frame-Groesse muss groesser als 0 sein",
            ));
        }
        Ok(())
    }
}
