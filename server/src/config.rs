//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::collections::HashMap;
use std::time::Duration;

use funkhaus_hub::HubConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Queues und Fristen des Hubs
    pub hub: HubEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
    /// Statische Token-Tabelle
    pub auth: AuthEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Funkhaus".into(),
            max_verbindungen: 4096,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer alle Listener
    pub bind_adresse: String,
    /// Port fuer Client-Verbindungen
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 9870,
        }
    }
}

/// Hub-Einstellungen (Zeiten in Sekunden)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubEinstellungen {
    /// Send-Queue pro Verbindung
    pub queue_kapazitaet: usize,
    /// Befehls-Queue des Dispatchers
    pub befehl_queue_kapazitaet: usize,
    /// Lese-Frist; ein Client, der so lange schweigt, wird getrennt
    pub lese_timeout_sek: u64,
    /// Frist fuer einen Schreibvorgang
    pub schreib_timeout_sek: u64,
    /// Intervall der globalen Liveness-Pings
    pub liveness_intervall_sek: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
    /// Frist fuer den Auth-Frame nach dem Verbindungsaufbau
    pub handshake_timeout_sek: u64,
}

impl Default for HubEinstellungen {
    fn default() -> Self {
        let hub = HubConfig::default();
        Self {
            queue_kapazitaet: hub.queue_kapazitaet,
            befehl_queue_kapazitaet: hub.befehl_queue_kapazitaet,
            lese_timeout_sek: hub.lese_timeout.as_secs(),
            schreib_timeout_sek: hub.schreib_timeout.as_secs(),
            liveness_intervall_sek: hub.liveness_intervall.as_secs(),
            max_frame_groesse: hub.max_frame_groesse,
            handshake_timeout_sek: 10,
        }
    }
}

impl HubEinstellungen {
    /// Uebersetzt die Sektion in eine `HubConfig`
    pub fn hub_config(&self) -> HubConfig {
        let mut config = HubConfig::default()
            .mit_lese_timeout(Duration::from_secs(self.lese_timeout_sek))
            .mit_queue_kapazitaet(self.queue_kapazitaet)
            .mit_liveness_intervall(Duration::from_secs(self.liveness_intervall_sek));
        config.befehl_queue_kapazitaet = self.befehl_queue_kapazitaet;
        config.schreib_timeout = Duration::from_secs(self.schreib_timeout_sek);
        config.max_frame_groesse = self.max_frame_groesse;
        config
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_sek)
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

/// Token-Tabelle fuer den statischen Token-Pruefer
///
/// ```toml
/// [auth]
/// widerrufen = ["alt-token"]
///
/// [auth.tokens]
/// "geheim-123" = "6f1c2a4e-0000-4000-8000-000000000001"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEinstellungen {
    /// Token -> User-ID
    pub tokens: HashMap<String, Uuid>,
    /// Widerrufene Tokens (haben Vorrang vor `tokens`)
    pub widerrufen: Vec<String>,
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Gibt die vollstaendige Bind-Adresse fuer Client-Verbindungen zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.observability.port)
    }
}
