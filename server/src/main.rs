//! Funkhaus Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use funkhaus_observability::logging::{log_format_gueltig, log_level_gueltig};
use funkhaus_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("FUNKHAUS_CONFIG").unwrap_or_else(|_| "config.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ServerConfig::laden(&config_pfad)?;

    // FH_LOG_LEVEL / FH_LOG_FORMAT haben Vorrang vor der Datei
    funkhaus_observability::logging_initialisieren(&config.logging.level, &config.logging.format);

    if !log_level_gueltig(&config.logging.level) || !log_format_gueltig(&config.logging.format) {
        tracing::warn!(
            level = %config.logging.level,
            format = %config.logging.format,
            "Ungewoehnliche [logging]-Werte"
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Funkhaus Server wird initialisiert"
    );

    Server::neu(config).starten().await
}
