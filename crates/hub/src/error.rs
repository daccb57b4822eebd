//! Fehlertypen fuer den Hub

use funkhaus_core::{ConnectionId, FunkhausError};
use thiserror::Error;

/// Fehlertyp fuer den Hub
#[derive(Debug, Error)]
pub enum HubError {
    /// IO-Fehler (Transport, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Serialisierungs- oder Konfigurationsfehler aus funkhaus-core
    #[error("{0}")]
    Kern(#[from] FunkhausError),

    /// Verbindung ist nicht (mehr) registriert
    #[error("Unbekannte Verbindung: {0}")]
    UnbekannteVerbindung(ConnectionId),

    /// Verbindungs-ID ist bereits registriert
    #[error("Verbindung bereits registriert: {0}")]
    DoppelteRegistrierung(ConnectionId),

    /// Verbindung ist nicht im Zustand `Aktiv`
    #[error("Verbindung nicht aktiv: {0}")]
    NichtAktiv(ConnectionId),

    /// Schreiben oder Lesen hat die Frist ueberschritten
    #[error("Timeout")]
    Timeout,

    /// Hub wurde heruntergefahren
    #[error("Hub beendet")]
    Beendet,
}

/// Result-Typ fuer den Hub
pub type HubResult<T> = Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let id = ConnectionId::new();
        let e = HubError::UnbekannteVerbindung(id);
        assert_eq!(e.to_string(), format!("Unbekannte Verbindung: {id}"));
        assert_eq!(HubError::Beendet.to_string(), "Hub beendet");
    }

    #[test]
    fn io_fehler_konvertierbar() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "weg");
        let e: HubError = io.into();
        assert!(matches!(e, HubError::Io(_)));
    }
}
