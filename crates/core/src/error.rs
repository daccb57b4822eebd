//! Fehlertypen fuer Funkhaus
//!
//! Crate-uebergreifende Fehler. Hub und Chat definieren eigene Enums und
//! konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Funkhaus
pub type Result<T> = std::result::Result<T, FunkhausError>;

/// Crate-uebergreifende Fehlerzustaende
#[derive(Debug, Error)]
pub enum FunkhausError {
    /// Frame konnte nicht (de)serialisiert werden
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    /// Frame ueberschreitet die erlaubte Groesse
    #[error("Nachricht zu gross: {groesse} Bytes (Maximum: {maximum} Bytes)")]
    ZuGross { groesse: usize, maximum: usize },

    /// Ungueltige oder widerspruechliche Konfiguration
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl FunkhausError {
    /// Erstellt einen Konfigurationsfehler
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}

impl From<serde_json::Error> for FunkhausError {
    fn from(e: serde_json::Error) -> Self {
        Self::UngueltigeNachricht(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = FunkhausError::ZuGross {
            groesse: 10,
            maximum: 5,
        };
        assert_eq!(e.to_string(), "Nachricht zu gross: 10 Bytes (Maximum: 5 Bytes)");
    }

    #[test]
    fn serde_fehler_wird_ungueltige_nachricht() {
        let serde_fehler = serde_json::from_str::<u32>("kein json").unwrap_err();
        let e: FunkhausError = serde_fehler.into();
        assert!(matches!(e, FunkhausError::UngueltigeNachricht(_)));
    }
}
