//! Fehlertypen fuer das Chat-Crate

use funkhaus_core::{FunkhausError, RoomId};
use funkhaus_hub::{HandlerFehler, HubError};
use funkhaus_protocol::ErrorCode;
use thiserror::Error;

/// Chat-Fehlertypen
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Nicht im Raum: {0}")]
    NichtImRaum(RoomId),

    #[error("Nachricht nicht gefunden: {0}")]
    NachrichtNichtGefunden(String),

    #[error("Keine Berechtigung: {0}")]
    KeineBerechtigung(String),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterTyp(String),

    #[error("Ungueltige Nachricht: {0}")]
    Nachricht(#[from] FunkhausError),

    #[error("Speicher-Fehler: {0}")]
    SpeicherFehler(String),

    #[error("Hub-Fehler: {0}")]
    Hub(#[from] HubError),
}

pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    /// Fehler-Code fuer den `error`-Frame an den Client
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NichtImRaum(_) => ErrorCode::NotInRoom,
            Self::NachrichtNichtGefunden(_) => ErrorCode::NotFound,
            Self::KeineBerechtigung(_) => ErrorCode::PermissionDenied,
            Self::UngueltigeEingabe(_) | Self::UnbekannterTyp(_) | Self::Nachricht(_) => {
                ErrorCode::InvalidRequest
            }
            Self::SpeicherFehler(_) | Self::Hub(_) => ErrorCode::InternalError,
        }
    }
}

impl From<ChatError> for HandlerFehler {
    fn from(e: ChatError) -> Self {
        let code = e.code();
        // Interne Details bleiben im Log
        let nachricht = match code {
            ErrorCode::InternalError => "Interner Fehler".to_string(),
            _ => e.to_string(),
        };
        HandlerFehler::neu(code, nachricht)
    }
}
