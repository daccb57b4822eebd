//! Schnittstelle fuer anwendungsspezifische Frames
//!
//! Der Hub verarbeitet `room_join`, `room_leave` und `pong` selbst. Alle
//! anderen Frames gehen an einen `NachrichtenHandler` (z.B. den Chat).

use async_trait::async_trait;
use funkhaus_protocol::{ErrorCode, HubFrame};
use thiserror::Error;

use crate::client::ClientHandle;

/// Fehler eines Handlers; wird dem Absender als `error`-Frame gemeldet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{nachricht}")]
pub struct HandlerFehler {
    pub code: ErrorCode,
    pub nachricht: String,
}

impl HandlerFehler {
    pub fn neu(code: ErrorCode, nachricht: impl Into<String>) -> Self {
        Self {
            code,
            nachricht: nachricht.into(),
        }
    }

    pub fn ungueltig(nachricht: impl Into<String>) -> Self {
        Self::neu(ErrorCode::InvalidRequest, nachricht)
    }

    pub fn intern(nachricht: impl Into<String>) -> Self {
        Self::neu(ErrorCode::InternalError, nachricht)
    }
}

/// Verarbeitet eingehende Frames, die der Hub nicht selbst behandelt
///
/// `frame.user_id` ist bereits mit der authentifizierten Identitaet
/// ueberschrieben. Antworten laufen ueber den `Hub` oder direkt ueber
/// `verbindung.frame_senden`.
#[async_trait]
pub trait NachrichtenHandler: Send + Sync + 'static {
    async fn verarbeiten(
        &self,
        verbindung: &ClientHandle,
        frame: HubFrame,
    ) -> Result<(), HandlerFehler>;
}
