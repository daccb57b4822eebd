//! Frame-Umschlag fuer Hub-Verbindungen
//!
//! Jede Nachricht in beide Richtungen ist ein `HubFrame`:
//!
//! ```json
//! {"type":"message","room_id":"…","user_id":"…","data":{…},"timestamp":"…"}
//! ```
//!
//! - `type` ist ein offener String-Enum: unbekannte Typen bleiben als
//!   `FrameTyp::Andere` erhalten und werden unveraendert weitergereicht.
//! - `user_id` eingehender Frames wird vom Hub mit der authentifizierten
//!   Identitaet ueberschrieben, nie vom Draht uebernommen.
//! - `data` ist fuer den Hub opak.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use funkhaus_core::{Result, RoomId, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Frame-Typ
// ---------------------------------------------------------------------------

/// Typ eines Frames
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FrameTyp {
    Message,
    MessageEdit,
    MessageDelete,
    RoomJoin,
    RoomLeave,
    RoomUsers,
    UserOnline,
    UserOffline,
    Ping,
    Pong,
    Error,
    /// Alle uebrigen Typen (werden an den Nachrichten-Handler weitergereicht)
    Andere(String),
}

impl FrameTyp {
    /// Draht-Darstellung des Typs
    pub fn als_str(&self) -> &str {
        match self {
            Self::Message => "message",
            Self::MessageEdit => "message_edit",
            Self::MessageDelete => "message_delete",
            Self::RoomJoin => "room_join",
            Self::RoomLeave => "room_leave",
            Self::RoomUsers => "room_users",
            Self::UserOnline => "user_online",
            Self::UserOffline => "user_offline",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Error => "error",
            Self::Andere(s) => s,
        }
    }

    /// Typen, die der Hub selbst verarbeitet statt sie weiterzureichen
    pub fn ist_hub_lokal(&self) -> bool {
        matches!(self, Self::RoomJoin | Self::RoomLeave | Self::Pong)
    }
}

impl From<String> for FrameTyp {
    fn from(s: String) -> Self {
        match s.as_str() {
            "message" => Self::Message,
            "message_edit" => Self::MessageEdit,
            "message_delete" => Self::MessageDelete,
            "room_join" => Self::RoomJoin,
            "room_leave" => Self::RoomLeave,
            "room_users" => Self::RoomUsers,
            "user_online" => Self::UserOnline,
            "user_offline" => Self::UserOffline,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "error" => Self::Error,
            _ => Self::Andere(s),
        }
    }
}

impl From<FrameTyp> for String {
    fn from(typ: FrameTyp) -> Self {
        match typ {
            FrameTyp::Andere(s) => s,
            bekannt => bekannt.als_str().to_string(),
        }
    }
}

impl std::fmt::Display for FrameTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes in `error`-Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InternalError,
    InvalidRequest,
    NotFound,
    NotInRoom,
    PermissionDenied,
    Unauthorized,
    ServerFull,
}

/// Inhalt von `data` in einem `error`-Frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FehlerDaten {
    pub code: ErrorCode,
    pub error: String,
}

// ---------------------------------------------------------------------------
// HubFrame
// ---------------------------------------------------------------------------

/// Der gemeinsame Umschlag fuer eingehende und ausgehende Frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubFrame {
    #[serde(rename = "type")]
    pub typ: FrameTyp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl HubFrame {
    /// Erstellt einen leeren Frame mit aktuellem Zeitstempel
    pub fn new(typ: FrameTyp) -> Self {
        Self {
            typ,
            room_id: None,
            user_id: None,
            data: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn mit_raum(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    pub fn mit_benutzer(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Setzt `data` auf die JSON-Darstellung von `daten`
    pub fn mit_daten<T: Serialize>(mut self, daten: &T) -> Result<Self> {
        self.data = serde_json::to_value(daten)?;
        Ok(self)
    }

    /// Liveness-Probe ohne Nutzlast
    pub fn ping() -> Self {
        Self::new(FrameTyp::Ping)
    }

    /// Strukturierte Fehlermeldung an den Client
    pub fn fehler(code: ErrorCode, nachricht: impl Into<String>) -> Self {
        let daten = FehlerDaten {
            code,
            error: nachricht.into(),
        };
        let mut frame = Self::new(FrameTyp::Error);
        // FehlerDaten besteht nur aus String-Feldern, to_value kann nicht scheitern
        frame.data = serde_json::to_value(daten).unwrap_or(Value::Null);
        frame
    }

    /// `room_join`-Hinweis an die uebrigen Raummitglieder
    pub fn raum_beitritt(room_id: RoomId, user_id: UserId) -> Self {
        Self::new(FrameTyp::RoomJoin)
            .mit_raum(room_id)
            .mit_benutzer(user_id)
    }

    /// `room_leave`-Hinweis an die verbleibenden Raummitglieder
    pub fn raum_verlassen(room_id: RoomId, user_id: UserId) -> Self {
        Self::new(FrameTyp::RoomLeave)
            .mit_raum(room_id)
            .mit_benutzer(user_id)
    }

    /// `room_users`-Antwort an den Beitretenden (`data` = Liste der User-IDs)
    pub fn raum_benutzer(room_id: RoomId, user_id: UserId, benutzer: &[UserId]) -> Self {
        let mut frame = Self::new(FrameTyp::RoomUsers)
            .mit_raum(room_id)
            .mit_benutzer(user_id);
        frame.data = Value::Array(
            benutzer
                .iter()
                .map(|uid| Value::String(uid.inner().to_string()))
                .collect(),
        );
        frame
    }

    pub fn benutzer_online(user_id: UserId) -> Self {
        Self::new(FrameTyp::UserOnline).mit_benutzer(user_id)
    }

    pub fn benutzer_offline(user_id: UserId) -> Self {
        Self::new(FrameTyp::UserOffline).mit_benutzer(user_id)
    }

    /// Deserialisiert `data` in einen konkreten Typ
    pub fn daten_als<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Fehlerdaten, falls dies ein `error`-Frame ist
    pub fn fehler_daten(&self) -> Option<FehlerDaten> {
        if self.typ != FrameTyp::Error {
            return None;
        }
        self.daten_als().ok()
    }

    /// Serialisiert den Frame einmalig; das Ergebnis wird beim Fan-out geteilt
    pub fn zu_bytes(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn aus_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
