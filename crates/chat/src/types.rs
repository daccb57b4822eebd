//! Oeffentliche Typen fuer den Chat-Service

use chrono::{DateTime, Utc};
use funkhaus_core::{RoomId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximale Laenge eines Nachrichteninhalts in Zeichen
pub const MAX_INHALT_ZEICHEN: usize = 4096;

/// Standard-Seitengroesse beim Verlauf
pub const STANDARD_VERLAUF_LIMIT: usize = 50;

/// Obergrenze der Seitengroesse beim Verlauf
pub const MAX_VERLAUF_LIMIT: usize = 100;

/// Nachrichtentyp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NachrichtenTyp {
    #[default]
    Text,
    Image,
    File,
}

/// Eine gespeicherte Chat-Nachricht; auch `data` des ausgehenden `message`-Frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatNachricht {
    pub id: Uuid,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: NachrichtenTyp,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Eingehende Nutzlasten
// ---------------------------------------------------------------------------

/// `data` eines eingehenden `message`-Frames
#[derive(Debug, Clone, Deserialize)]
pub struct NachrichtPayload {
    pub content: String,
    #[serde(default, rename = "type")]
    pub message_type: Option<NachrichtenTyp>,
}

/// `data` eines eingehenden `message_edit`-Frames
#[derive(Debug, Clone, Deserialize)]
pub struct BearbeitenPayload {
    pub message_id: Uuid,
    pub content: String,
}

/// `data` eines eingehenden `message_delete`-Frames
#[derive(Debug, Clone, Deserialize)]
pub struct LoeschenPayload {
    pub message_id: Uuid,
}

// ---------------------------------------------------------------------------
// Ausgehende Nutzlasten
// ---------------------------------------------------------------------------

/// `data` eines ausgehenden `message_edit`-Frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearbeitetDaten {
    pub message_id: Uuid,
    pub content: String,
    pub edited_at: DateTime<Utc>,
}

/// `data` eines ausgehenden `message_delete`-Frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeloeschtDaten {
    pub message_id: Uuid,
}

/// Cursor-basierte Paginierung fuer den Nachrichten-Verlauf
#[derive(Debug, Clone)]
pub struct VerlaufAnfrage {
    pub room_id: RoomId,
    /// Lade Nachrichten vor diesem Zeitstempel
    pub before: Option<DateTime<Utc>>,
    /// Maximale Anzahl (Default: 50, hoechstens 100)
    pub limit: Option<usize>,
}

impl VerlaufAnfrage {
    pub fn neu(room_id: RoomId) -> Self {
        Self {
            room_id,
            before: None,
            limit: None,
        }
    }

    /// Effektive Seitengroesse, begrenzt auf 1..=100
    pub fn effektives_limit(&self) -> usize {
        self.limit
            .unwrap_or(STANDARD_VERLAUF_LIMIT)
            .clamp(1, MAX_VERLAUF_LIMIT)
    }
}
