//! Nachrichten-Speicher
//!
//! Das `NachrichtenSpeicher`-Trait abstrahiert den konkreten Speicher
//! (Datenbank, extern, ...). `ArbeitsspeicherSpeicher` haelt alles im RAM.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use funkhaus_core::RoomId;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::types::ChatNachricht;

/// Abstrakter Speicher fuer Chat-Nachrichten
#[async_trait]
pub trait NachrichtenSpeicher: Send + Sync + 'static {
    /// Neue Nachricht ablegen
    async fn speichern(&self, nachricht: &ChatNachricht) -> ChatResult<()>;

    /// Nachricht per ID laden
    async fn laden(&self, id: Uuid) -> ChatResult<Option<ChatNachricht>>;

    /// Inhalt ersetzen und `edited_at` setzen
    async fn inhalt_aendern(
        &self,
        id: Uuid,
        inhalt: &str,
        zeitpunkt: DateTime<Utc>,
    ) -> ChatResult<ChatNachricht>;

    /// Nachricht entfernen; `false` wenn sie nicht existierte
    async fn loeschen(&self, id: Uuid) -> ChatResult<bool>;

    /// Nachrichten eines Raums, neueste zuerst
    async fn verlauf(
        &self,
        room_id: RoomId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> ChatResult<Vec<ChatNachricht>>;
}

/// In-Memory-Speicher (Tests, Einzelinstanz ohne Persistenz)
#[derive(Debug, Default)]
pub struct ArbeitsspeicherSpeicher {
    nachrichten: DashMap<Uuid, ChatNachricht>,
}

impl ArbeitsspeicherSpeicher {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn anzahl(&self) -> usize {
        self.nachrichten.len()
    }
}

#[async_trait]
impl NachrichtenSpeicher for ArbeitsspeicherSpeicher {
    async fn speichern(&self, nachricht: &ChatNachricht) -> ChatResult<()> {
        if self.nachrichten.contains_key(&nachricht.id) {
            return Err(ChatError::SpeicherFehler(format!(
                "Nachricht {} existiert bereits",
                nachricht.id
            )));
        }
        self.nachrichten.insert(nachricht.id, nachricht.clone());
        tracing::debug!(message_id = %nachricht.id, raum = %nachricht.room_id, "Nachricht gespeichert");
        Ok(())
    }

    async fn laden(&self, id: Uuid) -> ChatResult<Option<ChatNachricht>> {
        Ok(self.nachrichten.get(&id).map(|n| n.value().clone()))
    }

    async fn inhalt_aendern(
        &self,
        id: Uuid,
        inhalt: &str,
        zeitpunkt: DateTime<Utc>,
    ) -> ChatResult<ChatNachricht> {
        let mut eintrag = self
            .nachrichten
            .get_mut(&id)
            .ok_or_else(|| ChatError::NachrichtNichtGefunden(id.to_string()))?;
        eintrag.content = inhalt.to_string();
        eintrag.edited_at = Some(zeitpunkt);
        Ok(eintrag.value().clone())
    }

    async fn loeschen(&self, id: Uuid) -> ChatResult<bool> {
        Ok(self.nachrichten.remove(&id).is_some())
    }

    async fn verlauf(
        &self,
        room_id: RoomId,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> ChatResult<Vec<ChatNachricht>> {
        let mut treffer: Vec<ChatNachricht> = self
            .nachrichten
            .iter()
            .filter(|n| n.room_id == room_id)
            .filter(|n| before.map_or(true, |grenze| n.created_at < grenze))
            .map(|n| n.value().clone())
            .collect();
        treffer.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        treffer.truncate(limit);
        Ok(treffer)
    }
}
