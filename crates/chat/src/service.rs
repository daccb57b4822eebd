//! ChatService – Nachrichten senden, editieren, loeschen, Verlauf

use std::sync::Arc;

use chrono::Utc;
use funkhaus_core::{RoomId, UserId};
use uuid::Uuid;

use crate::{
    error::{ChatError, ChatResult},
    storage::NachrichtenSpeicher,
    types::{ChatNachricht, NachrichtenTyp, VerlaufAnfrage, MAX_INHALT_ZEICHEN},
};

/// ChatService verwaltet Text-Nachrichten in Raeumen
pub struct ChatService<S: NachrichtenSpeicher> {
    speicher: Arc<S>,
}

impl<S: NachrichtenSpeicher> ChatService<S> {
    /// Erstellt einen neuen ChatService
    pub fn neu(speicher: Arc<S>) -> Arc<Self> {
        Arc::new(Self { speicher })
    }

    /// Nachricht in einem Raum ablegen
    pub async fn nachricht_senden(
        &self,
        room_id: RoomId,
        user_id: UserId,
        content: &str,
        message_type: NachrichtenTyp,
    ) -> ChatResult<ChatNachricht> {
        inhalt_pruefen(content)?;

        let nachricht = ChatNachricht {
            id: Uuid::new_v4(),
            room_id,
            user_id,
            content: content.to_string(),
            message_type,
            created_at: Utc::now(),
            edited_at: None,
        };
        self.speicher.speichern(&nachricht).await?;
        Ok(nachricht)
    }

    /// Nachricht editieren (nur eigene Nachrichten)
    pub async fn nachricht_editieren(
        &self,
        message_id: Uuid,
        user_id: UserId,
        new_content: &str,
    ) -> ChatResult<ChatNachricht> {
        inhalt_pruefen(new_content)?;

        let existing = self.eigene_nachricht(message_id, user_id, "editieren").await?;
        let nachricht = self
            .speicher
            .inhalt_aendern(existing.id, new_content, Utc::now())
            .await?;
        Ok(nachricht)
    }

    /// Nachricht loeschen (nur eigene Nachrichten)
    ///
    /// Gibt die geloeschte Nachricht zurueck (fuer die Raum-Benachrichtigung).
    pub async fn nachricht_loeschen(
        &self,
        message_id: Uuid,
        user_id: UserId,
    ) -> ChatResult<ChatNachricht> {
        let existing = self.eigene_nachricht(message_id, user_id, "loeschen").await?;
        if !self.speicher.loeschen(message_id).await? {
            return Err(ChatError::NachrichtNichtGefunden(message_id.to_string()));
        }
        Ok(existing)
    }

    /// Verlauf eines Raums laden, neueste zuerst
    pub async fn verlauf_laden(&self, anfrage: VerlaufAnfrage) -> ChatResult<Vec<ChatNachricht>> {
        self.speicher
            .verlauf(anfrage.room_id, anfrage.before, anfrage.effektives_limit())
            .await
    }

    async fn eigene_nachricht(
        &self,
        message_id: Uuid,
        user_id: UserId,
        aktion: &str,
    ) -> ChatResult<ChatNachricht> {
        let existing = self
            .speicher
            .laden(message_id)
            .await?
            .ok_or_else(|| ChatError::NachrichtNichtGefunden(message_id.to_string()))?;

        if existing.user_id != user_id {
            return Err(ChatError::KeineBerechtigung(format!(
                "Nur der Verfasser kann die Nachricht {aktion}"
            )));
        }
        Ok(existing)
    }
}

fn inhalt_pruefen(content: &str) -> ChatResult<()> {
    if content.trim().is_empty() {
        return Err(ChatError::UngueltigeEingabe(
            "Nachrichteninhalt darf nicht leer sein".into(),
        ));
    }

    let zeichen = content.chars().count();
    if zeichen > MAX_INHALT_ZEICHEN {
        return Err(ChatError::UngueltigeEingabe(format!(
            "Nachricht zu lang: {zeichen} Zeichen (Maximum: {MAX_INHALT_ZEICHEN})"
        )));
    }
    Ok(())
}
