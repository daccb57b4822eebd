//! ChatHandler – verbindet den ChatService mit dem Hub
//!
//! Behandelt `message`, `message_edit` und `message_delete`. Jede
//! erfolgreiche Aenderung geht als Frame an den ganzen Raum, der Absender
//! erhaelt sein eigenes Echo.

use std::sync::Arc;

use async_trait::async_trait;
use funkhaus_hub::{ClientHandle, HandlerFehler, Hub, NachrichtenHandler};
use funkhaus_protocol::{FrameTyp, HubFrame};

use crate::{
    error::{ChatError, ChatResult},
    service::ChatService,
    storage::NachrichtenSpeicher,
    types::{
        BearbeitenPayload, BearbeitetDaten, ChatNachricht, GeloeschtDaten, LoeschenPayload,
        NachrichtPayload, VerlaufAnfrage,
    },
};

/// Nachrichten-Handler fuer Text-Chat
pub struct ChatHandler<S: NachrichtenSpeicher> {
    service: Arc<ChatService<S>>,
    hub: Hub,
}

impl<S: NachrichtenSpeicher> ChatHandler<S> {
    pub fn neu(service: Arc<ChatService<S>>, hub: Hub) -> Arc<Self> {
        Arc::new(Self { service, hub })
    }

    /// Verlauf eines Raums (fuer HTTP- oder Admin-Schnittstellen)
    pub async fn verlauf_laden(&self, anfrage: VerlaufAnfrage) -> ChatResult<Vec<ChatNachricht>> {
        self.service.verlauf_laden(anfrage).await
    }

    async fn nachricht(&self, verbindung: &ClientHandle, frame: HubFrame) -> ChatResult<()> {
        let raum = frame
            .room_id
            .ok_or_else(|| ChatError::UngueltigeEingabe("room_id fehlt".into()))?;
        if !verbindung.ist_im_raum(&raum) {
            return Err(ChatError::NichtImRaum(raum));
        }

        let payload: NachrichtPayload = frame.daten_als()?;
        let nachricht = self
            .service
            .nachricht_senden(
                raum,
                verbindung.user_id(),
                &payload.content,
                payload.message_type.unwrap_or_default(),
            )
            .await?;

        let antwort = HubFrame::new(FrameTyp::Message)
            .mit_raum(raum)
            .mit_benutzer(nachricht.user_id)
            .mit_daten(&nachricht)?;
        self.hub.an_raum_senden(raum, &antwort, None).await?;

        tracing::debug!(
            message_id = %nachricht.id,
            raum = %raum,
            user_id = %nachricht.user_id,
            "Nachricht verteilt"
        );
        Ok(())
    }

    async fn bearbeiten(&self, verbindung: &ClientHandle, frame: HubFrame) -> ChatResult<()> {
        let payload: BearbeitenPayload = frame.daten_als()?;
        let nachricht = self
            .service
            .nachricht_editieren(payload.message_id, verbindung.user_id(), &payload.content)
            .await?;

        let daten = BearbeitetDaten {
            message_id: nachricht.id,
            content: nachricht.content.clone(),
            edited_at: nachricht.edited_at.unwrap_or(nachricht.created_at),
        };
        let antwort = HubFrame::new(FrameTyp::MessageEdit)
            .mit_raum(nachricht.room_id)
            .mit_benutzer(nachricht.user_id)
            .mit_daten(&daten)?;
        self.hub.an_raum_senden(nachricht.room_id, &antwort, None).await?;
        Ok(())
    }

    async fn loeschen(&self, verbindung: &ClientHandle, frame: HubFrame) -> ChatResult<()> {
        let payload: LoeschenPayload = frame.daten_als()?;
        let nachricht = self
            .service
            .nachricht_loeschen(payload.message_id, verbindung.user_id())
            .await?;

        let antwort = HubFrame::new(FrameTyp::MessageDelete)
            .mit_raum(nachricht.room_id)
            .mit_benutzer(nachricht.user_id)
            .mit_daten(&GeloeschtDaten {
                message_id: nachricht.id,
            })?;
        self.hub.an_raum_senden(nachricht.room_id, &antwort, None).await?;
        Ok(())
    }
}

#[async_trait]
impl<S: NachrichtenSpeicher> NachrichtenHandler for ChatHandler<S> {
    async fn verarbeiten(
        &self,
        verbindung: &ClientHandle,
        frame: HubFrame,
    ) -> Result<(), HandlerFehler> {
        let typ = frame.typ.clone();
        let ergebnis = match typ {
            FrameTyp::Message => self.nachricht(verbindung, frame).await,
            FrameTyp::MessageEdit => self.bearbeiten(verbindung, frame).await,
            FrameTyp::MessageDelete => self.loeschen(verbindung, frame).await,
            andere => Err(ChatError::UnbekannterTyp(andere.to_string())),
        };

        ergebnis.map_err(|e| {
            match &e {
                ChatError::SpeicherFehler(_) | ChatError::Hub(_) => {
                    tracing::error!(verbindung = %verbindung.id(), fehler = %e, "Chat-Verarbeitung fehlgeschlagen");
                }
                _ => {
                    tracing::debug!(verbindung = %verbindung.id(), fehler = %e, "Chat-Frame abgelehnt");
                }
            }
            HandlerFehler::from(e)
        })
    }
}
