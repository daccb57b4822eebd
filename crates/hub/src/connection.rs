//! Verbindungs-Schleifen – Eingang und Ausgang einer Verbindung
//!
//! Jede Verbindung laeuft in zwei Tasks:
//!
//! - **Eingang**: liest Frames mit Lese-Frist, behandelt `room_join`,
//!   `room_leave` und `pong` selbst und reicht alles andere an den
//!   `NachrichtenHandler`. Jeder empfangene Frame verlaengert die Frist.
//! - **Ausgang**: leert die Send-Queue gestapelt (ein Flush pro Stapel) und
//!   schickt nach `probe_intervall` ohne ausgehenden Verkehr einen `ping`.
//!
//! Endet eine der beiden Schleifen, wird das Verbindungs-Token abgebrochen
//! und die andere folgt. Die Eingangsschleife meldet die Verbindung danach
//! beim Dispatcher ab.

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use funkhaus_protocol::{ErrorCode, FrameTyp, HubFrame};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::client::ClientHandle;
use crate::dispatcher::Hub;
use crate::error::{HubError, HubResult};
use crate::handler::NachrichtenHandler;

/// Grund fuer das Ende der Eingangsschleife
#[derive(Debug)]
enum Trennungsgrund {
    /// Gegenseite hat den Transport geschlossen
    Geschlossen,
    /// Lese-Frist abgelaufen
    Timeout,
    /// Transport- oder Dekodierfehler
    Fehler(HubError),
    /// Verbindungs- oder Hub-Token abgebrochen
    Abgebrochen,
}

// ---------------------------------------------------------------------------
// Verbindung
// ---------------------------------------------------------------------------

pub(crate) struct Verbindung {
    handle: Arc<ClientHandle>,
    hub: Hub,
    handler: Arc<dyn NachrichtenHandler>,
}

impl Verbindung {
    pub(crate) fn neu(
        handle: Arc<ClientHandle>,
        hub: Hub,
        handler: Arc<dyn NachrichtenHandler>,
    ) -> Self {
        Self {
            handle,
            hub,
            handler,
        }
    }

    /// Aktiviert die Verbindung und startet beide Schleifen
    pub(crate) fn starten<S, K>(self, stream: S, sink: K, sende_rx: mpsc::Receiver<Bytes>)
    where
        S: Stream<Item = HubResult<HubFrame>> + Send + Unpin + 'static,
        K: Sink<Bytes, Error = HubError> + Send + Unpin + 'static,
    {
        let config = self.hub.config();
        let lese_timeout = config.lese_timeout;
        let probe_intervall = config.probe_intervall;
        let schreib_timeout = config.schreib_timeout;

        self.handle.aktivieren();
        tracing::debug!(verbindung = %self.handle.id(), "Verbindung aktiv");

        tokio::spawn(ausgangs_schleife(
            Arc::clone(&self.handle),
            sink,
            sende_rx,
            probe_intervall,
            schreib_timeout,
        ));
        tokio::spawn(self.eingangs_schleife(stream, lese_timeout));
    }

    async fn eingangs_schleife<S>(self, mut stream: S, lese_timeout: Duration)
    where
        S: Stream<Item = HubResult<HubFrame>> + Send + Unpin + 'static,
    {
        let id = self.handle.id();
        let abbruch = self.handle.abbruch();

        let grund = loop {
            let naechstes = tokio::select! {
                _ = abbruch.cancelled() => break Trennungsgrund::Abgebrochen,
                ergebnis = tokio::time::timeout(lese_timeout, stream.next()) => ergebnis,
            };
            let frame = match naechstes {
                Err(_) => break Trennungsgrund::Timeout,
                Ok(None) => break Trennungsgrund::Geschlossen,
                Ok(Some(Err(e))) => break Trennungsgrund::Fehler(e),
                Ok(Some(Ok(frame))) => frame,
            };
            if let Err(e) = self.frame_verarbeiten(frame).await {
                break Trennungsgrund::Fehler(e);
            }
        };

        match &grund {
            Trennungsgrund::Geschlossen => {
                tracing::info!(verbindung = %id, "Verbindung vom Client getrennt");
            }
            Trennungsgrund::Timeout => {
                self.handle.statistik().timeout_zaehlen();
                tracing::warn!(verbindung = %id, "Lese-Timeout – Verbindung wird getrennt");
            }
            Trennungsgrund::Fehler(e) => {
                tracing::warn!(verbindung = %id, fehler = %e, "Lesefehler – Verbindung wird getrennt");
            }
            Trennungsgrund::Abgebrochen => {
                tracing::debug!(verbindung = %id, "Eingangsschleife abgebrochen");
            }
        }

        self.handle.schliessen_beginnen();
        abbruch.cancel();
        drop(stream);

        match self.hub.abmelden(id).await {
            Ok(()) => {}
            // Bereits entfernt (Shutdown oder externe Abmeldung)
            Err(HubError::UnbekannteVerbindung(_)) | Err(HubError::Beendet) => {}
            Err(e) => tracing::warn!(verbindung = %id, fehler = %e, "Abmeldung fehlgeschlagen"),
        }
    }

    /// Behandelt einen eingehenden Frame
    ///
    /// Gibt nur dann einen Fehler zurueck, wenn die Verbindung beendet
    /// werden muss.
    async fn frame_verarbeiten(&self, mut frame: HubFrame) -> HubResult<()> {
        let id = self.handle.id();
        frame.user_id = Some(self.handle.user_id());

        if !frame.typ.ist_hub_lokal() {
            let typ = frame.typ.clone();
            if let Err(f) = self.handler.verarbeiten(&self.handle, frame).await {
                tracing::debug!(
                    verbindung = %id,
                    typ = %typ,
                    code = ?f.code,
                    fehler = %f,
                    "Frame abgelehnt"
                );
                self.handle.fehler_senden(f.code, f.nachricht);
            }
            return Ok(());
        }

        if frame.typ == FrameTyp::Pong {
            tracing::trace!(verbindung = %id, "Pong empfangen");
            return Ok(());
        }

        // room_join / room_leave
        let Some(raum) = frame.room_id else {
            self.handle
                .fehler_senden(ErrorCode::InvalidRequest, "room_id fehlt");
            return Ok(());
        };
        let ergebnis = if frame.typ == FrameTyp::RoomJoin {
            self.hub.raum_beitreten(id, raum).await
        } else {
            self.hub.raum_verlassen(id, raum).await
        };
        match ergebnis {
            Ok(()) => Ok(()),
            Err(HubError::Beendet) => Err(HubError::Beendet),
            Err(e) => {
                // Verbindung wird gerade abgemeldet
                tracing::debug!(verbindung = %id, fehler = %e, "Raumoperation ignoriert");
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Ausgangsschleife
// ---------------------------------------------------------------------------

async fn ausgangs_schleife<K>(
    handle: Arc<ClientHandle>,
    mut sink: K,
    mut sende_rx: mpsc::Receiver<Bytes>,
    probe_intervall: Duration,
    schreib_timeout: Duration,
) where
    K: Sink<Bytes, Error = HubError> + Send + Unpin + 'static,
{
    let id = handle.id();
    let abbruch = handle.abbruch();
    let mut ticker = interval_at(Instant::now() + probe_intervall, probe_intervall);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = abbruch.cancelled() => break,
            nachricht = sende_rx.recv() => {
                let Some(erste) = nachricht else {
                    tracing::debug!(verbindung = %id, "Send-Queue geschlossen");
                    break;
                };
                if let Err(e) = stapel_schreiben(&mut sink, &mut sende_rx, erste, schreib_timeout).await {
                    tracing::warn!(verbindung = %id, fehler = %e, "Schreiben fehlgeschlagen");
                    break;
                }
                ticker.reset();
            }
            _ = ticker.tick() => {
                if !sende_rx.is_empty() {
                    continue;
                }
                let ping = match HubFrame::ping().zu_bytes() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::error!(fehler = %e, "Ping nicht serialisierbar");
                        continue;
                    }
                };
                let gesendet = tokio::time::timeout(schreib_timeout, sink.send(ping)).await;
                if !matches!(gesendet, Ok(Ok(()))) {
                    tracing::warn!(verbindung = %id, "Ping fehlgeschlagen");
                    break;
                }
            }
        }
    }

    // Schliessen der Schreibrichtung ist der Abschluss-Hinweis an den Client
    if tokio::time::timeout(schreib_timeout, sink.close()).await.is_err() {
        tracing::debug!(verbindung = %id, "Transport nicht rechtzeitig geschlossen");
    }
    handle.schliessen_beginnen();
    abbruch.cancel();
    tracing::debug!(verbindung = %id, "Ausgangsschleife beendet");
}

/// Schreibt eine Nachricht plus alles bereits Wartende mit einem Flush
async fn stapel_schreiben<K>(
    sink: &mut K,
    sende_rx: &mut mpsc::Receiver<Bytes>,
    erste: Bytes,
    schreib_timeout: Duration,
) -> HubResult<()>
where
    K: Sink<Bytes, Error = HubError> + Unpin,
{
    let schreiben = async {
        sink.feed(erste).await?;
        while let Ok(weitere) = sende_rx.try_recv() {
            sink.feed(weitere).await?;
        }
        sink.flush().await
    };
    tokio::time::timeout(schreib_timeout, schreiben)
        .await
        .map_err(|_| HubError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn stapel_wird_vollstaendig_geschrieben() {
        let (tx, mut rx) = mpsc::channel(8);
        for i in 0..3u8 {
            tx.try_send(Bytes::from(vec![i])).unwrap();
        }
        let geschrieben = Arc::new(Mutex::new(Vec::new()));
        let mut sink = Box::pin(sink::unfold(
            Arc::clone(&geschrieben),
            |ziel: Arc<Mutex<Vec<Bytes>>>, b: Bytes| async move {
                ziel.lock().push(b);
                Ok::<_, HubError>(ziel)
            },
        ));

        stapel_schreiben(
            &mut sink,
            &mut rx,
            Bytes::from_static(b"erste"),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

        let geschrieben = geschrieben.lock();
        assert_eq!(geschrieben.len(), 4);
        assert_eq!(geschrieben[0], Bytes::from_static(b"erste"));
        assert!(rx.try_recv().is_err());
    }
}
