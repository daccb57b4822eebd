//! Dispatcher – der einzige Schreiber der Registry
//!
//! Alle Mutationen (Registrieren, Abmelden, Beitreten, Verlassen) und alle
//! Fan-out-Auftraege laufen als `HubBefehl` durch eine einzige Queue und
//! werden von genau einem Task in Eingangsreihenfolge abgearbeitet. Damit
//! sind Mitgliedschaftsaenderungen linearisiert und ein Fan-out sieht immer
//! eine konsistente Raum-Menge.
//!
//! ```text
//! Verbindungen / Collaborators
//!     |  HubBefehl (mpsc, FIFO)
//!     v
//! Dispatcher-Task ---> MembershipRegistry ---> Send-Queues
//! ```
//!
//! `Hub` ist das oeffentliche Handle: billig klonbar, alle Klone teilen
//! denselben Dispatcher.

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt, TryStreamExt};
use funkhaus_core::{ConnectionId, RoomId, UserId};
use funkhaus_protocol::{FrameCodec, HubFrame};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::client::ClientHandle;
use crate::config::HubConfig;
use crate::connection::Verbindung;
use crate::error::{HubError, HubResult};
use crate::handler::NachrichtenHandler;
use crate::liveness::liveness_schleife;
use crate::registry::{MembershipRegistry, PraesenzEreignis};
use crate::statistik::{HubStatistik, StatistikSnapshot};

// ---------------------------------------------------------------------------
// Zustellung
// ---------------------------------------------------------------------------

/// Empfaenger eines Fan-out-Auftrags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellziel {
    /// Genau eine Verbindung
    Verbindung(ConnectionId),
    /// Alle Verbindungen (Geraete) eines Benutzers
    Benutzer(UserId),
    /// Alle Verbindungen in einem Raum, optional ohne eine Verbindung
    Raum {
        raum: RoomId,
        ausgenommen: Option<ConnectionId>,
    },
}

/// Einmal serialisierte Nutzlast samt Ziel
#[derive(Debug, Clone)]
pub struct AusgehendeNachricht {
    pub ziel: Zustellziel,
    pub nutzlast: Bytes,
}

impl AusgehendeNachricht {
    /// Serialisiert einen Frame fuer ein Ziel
    pub fn aus_frame(ziel: Zustellziel, frame: &HubFrame) -> HubResult<Self> {
        Ok(Self {
            ziel,
            nutzlast: frame.zu_bytes()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Befehle
// ---------------------------------------------------------------------------

pub(crate) enum HubBefehl {
    Registrieren {
        handle: Arc<ClientHandle>,
        antwort: oneshot::Sender<HubResult<()>>,
    },
    Abmelden {
        verbindung: ConnectionId,
        antwort: oneshot::Sender<bool>,
    },
    Beitreten {
        verbindung: ConnectionId,
        raum: RoomId,
        antwort: oneshot::Sender<HubResult<()>>,
    },
    Verlassen {
        verbindung: ConnectionId,
        raum: RoomId,
        antwort: oneshot::Sender<HubResult<()>>,
    },
    Zustellen(AusgehendeNachricht),
    /// Bestaetigt, sobald alle vorher eingereihten Befehle verarbeitet sind
    Barriere(oneshot::Sender<()>),
}

fn befehl_ausfuehren(registry: &MembershipRegistry, befehl: HubBefehl) {
    match befehl {
        HubBefehl::Registrieren { handle, antwort } => {
            let _ = antwort.send(registry.registrieren(handle));
        }
        HubBefehl::Abmelden {
            verbindung,
            antwort,
        } => {
            let _ = antwort.send(registry.abmelden(verbindung));
        }
        HubBefehl::Beitreten {
            verbindung,
            raum,
            antwort,
        } => {
            let _ = antwort.send(registry.beitreten(verbindung, raum));
        }
        HubBefehl::Verlassen {
            verbindung,
            raum,
            antwort,
        } => {
            let _ = antwort.send(registry.verlassen(verbindung, raum));
        }
        HubBefehl::Zustellen(nachricht) => {
            let anzahl = registry.zustellen(&nachricht);
            tracing::trace!(ziel = ?nachricht.ziel, empfaenger = anzahl, "Nachricht verteilt");
        }
        HubBefehl::Barriere(antwort) => {
            let _ = antwort.send(());
        }
    }
}

async fn dispatcher_schleife(
    registry: Arc<MembershipRegistry>,
    mut befehl_rx: mpsc::Receiver<HubBefehl>,
    abbruch: CancellationToken,
) {
    tracing::info!("Dispatcher gestartet");
    loop {
        tokio::select! {
            biased;
            _ = abbruch.cancelled() => break,
            befehl = befehl_rx.recv() => match befehl {
                Some(befehl) => befehl_ausfuehren(&registry, befehl),
                None => break,
            },
        }
    }

    // Wartende Befehle verwerfen: ihre Antwortkanaele schliessen sich,
    // Aufrufer erhalten `HubError::Beendet`
    befehl_rx.close();
    // Auch ohne `herunterfahren` (alle Handles verworfen) endet Liveness mit
    abbruch.cancel();
    let geschlossen = registry.alle_schliessen();
    tracing::info!(verbindungen = geschlossen, "Dispatcher beendet");
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Oeffentliches Handle auf den laufenden Hub
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    config: HubConfig,
    registry: Arc<MembershipRegistry>,
    statistik: Arc<HubStatistik>,
    befehl_tx: mpsc::Sender<HubBefehl>,
    abbruch: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Hub {
    /// Startet Dispatcher und Liveness-Task
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn starten(config: HubConfig) -> HubResult<Self> {
        config.validieren()?;

        let statistik = Arc::new(HubStatistik::neu());
        let registry = Arc::new(MembershipRegistry::neu(Arc::clone(&statistik)));
        let (befehl_tx, befehl_rx) = mpsc::channel(config.befehl_queue_kapazitaet);
        let abbruch = CancellationToken::new();

        let dispatcher = tokio::spawn(dispatcher_schleife(
            Arc::clone(&registry),
            befehl_rx,
            abbruch.clone(),
        ));
        let liveness = tokio::spawn(liveness_schleife(
            Arc::clone(&registry),
            config.liveness_intervall,
            abbruch.clone(),
        ));

        tracing::info!(
            queue_kapazitaet = config.queue_kapazitaet,
            lese_timeout_ms = config.lese_timeout.as_millis() as u64,
            "Hub gestartet"
        );

        Ok(Self {
            inner: Arc::new(HubInner {
                config,
                registry,
                statistik,
                befehl_tx,
                abbruch,
                tasks: Mutex::new(vec![dispatcher, liveness]),
            }),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Direkter Lesezugriff auf die Registry (Snapshots)
    pub fn registry(&self) -> &Arc<MembershipRegistry> {
        &self.inner.registry
    }

    pub fn statistik(&self) -> StatistikSnapshot {
        self.inner.statistik.snapshot()
    }

    pub fn ist_beendet(&self) -> bool {
        self.inner.abbruch.is_cancelled()
    }

    async fn befehl_senden(&self, befehl: HubBefehl) -> HubResult<()> {
        self.inner
            .befehl_tx
            .send(befehl)
            .await
            .map_err(|_| HubError::Beendet)
    }

    async fn mit_antwort<T>(
        &self,
        bauen: impl FnOnce(oneshot::Sender<T>) -> HubBefehl,
    ) -> HubResult<T> {
        let (tx, rx) = oneshot::channel();
        self.befehl_senden(bauen(tx)).await?;
        rx.await.map_err(|_| HubError::Beendet)
    }

    // -----------------------------------------------------------------------
    // Verbindungen
    // -----------------------------------------------------------------------

    /// Registriert eine Verbindung und gibt Handle und Empfangsseite zurueck
    pub(crate) async fn registrieren(
        &self,
        user_id: UserId,
    ) -> HubResult<(Arc<ClientHandle>, mpsc::Receiver<Bytes>)> {
        if self.ist_beendet() {
            return Err(HubError::Beendet);
        }
        let (handle, rx) = ClientHandle::neu(
            user_id,
            self.inner.config.queue_kapazitaet,
            self.inner.abbruch.child_token(),
            Arc::clone(&self.inner.statistik),
        );
        let zu_registrieren = Arc::clone(&handle);
        self.mit_antwort(|antwort| HubBefehl::Registrieren {
            handle: zu_registrieren,
            antwort,
        })
        .await??;
        Ok((handle, rx))
    }

    /// Nimmt eine authentifizierte Verbindung auf und startet ihre Schleifen
    ///
    /// `stream` liefert dekodierte Frames, `sink` nimmt serialisierte Frames
    /// entgegen. Gibt die neue Verbindungs-ID zurueck.
    pub async fn verbinden<S, K>(
        &self,
        user_id: UserId,
        stream: S,
        sink: K,
        handler: Arc<dyn NachrichtenHandler>,
    ) -> HubResult<ConnectionId>
    where
        S: Stream<Item = HubResult<HubFrame>> + Send + Unpin + 'static,
        K: Sink<Bytes, Error = HubError> + Send + Unpin + 'static,
    {
        let (handle, sende_rx) = self.registrieren(user_id).await?;
        let id = handle.id();
        Verbindung::neu(handle, self.clone(), handler).starten(stream, sink, sende_rx);
        Ok(id)
    }

    /// Wie `verbinden`, fuer einen bereits gerahmten Byte-Transport
    pub async fn verbinden_framed<T>(
        &self,
        user_id: UserId,
        framed: Framed<T, FrameCodec>,
        handler: Arc<dyn NachrichtenHandler>,
    ) -> HubResult<ConnectionId>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (sink, stream) = framed.split::<Bytes>();
        let stream = stream.map_err(HubError::from);
        let sink = sink.sink_map_err(HubError::from);
        self.verbinden(user_id, stream, sink, handler).await
    }

    /// Wie `verbinden`, fuer einen rohen Byte-Transport (TCP, Duplex, ...)
    pub async fn verbinden_transport<T>(
        &self,
        user_id: UserId,
        transport: T,
        handler: Arc<dyn NachrichtenHandler>,
    ) -> HubResult<ConnectionId>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let codec = FrameCodec::with_max_size(self.inner.config.max_frame_groesse);
        self.verbinden_framed(user_id, Framed::new(transport, codec), handler)
            .await
    }

    /// Entfernt eine Verbindung; unbekannte Verbindungen sind ein Fehler
    pub async fn abmelden(&self, verbindung: ConnectionId) -> HubResult<()> {
        let entfernt = self
            .mit_antwort(|antwort| HubBefehl::Abmelden {
                verbindung,
                antwort,
            })
            .await?;
        if entfernt {
            Ok(())
        } else {
            Err(HubError::UnbekannteVerbindung(verbindung))
        }
    }

    pub async fn raum_beitreten(&self, verbindung: ConnectionId, raum: RoomId) -> HubResult<()> {
        self.mit_antwort(|antwort| HubBefehl::Beitreten {
            verbindung,
            raum,
            antwort,
        })
        .await?
    }

    pub async fn raum_verlassen(&self, verbindung: ConnectionId, raum: RoomId) -> HubResult<()> {
        self.mit_antwort(|antwort| HubBefehl::Verlassen {
            verbindung,
            raum,
            antwort,
        })
        .await?
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Reiht einen Fan-out-Auftrag ein, ohne auf die Verteilung zu warten
    pub async fn zustellen(&self, nachricht: AusgehendeNachricht) -> HubResult<()> {
        self.befehl_senden(HubBefehl::Zustellen(nachricht)).await
    }

    pub async fn an_verbindung_senden(
        &self,
        verbindung: ConnectionId,
        frame: &HubFrame,
    ) -> HubResult<()> {
        self.zustellen(AusgehendeNachricht::aus_frame(
            Zustellziel::Verbindung(verbindung),
            frame,
        )?)
        .await
    }

    /// Sendet an alle Geraete eines Benutzers
    pub async fn an_benutzer_senden(&self, user_id: UserId, frame: &HubFrame) -> HubResult<()> {
        self.zustellen(AusgehendeNachricht::aus_frame(
            Zustellziel::Benutzer(user_id),
            frame,
        )?)
        .await
    }

    /// Sendet an alle Verbindungen eines Raums, optional ohne `ausgenommen`
    pub async fn an_raum_senden(
        &self,
        raum: RoomId,
        frame: &HubFrame,
        ausgenommen: Option<ConnectionId>,
    ) -> HubResult<()> {
        self.zustellen(AusgehendeNachricht::aus_frame(
            Zustellziel::Raum { raum, ausgenommen },
            frame,
        )?)
        .await
    }

    /// Wartet, bis alle bisher eingereihten Befehle verarbeitet sind
    pub async fn synchronisieren(&self) -> HubResult<()> {
        self.mit_antwort(HubBefehl::Barriere).await
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn raum_mitglieder(&self, raum: &RoomId) -> HashSet<UserId> {
        self.inner.registry.raum_mitglieder(raum)
    }

    pub fn online_benutzer(&self) -> HashSet<UserId> {
        self.inner.registry.online_benutzer()
    }

    pub fn verbindung(&self, id: &ConnectionId) -> Option<Arc<ClientHandle>> {
        self.inner.registry.verbindung(id)
    }

    pub fn praesenz_abonnieren(&self) -> broadcast::Receiver<PraesenzEreignis> {
        self.inner.registry.ereignisse_abonnieren()
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Beendet Dispatcher, Liveness und alle Verbindungen
    ///
    /// Nach der Rueckkehr ist die Registry leer und jede Operation liefert
    /// `HubError::Beendet`.
    pub async fn herunterfahren(&self) {
        tracing::info!("Hub wird heruntergefahren");
        self.inner.abbruch.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Hub-Task nicht sauber beendet");
            }
        }
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("verbindungen", &self.inner.registry.verbindungs_anzahl())
            .field("beendet", &self.ist_beendet())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
