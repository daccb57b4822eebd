//! Client-Handle – Zustand einer einzelnen Verbindung
//!
//! Der `ClientHandle` gehoert der Registry. Er traegt die Send-Queue, die
//! Raum-Menge und den Lebenszyklus-Zustand einer Verbindung.
//!
//! ## Zustaende
//! ```text
//! Verbindend -> Aktiv -> Schliessend -> Geschlossen
//! ```
//!
//! Die Send-Queue liegt in einem `Option`: `schliessen()` nimmt den Sender
//! heraus, damit ist die Queue geschlossen und kann nie wieder befuellt
//! werden. Die Ausgangsschleife leert den Rest und beendet sich dann.

use bytes::Bytes;
use funkhaus_core::{ConnectionId, RoomId, UserId};
use funkhaus_protocol::{ErrorCode, HubFrame};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::statistik::HubStatistik;

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Lebenszyklus einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VerbindungsZustand {
    /// Registriert, Schleifen noch nicht gestartet
    Verbindend = 0,
    /// Beide Schleifen laufen
    Aktiv = 1,
    /// Eine Schleife hat sich beendet, Abmeldung laeuft
    Schliessend = 2,
    /// Aus der Registry entfernt, Queue geschlossen
    Geschlossen = 3,
}

impl VerbindungsZustand {
    fn aus_u8(wert: u8) -> Self {
        match wert {
            0 => Self::Verbindend,
            1 => Self::Aktiv,
            2 => Self::Schliessend,
            _ => Self::Geschlossen,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientHandle
// ---------------------------------------------------------------------------

/// Handle auf eine registrierte Verbindung
pub struct ClientHandle {
    id: ConnectionId,
    user_id: UserId,
    sende_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    raeume: Mutex<HashSet<RoomId>>,
    zustand: AtomicU8,
    abbruch: CancellationToken,
    statistik: Arc<HubStatistik>,
}

impl ClientHandle {
    /// Erstellt ein Handle im Zustand `Verbindend` samt Empfangsseite der Queue
    pub(crate) fn neu(
        user_id: UserId,
        kapazitaet: usize,
        abbruch: CancellationToken,
        statistik: Arc<HubStatistik>,
    ) -> (Arc<Self>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(kapazitaet);
        let handle = Arc::new(Self {
            id: ConnectionId::new(),
            user_id,
            sende_tx: Mutex::new(Some(tx)),
            raeume: Mutex::new(HashSet::new()),
            zustand: AtomicU8::new(VerbindungsZustand::Verbindend as u8),
            abbruch,
            statistik,
        });
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn zustand(&self) -> VerbindungsZustand {
        VerbindungsZustand::aus_u8(self.zustand.load(Ordering::Acquire))
    }

    pub fn ist_im_raum(&self, raum: &RoomId) -> bool {
        self.raeume.lock().contains(raum)
    }

    /// Raeume, in denen die Verbindung Mitglied ist (Kopie)
    pub fn raeume(&self) -> Vec<RoomId> {
        self.raeume.lock().iter().copied().collect()
    }

    /// Reiht bereits serialisierte Bytes nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist. Eine
    /// volle Queue verwirft die Nachricht, der Absender wartet nie.
    pub fn senden(&self, nachricht: Bytes) -> bool {
        let guard = self.sende_tx.lock();
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        match tx.try_send(nachricht) {
            Ok(()) => {
                self.statistik.zugestellt_zaehlen();
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.statistik.verworfen_zaehlen();
                tracing::warn!(
                    verbindung = %self.id,
                    user_id = %self.user_id,
                    "Send-Queue voll – Nachricht verworfen"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.id, "Send-Queue geschlossen");
                false
            }
        }
    }

    /// Serialisiert einen einzelnen Frame und reiht ihn ein
    pub fn frame_senden(&self, frame: &HubFrame) -> bool {
        match frame.zu_bytes() {
            Ok(bytes) => self.senden(bytes),
            Err(e) => {
                tracing::error!(verbindung = %self.id, fehler = %e, "Frame nicht serialisierbar");
                false
            }
        }
    }

    /// Sendet einen `error`-Frame an genau diese Verbindung
    pub fn fehler_senden(&self, code: ErrorCode, nachricht: impl Into<String>) -> bool {
        self.frame_senden(&HubFrame::fehler(code, nachricht))
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus (nur Hub-intern)
    // -----------------------------------------------------------------------

    pub(crate) fn statistik(&self) -> &HubStatistik {
        &self.statistik
    }

    pub(crate) fn abbruch(&self) -> CancellationToken {
        self.abbruch.clone()
    }

    /// `Verbindend -> Aktiv`; gibt `false` zurueck wenn bereits spaeter
    pub(crate) fn aktivieren(&self) -> bool {
        self.zustand
            .compare_exchange(
                VerbindungsZustand::Verbindend as u8,
                VerbindungsZustand::Aktiv as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Markiert die Verbindung als `Schliessend`, sofern nicht schon geschlossen
    pub(crate) fn schliessen_beginnen(&self) {
        let _ = self.zustand.fetch_update(Ordering::AcqRel, Ordering::Acquire, |z| {
            (z < VerbindungsZustand::Schliessend as u8)
                .then_some(VerbindungsZustand::Schliessend as u8)
        });
    }

    /// Schliesst die Send-Queue endgueltig
    pub(crate) fn schliessen(&self) {
        self.sende_tx.lock().take();
        self.zustand
            .store(VerbindungsZustand::Geschlossen as u8, Ordering::Release);
    }

    pub(crate) fn raum_hinzufuegen(&self, raum: RoomId) -> bool {
        self.raeume.lock().insert(raum)
    }

    pub(crate) fn raum_entfernen(&self, raum: &RoomId) -> bool {
        self.raeume.lock().remove(raum)
    }

    /// Leert die Raum-Menge und gibt die bisherigen Raeume zurueck
    pub(crate) fn raeume_nehmen(&self) -> Vec<RoomId> {
        self.raeume.lock().drain().collect()
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("zustand", &self.zustand())
            .finish()
    }
}
