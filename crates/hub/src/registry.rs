//! Mitgliedschafts-Registry – wer ist verbunden, wer ist in welchem Raum
//!
//! Drei Karten unter einem gemeinsamen Lock:
//!
//! - `verbindungen`: ConnectionId -> ClientHandle (globale Tabelle)
//! - `benutzer`: UserId -> Verbindungen (ein Benutzer, mehrere Geraete)
//! - `raeume`: RoomId -> Verbindungen
//!
//! Schreibende Operationen sind `pub(crate)` und werden ausschliesslich vom
//! Dispatcher-Task aufgerufen. Lesende Snapshots duerfen von ueberall kommen.
//!
//! Garantien nach jeder Operation:
//! - jede Verbindung in einem Raum steht auch in der globalen Tabelle
//! - die Raum-Menge eines Handles entspricht genau den Raeumen, in denen es
//!   eingetragen ist
//! - leere Raeume und Benutzer ohne Verbindung werden sofort entfernt

use bytes::Bytes;
use funkhaus_core::{ConnectionId, RoomId, UserId};
use funkhaus_protocol::HubFrame;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::client::{ClientHandle, VerbindungsZustand};
use crate::dispatcher::{AusgehendeNachricht, Zustellziel};
use crate::error::{HubError, HubResult};
use crate::statistik::HubStatistik;

/// Puffergroesse des Praesenz-Ereignis-Kanals
const EREIGNIS_KANAL_GROESSE: usize = 256;

// ---------------------------------------------------------------------------
// Praesenz-Ereignisse
// ---------------------------------------------------------------------------

/// Online/Offline-Uebergang eines Benutzers (nicht einer einzelnen Verbindung)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PraesenzEreignis {
    /// Erste Verbindung des Benutzers wurde registriert
    BenutzerOnline { user_id: UserId },
    /// Letzte Verbindung des Benutzers wurde entfernt
    BenutzerOffline { user_id: UserId },
}

// ---------------------------------------------------------------------------
// Karten
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Karten {
    verbindungen: HashMap<ConnectionId, Arc<ClientHandle>>,
    benutzer: HashMap<UserId, HashSet<ConnectionId>>,
    raeume: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl Karten {
    fn an_alle(&self, nachricht: &Bytes) -> usize {
        self.verbindungen
            .values()
            .filter(|h| h.senden(nachricht.clone()))
            .count()
    }

    fn an_raum(&self, raum: &RoomId, nachricht: &Bytes, ausgenommen: Option<ConnectionId>) -> usize {
        let Some(mitglieder) = self.raeume.get(raum) else {
            return 0;
        };
        mitglieder
            .iter()
            .filter(|id| Some(**id) != ausgenommen)
            .filter_map(|id| self.verbindungen.get(id))
            .filter(|h| h.senden(nachricht.clone()))
            .count()
    }

    fn an_benutzer(&self, user_id: &UserId, nachricht: &Bytes) -> usize {
        let Some(verbindungen) = self.benutzer.get(user_id) else {
            return 0;
        };
        verbindungen
            .iter()
            .filter_map(|id| self.verbindungen.get(id))
            .filter(|h| h.senden(nachricht.clone()))
            .count()
    }

    /// Benutzer eines Raums, dedupliziert ueber Geraete
    fn benutzer_im_raum(&self, raum: &RoomId) -> HashSet<UserId> {
        self.raeume
            .get(raum)
            .map(|mitglieder| {
                mitglieder
                    .iter()
                    .filter_map(|id| self.verbindungen.get(id))
                    .map(|h| h.user_id())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Traegt eine Verbindung aus einem Raum aus und benachrichtigt die
    /// verbleibenden Mitglieder. Leere Raeume werden ohne Hinweis geloescht.
    fn aus_raum_austragen(&mut self, handle: &ClientHandle, raum: RoomId) {
        let Some(mitglieder) = self.raeume.get_mut(&raum) else {
            return;
        };
        if !mitglieder.remove(&handle.id()) {
            return;
        }
        if mitglieder.is_empty() {
            self.raeume.remove(&raum);
            tracing::debug!(raum = %raum, "Leerer Raum entfernt");
            return;
        }
        if let Some(bytes) = kodieren(&HubFrame::raum_verlassen(raum, handle.user_id())) {
            self.an_raum(&raum, &bytes, None);
        }
    }
}

fn kodieren(frame: &HubFrame) -> Option<Bytes> {
    match frame.zu_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::error!(typ = %frame.typ, fehler = %e, "Hinweis-Frame nicht serialisierbar");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// MembershipRegistry
// ---------------------------------------------------------------------------

/// Verbindungs-, Benutzer- und Raumtabellen des Hubs
pub struct MembershipRegistry {
    karten: RwLock<Karten>,
    ereignis_tx: broadcast::Sender<PraesenzEreignis>,
    statistik: Arc<HubStatistik>,
}

impl MembershipRegistry {
    pub(crate) fn neu(statistik: Arc<HubStatistik>) -> Self {
        let (ereignis_tx, _) = broadcast::channel(EREIGNIS_KANAL_GROESSE);
        Self {
            karten: RwLock::new(Karten::default()),
            ereignis_tx,
            statistik,
        }
    }

    fn ereignis_senden(&self, ereignis: PraesenzEreignis) {
        // Keine Abonnenten ist kein Fehler
        let _ = self.ereignis_tx.send(ereignis);
    }

    // -----------------------------------------------------------------------
    // Mutationen (nur Dispatcher)
    // -----------------------------------------------------------------------

    /// Nimmt eine neue Verbindung in die globale Tabelle auf
    ///
    /// Ist es die erste Verbindung des Benutzers, erhalten alle Verbindungen
    /// (auch die neue) ein `user_online`.
    pub(crate) fn registrieren(&self, handle: Arc<ClientHandle>) -> HubResult<()> {
        let id = handle.id();
        let user_id = handle.user_id();
        let mut karten = self.karten.write();

        if karten.verbindungen.contains_key(&id) {
            tracing::error!(verbindung = %id, "Verbindung doppelt registriert");
            debug_assert!(false, "ConnectionId {id} doppelt registriert");
            return Err(HubError::DoppelteRegistrierung(id));
        }

        karten.verbindungen.insert(id, handle);
        let geraete = karten.benutzer.entry(user_id).or_default();
        let erste = geraete.is_empty();
        geraete.insert(id);
        self.statistik.verbindung_zaehlen();

        tracing::info!(
            verbindung = %id,
            user_id = %user_id,
            verbindungen = karten.verbindungen.len(),
            "Verbindung registriert"
        );

        if erste {
            if let Some(bytes) = kodieren(&HubFrame::benutzer_online(user_id)) {
                karten.an_alle(&bytes);
            }
            self.ereignis_senden(PraesenzEreignis::BenutzerOnline { user_id });
        }
        Ok(())
    }

    /// Entfernt eine Verbindung vollstaendig
    ///
    /// Idempotent: gibt `false` zurueck wenn die Verbindung nicht (mehr)
    /// registriert ist. Die Send-Queue wird geschlossen, die Ausgangsschleife
    /// leert den Rest und beendet sich.
    pub(crate) fn abmelden(&self, id: ConnectionId) -> bool {
        let mut karten = self.karten.write();
        let Some(handle) = karten.verbindungen.remove(&id) else {
            return false;
        };
        let user_id = handle.user_id();

        for raum in handle.raeume_nehmen() {
            karten.aus_raum_austragen(&handle, raum);
        }

        let mut letzte = false;
        if let Some(geraete) = karten.benutzer.get_mut(&user_id) {
            geraete.remove(&id);
            if geraete.is_empty() {
                karten.benutzer.remove(&user_id);
                letzte = true;
            }
        }

        handle.schliessen();

        tracing::info!(
            verbindung = %id,
            user_id = %user_id,
            verbindungen = karten.verbindungen.len(),
            "Verbindung abgemeldet"
        );

        if letzte {
            if let Some(bytes) = kodieren(&HubFrame::benutzer_offline(user_id)) {
                karten.an_alle(&bytes);
            }
            self.ereignis_senden(PraesenzEreignis::BenutzerOffline { user_id });
        }
        true
    }

    /// Fuegt eine aktive Verbindung einem Raum hinzu
    ///
    /// Die uebrigen Mitglieder erhalten `room_join`, der Beitretende die
    /// aktuelle Benutzerliste (`room_users`). Ein erneuter Beitritt schickt
    /// nur die Benutzerliste.
    pub(crate) fn beitreten(&self, id: ConnectionId, raum: RoomId) -> HubResult<()> {
        let mut karten = self.karten.write();
        let handle = karten
            .verbindungen
            .get(&id)
            .cloned()
            .ok_or(HubError::UnbekannteVerbindung(id))?;
        if handle.zustand() != VerbindungsZustand::Aktiv {
            return Err(HubError::NichtAktiv(id));
        }

        let neu = karten.raeume.entry(raum).or_default().insert(id);
        if neu {
            handle.raum_hinzufuegen(raum);
            if let Some(bytes) = kodieren(&HubFrame::raum_beitritt(raum, handle.user_id())) {
                karten.an_raum(&raum, &bytes, Some(id));
            }
            tracing::debug!(verbindung = %id, raum = %raum, "Raum betreten");
        }

        let mut benutzer: Vec<UserId> = karten.benutzer_im_raum(&raum).into_iter().collect();
        benutzer.sort();
        handle.frame_senden(&HubFrame::raum_benutzer(raum, handle.user_id(), &benutzer));
        Ok(())
    }

    /// Entfernt eine Verbindung aus einem Raum; kein Mitglied ist kein Fehler
    pub(crate) fn verlassen(&self, id: ConnectionId, raum: RoomId) -> HubResult<()> {
        let mut karten = self.karten.write();
        let handle = karten
            .verbindungen
            .get(&id)
            .cloned()
            .ok_or(HubError::UnbekannteVerbindung(id))?;

        if handle.raum_entfernen(&raum) {
            karten.aus_raum_austragen(&handle, raum);
            tracing::debug!(verbindung = %id, raum = %raum, "Raum verlassen");
        }
        Ok(())
    }

    /// Verteilt bereits serialisierte Bytes an das Ziel
    ///
    /// Gibt die Anzahl erfolgreich eingereihter Kopien zurueck.
    pub(crate) fn zustellen(&self, nachricht: &AusgehendeNachricht) -> usize {
        let karten = self.karten.read();
        match &nachricht.ziel {
            Zustellziel::Verbindung(id) => karten
                .verbindungen
                .get(id)
                .map(|h| usize::from(h.senden(nachricht.nutzlast.clone())))
                .unwrap_or(0),
            Zustellziel::Benutzer(user_id) => karten.an_benutzer(user_id, &nachricht.nutzlast),
            Zustellziel::Raum { raum, ausgenommen } => {
                karten.an_raum(raum, &nachricht.nutzlast, *ausgenommen)
            }
        }
    }

    /// Schickt einen Liveness-Ping an alle registrierten Verbindungen
    pub(crate) fn ping_an_alle(&self) -> usize {
        let Some(bytes) = kodieren(&HubFrame::ping()) else {
            return 0;
        };
        self.karten.read().an_alle(&bytes)
    }

    /// Schliesst alle Verbindungen ohne Hinweise (Shutdown)
    pub(crate) fn alle_schliessen(&self) -> usize {
        let mut karten = self.karten.write();
        let anzahl = karten.verbindungen.len();
        for handle in karten.verbindungen.values() {
            handle.raeume_nehmen();
            handle.schliessen();
        }
        *karten = Karten::default();
        anzahl
    }

    // -----------------------------------------------------------------------
    // Lesende Snapshots
    // -----------------------------------------------------------------------

    /// Benutzer in einem Raum (dedupliziert ueber Geraete)
    pub fn raum_mitglieder(&self, raum: &RoomId) -> HashSet<UserId> {
        self.karten.read().benutzer_im_raum(raum)
    }

    /// Benutzer mit mindestens einer Verbindung
    pub fn online_benutzer(&self) -> HashSet<UserId> {
        self.karten.read().benutzer.keys().copied().collect()
    }

    pub fn ist_online(&self, user_id: &UserId) -> bool {
        self.karten.read().benutzer.contains_key(user_id)
    }

    pub fn verbindung(&self, id: &ConnectionId) -> Option<Arc<ClientHandle>> {
        self.karten.read().verbindungen.get(id).cloned()
    }

    /// Verbindungen (Geraete) eines Benutzers
    pub fn verbindungen_von(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.karten
            .read()
            .benutzer
            .get(user_id)
            .map(|geraete| geraete.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn verbindungs_anzahl(&self) -> usize {
        self.karten.read().verbindungen.len()
    }

    pub fn benutzer_anzahl(&self) -> usize {
        self.karten.read().benutzer.len()
    }

    pub fn raum_anzahl(&self) -> usize {
        self.karten.read().raeume.len()
    }

    pub fn ereignisse_abonnieren(&self) -> broadcast::Receiver<PraesenzEreignis> {
        self.ereignis_tx.subscribe()
    }

    /// Prueft die Konsistenz der drei Karten
    #[cfg(test)]
    pub(crate) fn invarianten_pruefen(&self) {
        let karten = self.karten.read();
        for (raum, mitglieder) in &karten.raeume {
            assert!(!mitglieder.is_empty(), "leerer Raum {raum} nicht entfernt");
            for id in mitglieder {
                let handle = karten
                    .verbindungen
                    .get(id)
                    .unwrap_or_else(|| panic!("{id} in {raum}, aber nicht registriert"));
                assert!(handle.ist_im_raum(raum), "Raum-Menge von {id} fehlt {raum}");
            }
        }
        for (id, handle) in &karten.verbindungen {
            for raum in handle.raeume() {
                assert!(
                    karten.raeume.get(&raum).is_some_and(|m| m.contains(id)),
                    "{id} glaubt an {raum}, ist dort aber nicht eingetragen"
                );
            }
            assert!(karten
                .benutzer
                .get(&handle.user_id())
                .is_some_and(|g| g.contains(id)));
        }
        for geraete in karten.benutzer.values() {
            assert!(!geraete.is_empty());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
