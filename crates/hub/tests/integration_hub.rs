//! Integration-Tests fuer den Hub ueber In-Memory-Transporte (tokio::io::duplex)

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use funkhaus_core::{ConnectionId, RoomId, UserId};
use funkhaus_hub::{ClientHandle, HandlerFehler, Hub, HubConfig, NachrichtenHandler};
use funkhaus_protocol::{ErrorCode, FrameCodec, FrameTyp, HubFrame};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

const WARTEZEIT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Hilfen
// ---------------------------------------------------------------------------

/// Leitet Frames mit `room_id` an den Raum weiter (ohne Absender)
struct Weiterleitung {
    hub: Hub,
}

#[async_trait]
impl NachrichtenHandler for Weiterleitung {
    async fn verarbeiten(
        &self,
        verbindung: &ClientHandle,
        frame: HubFrame,
    ) -> Result<(), HandlerFehler> {
        let raum = frame
            .room_id
            .ok_or_else(|| HandlerFehler::ungueltig("room_id fehlt"))?;
        if !verbindung.ist_im_raum(&raum) {
            return Err(HandlerFehler::neu(ErrorCode::NotInRoom, "nicht im Raum"));
        }
        self.hub
            .an_raum_senden(raum, &frame, Some(verbindung.id()))
            .await
            .map_err(|e| HandlerFehler::intern(e.to_string()))
    }
}

struct TestClient {
    id: ConnectionId,
    user_id: UserId,
    framed: Framed<DuplexStream, FrameCodec>,
}

impl TestClient {
    async fn verbinden(hub: &Hub, user_id: UserId) -> Self {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let handler = Arc::new(Weiterleitung { hub: hub.clone() });
        let id = hub
            .verbinden_transport(user_id, server_io, handler)
            .await
            .expect("Verbinden fehlgeschlagen");
        Self {
            id,
            user_id,
            framed: Framed::new(client_io, FrameCodec::new()),
        }
    }

    async fn senden(&mut self, frame: HubFrame) {
        self.framed
            .send(frame.zu_bytes().unwrap())
            .await
            .expect("Senden fehlgeschlagen");
    }

    async fn beitreten(&mut self, raum: RoomId) -> HubFrame {
        self.senden(HubFrame::new(FrameTyp::RoomJoin).mit_raum(raum))
            .await;
        self.erwarten(FrameTyp::RoomUsers).await
    }

    async fn naechster(&mut self) -> Option<HubFrame> {
        tokio::time::timeout(WARTEZEIT, self.framed.next())
            .await
            .expect("Timeout beim Empfangen")
            .map(|r| r.expect("Dekodierfehler"))
    }

    /// Wartet auf den naechsten Frame des Typs, Pings werden uebersprungen
    async fn erwarten(&mut self, typ: FrameTyp) -> HubFrame {
        loop {
            let frame = self.naechster().await.expect("Verbindung unerwartet beendet");
            if frame.typ == typ {
                return frame;
            }
            assert!(
                matches!(frame.typ, FrameTyp::Ping | FrameTyp::UserOnline),
                "unerwarteter Frame {:?}, erwartet {typ}",
                frame.typ
            );
        }
    }

    /// Sammelt alle Frames, die innerhalb kurzer Zeit ankommen (ohne Pings)
    async fn rest(&mut self) -> Vec<HubFrame> {
        let mut frames = Vec::new();
        while let Ok(Some(Ok(frame))) =
            tokio::time::timeout(Duration::from_millis(150), self.framed.next()).await
        {
            if frame.typ != FrameTyp::Ping {
                frames.push(frame);
            }
        }
        frames
    }

    /// Wartet, bis der Hub den Transport schliesst
    async fn ende_abwarten(&mut self) {
        while self.naechster().await.is_some() {}
    }
}

/// Wartet, bis die Eingangsschleife die Verbindung abgemeldet hat
async fn abmeldung_abwarten(hub: &Hub, id: ConnectionId) {
    tokio::time::timeout(WARTEZEIT, async {
        while hub.verbindung(&id).is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Verbindung wurde nicht abgemeldet");
}

fn hub() -> Hub {
    Hub::starten(HubConfig::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Raeume und Fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn nachricht_erreicht_raum_ohne_absender() {
    let hub = hub();
    let raum = RoomId::new();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;
    let mut b = TestClient::verbinden(&hub, UserId::new()).await;

    a.beitreten(raum).await;
    let liste = b.beitreten(raum).await;
    let ids: HashSet<UserId> = liste.daten_als().unwrap();
    assert_eq!(ids, HashSet::from([a.user_id, b.user_id]));

    let beitritt = a.erwarten(FrameTyp::RoomJoin).await;
    assert_eq!(beitritt.user_id, Some(b.user_id));

    a.senden(
        HubFrame::new(FrameTyp::Message)
            .mit_raum(raum)
            .mit_daten(&serde_json::json!({"content": "hallo"}))
            .unwrap(),
    )
    .await;

    let empfangen = b.erwarten(FrameTyp::Message).await;
    assert_eq!(empfangen.data["content"], "hallo");
    assert_eq!(empfangen.user_id, Some(a.user_id));
    assert!(a.rest().await.is_empty());

    hub.herunterfahren().await;
}

#[tokio::test]
async fn user_id_wird_ueberschrieben() {
    let hub = hub();
    let raum = RoomId::new();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;
    let mut b = TestClient::verbinden(&hub, UserId::new()).await;
    a.beitreten(raum).await;
    b.beitreten(raum).await;

    let gefaelscht = UserId::new();
    a.senden(
        HubFrame::new(FrameTyp::Andere("typing".into()))
            .mit_raum(raum)
            .mit_benutzer(gefaelscht),
    )
    .await;

    let frame = b.erwarten(FrameTyp::Andere("typing".into())).await;
    assert_eq!(frame.user_id, Some(a.user_id));

    hub.herunterfahren().await;
}

#[tokio::test]
async fn verlassen_benachrichtigt_verbleibende() {
    let hub = hub();
    let raum = RoomId::new();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;
    let mut b = TestClient::verbinden(&hub, UserId::new()).await;
    a.beitreten(raum).await;
    b.beitreten(raum).await;
    a.erwarten(FrameTyp::RoomJoin).await;

    b.senden(HubFrame::new(FrameTyp::RoomLeave).mit_raum(raum))
        .await;
    let frame = a.erwarten(FrameTyp::RoomLeave).await;
    assert_eq!(frame.user_id, Some(b.user_id));
    assert_eq!(frame.room_id, Some(raum));

    hub.synchronisieren().await.unwrap();
    assert_eq!(hub.raum_mitglieder(&raum), HashSet::from([a.user_id]));

    hub.herunterfahren().await;
}

#[tokio::test]
async fn raumbefehl_ohne_room_id_liefert_fehler() {
    let hub = hub();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;

    a.senden(HubFrame::new(FrameTyp::RoomJoin)).await;
    let fehler = a.erwarten(FrameTyp::Error).await;
    assert_eq!(fehler.fehler_daten().unwrap().code, ErrorCode::InvalidRequest);

    hub.herunterfahren().await;
}

#[tokio::test]
async fn handler_fehler_wird_gemeldet() {
    let hub = hub();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;

    a.senden(HubFrame::new(FrameTyp::Message).mit_raum(RoomId::new()))
        .await;
    let fehler = a.erwarten(FrameTyp::Error).await;
    assert_eq!(fehler.fehler_daten().unwrap().code, ErrorCode::NotInRoom);

    // Verbindung bleibt bestehen
    hub.synchronisieren().await.unwrap();
    assert!(hub.verbindung(&a.id).is_some());

    hub.herunterfahren().await;
}

#[tokio::test]
async fn pong_erreicht_handler_nicht() {
    let hub = hub();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;
    a.erwarten(FrameTyp::UserOnline).await;

    // Der Handler wuerde einen Frame ohne room_id mit einem Fehler beantworten
    a.senden(HubFrame::new(FrameTyp::Pong)).await;
    assert!(a.rest().await.is_empty());

    hub.herunterfahren().await;
}

// ---------------------------------------------------------------------------
// Praesenz
// ---------------------------------------------------------------------------

#[tokio::test]
async fn praesenz_ueber_mehrere_geraete() {
    let hub = hub();
    let mut beobachter = TestClient::verbinden(&hub, UserId::new()).await;
    beobachter.erwarten(FrameTyp::UserOnline).await;

    let u = UserId::new();
    let mut telefon = TestClient::verbinden(&hub, u).await;
    let online = beobachter.erwarten(FrameTyp::UserOnline).await;
    assert_eq!(online.user_id, Some(u));

    let laptop = TestClient::verbinden(&hub, u).await;
    assert!(beobachter.rest().await.is_empty());

    drop(laptop);
    assert!(beobachter.rest().await.is_empty());
    assert!(hub.online_benutzer().contains(&u));

    telefon.framed.close().await.unwrap();
    let offline = beobachter.erwarten(FrameTyp::UserOffline).await;
    assert_eq!(offline.user_id, Some(u));
    assert!(!hub.online_benutzer().contains(&u));

    hub.herunterfahren().await;
}

// ---------------------------------------------------------------------------
// Liveness und Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stiller_client_wird_getrennt() {
    let config = HubConfig::default().mit_lese_timeout(Duration::from_millis(300));
    let hub = Hub::starten(config).unwrap();
    let raum = RoomId::new();
    let mut still = TestClient::verbinden(&hub, UserId::new()).await;
    let mut aktiv = TestClient::verbinden(&hub, UserId::new()).await;
    still.beitreten(raum).await;
    aktiv.beitreten(raum).await;

    // Der aktive Client antwortet weiter, der stille schweigt
    let mut verlassen = false;
    let mut offline = false;
    tokio::time::timeout(WARTEZEIT, async {
        while !(verlassen && offline) {
            match tokio::time::timeout(Duration::from_millis(100), aktiv.framed.next()).await {
                Err(_) => aktiv.senden(HubFrame::new(FrameTyp::Pong)).await,
                Ok(Some(Ok(frame))) => {
                    aktiv.senden(HubFrame::new(FrameTyp::Pong)).await;
                    match frame.typ {
                        FrameTyp::RoomLeave if frame.user_id == Some(still.user_id) => {
                            assert_eq!(frame.room_id, Some(raum));
                            verlassen = true;
                        }
                        FrameTyp::UserOffline if frame.user_id == Some(still.user_id) => {
                            offline = true;
                        }
                        _ => {}
                    }
                }
                Ok(_) => panic!("aktiver Client wurde getrennt"),
            }
        }
    })
    .await
    .expect("room_leave / user_offline nicht empfangen");

    still.ende_abwarten().await;
    abmeldung_abwarten(&hub, still.id).await;
    assert_eq!(hub.statistik().timeouts, 1);
    assert_eq!(hub.raum_mitglieder(&raum), HashSet::from([aktiv.user_id]));
    assert!(!hub.online_benutzer().contains(&still.user_id));
    assert!(hub.verbindung(&aktiv.id).is_some());

    hub.herunterfahren().await;
}

#[tokio::test]
async fn jeder_frame_verlaengert_die_frist() {
    let config = HubConfig::default().mit_lese_timeout(Duration::from_millis(500));
    let hub = Hub::starten(config).unwrap();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;

    for _ in 0..8 {
        tokio::time::sleep(Duration::from_millis(150)).await;
        a.senden(HubFrame::new(FrameTyp::Pong)).await;
    }

    hub.synchronisieren().await.unwrap();
    assert!(hub.verbindung(&a.id).is_some());

    hub.herunterfahren().await;
}

#[tokio::test]
async fn leerlauf_loest_ping_aus() {
    let config = HubConfig::default().mit_lese_timeout(Duration::from_millis(400));
    let hub = Hub::starten(config).unwrap();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;

    a.erwarten(FrameTyp::Ping).await;

    hub.herunterfahren().await;
}

#[tokio::test]
async fn shutdown_schliesst_alle_verbindungen() {
    let hub = hub();
    let mut a = TestClient::verbinden(&hub, UserId::new()).await;
    let mut b = TestClient::verbinden(&hub, UserId::new()).await;

    hub.herunterfahren().await;
    a.ende_abwarten().await;
    b.ende_abwarten().await;

    assert!(hub.online_benutzer().is_empty());
    assert!(hub.raum_beitreten(a.id, RoomId::new()).await.is_err());
}
