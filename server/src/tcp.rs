//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Jede eingehende Verbindung wird mit dem `FrameCodec` gerahmt. Der erste
//! Frame muss ein `auth`-Frame sein:
//!
//! ```json
//! {"type":"auth","data":{"token":"…"}}
//! ```
//!
//! Erst nach erfolgreicher Token-Pruefung wird die Verbindung an den Hub
//! uebergeben. Abgelehnte Verbindungen erhalten einen `error`-Frame und
//! werden geschlossen.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use funkhaus_core::ConnectionId;
use funkhaus_hub::{Hub, HubError, NachrichtenHandler};
use funkhaus_protocol::{ErrorCode, FrameCodec, FrameTyp, HubFrame};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthFehler, TokenPruefer};

/// Frame-Typ des Handshakes
pub const AUTH_TYP: &str = "auth";

#[derive(Debug, Deserialize)]
struct AuthDaten {
    #[serde(default)]
    token: String,
}

/// Warum eine Verbindung nicht aufgenommen wurde
#[derive(Debug, Error)]
pub enum HandshakeFehler {
    #[error("Server voll")]
    ServerVoll,

    #[error("Kein auth-Frame innerhalb der Frist")]
    Timeout,

    #[error("Verbindung vor dem Handshake getrennt")]
    Getrennt,

    #[error("Erster Frame ist kein auth-Frame: {0}")]
    UnerwarteterFrame(FrameTyp),

    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Auth(#[from] AuthFehler),

    #[error("E/A-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Platz eines laufenden Handshakes; wird beim Drop freigegeben
struct HandshakePlatz(Arc<AtomicUsize>);

impl Drop for HandshakePlatz {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Nimmt Client-Verbindungen an und fuehrt den Auth-Handshake durch
#[derive(Clone)]
pub struct ClientListener {
    hub: Hub,
    pruefer: Arc<dyn TokenPruefer>,
    handler: Arc<dyn NachrichtenHandler>,
    max_verbindungen: usize,
    handshake_timeout: Duration,
    im_handshake: Arc<AtomicUsize>,
}

impl ClientListener {
    pub fn neu(
        hub: Hub,
        pruefer: Arc<dyn TokenPruefer>,
        handler: Arc<dyn NachrichtenHandler>,
        max_verbindungen: usize,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            hub,
            pruefer,
            handler,
            max_verbindungen,
            handshake_timeout,
            im_handshake: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Reserviert einen Platz fuer einen Handshake
    ///
    /// Laufende Handshakes zaehlen wie registrierte Verbindungen, damit
    /// gleichzeitige Verbindungsaufbauten die Grenze nicht ueberschreiten.
    /// Der Platz bleibt bis nach der Registrierung im Hub belegt.
    fn platz_reservieren(&self) -> Option<HandshakePlatz> {
        let laufend = self.im_handshake.fetch_add(1, Ordering::AcqRel);
        let platz = HandshakePlatz(Arc::clone(&self.im_handshake));
        if self.hub.registry().verbindungs_anzahl() + laufend >= self.max_verbindungen {
            return None;
        }
        Some(platz)
    }

    /// Accept-Loop; laeuft bis `abbruch` ausgeloest wird
    pub async fn starten(
        self,
        listener: TcpListener,
        abbruch: CancellationToken,
    ) -> std::io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "TCP-Listener gestartet");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
                            }
                            let listener = self.clone();
                            tokio::spawn(async move {
                                listener.verbindung_behandeln(stream, peer_addr).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                _ = abbruch.cancelled() => {
                    tracing::info!("TCP-Listener: Shutdown-Signal empfangen");
                    break;
                }
            }
        }

        tracing::info!("TCP-Listener gestoppt");
        Ok(())
    }

    async fn verbindung_behandeln<T>(&self, transport: T, peer_addr: SocketAddr)
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        match self.aufnehmen(transport).await {
            Ok(id) => {
                tracing::debug!(peer = %peer_addr, verbindung = %id, "Verbindung aufgenommen");
            }
            Err(HandshakeFehler::ServerVoll) => {
                tracing::warn!(
                    peer = %peer_addr,
                    max = self.max_verbindungen,
                    "Server voll – Verbindung abgelehnt"
                );
            }
            Err(e) => {
                tracing::info!(peer = %peer_addr, fehler = %e, "Handshake fehlgeschlagen");
            }
        }
    }

    /// Fuehrt den Handshake auf einem beliebigen Byte-Transport durch und
    /// uebergibt die Verbindung bei Erfolg an den Hub
    pub async fn aufnehmen<T>(&self, transport: T) -> Result<ConnectionId, HandshakeFehler>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let codec = FrameCodec::with_max_size(self.hub.config().max_frame_groesse);
        let mut framed = Framed::new(transport, codec);

        let Some(_platz) = self.platz_reservieren() else {
            ablehnen(&mut framed, ErrorCode::ServerFull, "Server voll").await;
            return Err(HandshakeFehler::ServerVoll);
        };

        let gelesen = tokio::time::timeout(self.handshake_timeout, framed.next()).await;
        let erster = match gelesen {
            Err(_) => {
                ablehnen(&mut framed, ErrorCode::Unauthorized, "Handshake-Frist abgelaufen").await;
                return Err(HandshakeFehler::Timeout);
            }
            Ok(None) => return Err(HandshakeFehler::Getrennt),
            Ok(Some(Err(e))) => {
                ablehnen(&mut framed, ErrorCode::InvalidRequest, "Ungueltiger Frame").await;
                return Err(e.into());
            }
            Ok(Some(Ok(frame))) => frame,
        };

        if erster.typ.als_str() != AUTH_TYP {
            ablehnen(&mut framed, ErrorCode::Unauthorized, "auth-Frame erwartet").await;
            return Err(HandshakeFehler::UnerwarteterFrame(erster.typ));
        }

        let token = erster
            .daten_als::<AuthDaten>()
            .map(|d| d.token)
            .unwrap_or_default();
        let user_id = match self.pruefer.pruefen(&token).await {
            Ok(uid) => uid,
            Err(e) => {
                ablehnen(&mut framed, ErrorCode::Unauthorized, e.to_string()).await;
                return Err(e.into());
            }
        };

        let id = self
            .hub
            .verbinden_framed(user_id, framed, Arc::clone(&self.handler))
            .await?;
        tracing::info!(verbindung = %id, user_id = %user_id, "Client authentifiziert");
        Ok(id)
    }
}

/// Sendet einen `error`-Frame und schliesst den Transport
async fn ablehnen<T>(framed: &mut Framed<T, FrameCodec>, code: ErrorCode, nachricht: impl Into<String>)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let bytes = match HubFrame::fehler(code, nachricht).zu_bytes() {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(fehler = %e, "Fehler-Frame nicht serialisierbar");
            return;
        }
    };
    if let Err(e) = SinkExt::<Bytes>::send(framed, bytes).await {
        tracing::debug!(fehler = %e, "Fehler-Frame nicht zugestellt");
    }
    let _ = SinkExt::<Bytes>::close(framed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StatischerTokenPruefer;
    use crate::config::AuthEinstellungen;
    use async_trait::async_trait;
    use funkhaus_core::UserId;
    use funkhaus_hub::{ClientHandle, HandlerFehler, HubConfig};
    use tokio::io::DuplexStream;
    use uuid::Uuid;

    struct KeinHandler;

    #[async_trait]
    impl NachrichtenHandler for KeinHandler {
        async fn verarbeiten(
            &self,
            _verbindung: &ClientHandle,
            _frame: HubFrame,
        ) -> Result<(), HandlerFehler> {
            Ok(())
        }
    }

    fn aufbau(max: usize) -> (ClientListener, Hub, Uuid) {
        let hub = Hub::starten(HubConfig::default()).unwrap();
        let uuid = Uuid::new_v4();
        let mut auth = AuthEinstellungen::default();
        auth.tokens.insert("geheim".into(), uuid);
        let listener = ClientListener::neu(
            hub.clone(),
            Arc::new(StatischerTokenPruefer::neu(&auth)),
            Arc::new(KeinHandler),
            max,
            Duration::from_millis(200),
        );
        (listener, hub, uuid)
    }

    fn client(stream: DuplexStream) -> Framed<DuplexStream, FrameCodec> {
        Framed::new(stream, FrameCodec::new())
    }

    async fn senden(c: &mut Framed<DuplexStream, FrameCodec>, frame: HubFrame) {
        c.send(frame.zu_bytes().unwrap()).await.unwrap();
    }

    fn auth_frame(token: &str) -> HubFrame {
        HubFrame::new(FrameTyp::Andere(AUTH_TYP.into()))
            .mit_daten(&serde_json::json!({ "token": token }))
            .unwrap()
    }

    async fn fehler_code(c: &mut Framed<DuplexStream, FrameCodec>) -> ErrorCode {
        let frame = tokio::time::timeout(Duration::from_secs(1), c.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        frame.fehler_daten().unwrap().code
    }

    #[tokio::test]
    async fn gueltiges_token_registriert_verbindung() {
        let (listener, hub, uuid) = aufbau(10);
        let (server, client_seite) = tokio::io::duplex(4096);
        let mut c = client(client_seite);

        senden(&mut c, auth_frame("geheim")).await;
        let id = listener.aufnehmen(server).await.unwrap();

        let handle = hub.verbindung(&id).unwrap();
        assert_eq!(handle.user_id(), UserId::from(uuid));
        assert!(hub.online_benutzer().contains(&UserId::from(uuid)));

        hub.herunterfahren().await;
    }

    #[tokio::test]
    async fn falsches_token_wird_abgelehnt() {
        let (listener, hub, _) = aufbau(10);
        let (server, client_seite) = tokio::io::duplex(4096);
        let mut c = client(client_seite);

        senden(&mut c, auth_frame("falsch")).await;
        let ergebnis = listener.aufnehmen(server).await;
        assert!(matches!(
            ergebnis,
            Err(HandshakeFehler::Auth(AuthFehler::TokenUngueltig))
        ));
        assert_eq!(fehler_code(&mut c).await, ErrorCode::Unauthorized);
        assert_eq!(hub.registry().verbindungs_anzahl(), 0);

        hub.herunterfahren().await;
    }

    #[tokio::test]
    async fn anderer_erster_frame_wird_abgelehnt() {
        let (listener, hub, _) = aufbau(10);
        let (server, client_seite) = tokio::io::duplex(4096);
        let mut c = client(client_seite);

        senden(&mut c, HubFrame::new(FrameTyp::Message)).await;
        let ergebnis = listener.aufnehmen(server).await;
        assert!(matches!(
            ergebnis,
            Err(HandshakeFehler::UnerwarteterFrame(FrameTyp::Message))
        ));
        assert_eq!(fehler_code(&mut c).await, ErrorCode::Unauthorized);

        hub.herunterfahren().await;
    }

    #[tokio::test]
    async fn schweigender_client_laeuft_in_frist() {
        let (listener, hub, _) = aufbau(10);
        let (server, client_seite) = tokio::io::duplex(4096);
        let mut c = client(client_seite);

        let ergebnis = listener.aufnehmen(server).await;
        assert!(matches!(ergebnis, Err(HandshakeFehler::Timeout)));
        assert_eq!(fehler_code(&mut c).await, ErrorCode::Unauthorized);

        hub.herunterfahren().await;
    }

    #[tokio::test]
    async fn volle_verbindungsgrenze_lehnt_ab() {
        let (listener, hub, _) = aufbau(1);

        let (server, client_seite) = tokio::io::duplex(4096);
        let mut erster = client(client_seite);
        senden(&mut erster, auth_frame("geheim")).await;
        listener.aufnehmen(server).await.unwrap();

        let (server, client_seite) = tokio::io::duplex(4096);
        let mut zweiter = client(client_seite);
        let ergebnis = listener.aufnehmen(server).await;
        assert!(matches!(ergebnis, Err(HandshakeFehler::ServerVoll)));
        assert_eq!(fehler_code(&mut zweiter).await, ErrorCode::ServerFull);

        hub.herunterfahren().await;
    }

    #[tokio::test]
    async fn gleichzeitige_handshakes_halten_grenze_ein() {
        let (listener, hub, _) = aufbau(2);

        let mut clients = Vec::new();
        let mut tasks = Vec::new();
        for _ in 0..2 {
            let (server, client_seite) = tokio::io::duplex(4096);
            clients.push(client(client_seite));
            let l = listener.clone();
            tasks.push(tokio::spawn(async move { l.aufnehmen(server).await }));
        }
        // Beide Handshakes warten jetzt auf ihren auth-Frame
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hub.registry().verbindungs_anzahl(), 0);

        let (server, client_seite) = tokio::io::duplex(4096);
        let mut dritter = client(client_seite);
        senden(&mut dritter, auth_frame("geheim")).await;
        let ergebnis = listener.aufnehmen(server).await;
        assert!(matches!(ergebnis, Err(HandshakeFehler::ServerVoll)));
        assert_eq!(fehler_code(&mut dritter).await, ErrorCode::ServerFull);

        for c in clients.iter_mut() {
            senden(c, auth_frame("geheim")).await;
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(hub.registry().verbindungs_anzahl(), 2);

        hub.herunterfahren().await;
    }

    #[tokio::test]
    async fn fehlgeschlagener_handshake_gibt_platz_frei() {
        let (listener, hub, _) = aufbau(1);

        let (server, client_seite) = tokio::io::duplex(4096);
        let mut erster = client(client_seite);
        senden(&mut erster, auth_frame("falsch")).await;
        assert!(listener.aufnehmen(server).await.is_err());

        let (server, client_seite) = tokio::io::duplex(4096);
        let mut zweiter = client(client_seite);
        senden(&mut zweiter, auth_frame("geheim")).await;
        listener.aufnehmen(server).await.unwrap();
        assert_eq!(hub.registry().verbindungs_anzahl(), 1);

        hub.herunterfahren().await;
    }

    #[tokio::test]
    async fn accept_loop_ueber_tcp() {
        let (listener, hub, uuid) = aufbau(10);
        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let abbruch = CancellationToken::new();
        let task = tokio::spawn(listener.starten(tcp, abbruch.clone()));

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut c = Framed::new(stream, FrameCodec::new());
        c.send(auth_frame("geheim").zu_bytes().unwrap()).await.unwrap();

        // Der eigene user_online-Hinweis bestaetigt die Registrierung
        let frame = tokio::time::timeout(Duration::from_secs(2), c.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(frame.typ, FrameTyp::UserOnline);
        assert_eq!(frame.user_id, Some(UserId::from(uuid)));

        abbruch.cancel();
        task.await.unwrap().unwrap();
        hub.herunterfahren().await;
    }
}
