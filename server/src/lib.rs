//! funkhaus-server – Bibliotheks-Root
//!
//! Verdrahtet Hub, Chat-Handler, Token-Pruefung, TCP-Listener und
//! Observability zu einem lauffaehigen Server.

pub mod auth;
pub mod config;
pub mod tcp;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config::ServerConfig;
use funkhaus_chat::{ArbeitsspeicherSpeicher, ChatHandler, ChatService};
use funkhaus_hub::Hub;
use funkhaus_observability::{FunkhausMetrics, HealthState, HubKennzahlen};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::auth::StatischerTokenPruefer;
use crate::tcp::ClientListener;

/// Intervall, in dem Hub-Statistiken in die Metriken uebernommen werden
pub const METRIK_INTERVALL: Duration = Duration::from_secs(5);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Hub starten (Dispatcher + Liveness)
    /// 2. Chat-Handler und Token-Pruefer aufbauen
    /// 3. Observability-Server und Metrik-Abgleich starten
    /// 4. TCP-Listener starten
    /// 5. Auf Ctrl-C warten, dann geordnet herunterfahren
    pub async fn starten(self) -> Result<()> {
        let abbruch = CancellationToken::new();
        let laufend = self.hochfahren(abbruch.clone()).await?;

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        laufend.herunterfahren(abbruch).await;
        Ok(())
    }

    /// Startet alle Subsysteme ohne auf ein Signal zu warten
    pub async fn hochfahren(&self, abbruch: CancellationToken) -> Result<LaufenderServer> {
        let cfg = &self.config;
        tracing::info!(
            server_name = %cfg.server.name,
            tcp = %cfg.tcp_bind_adresse(),
            max_verbindungen = cfg.server.max_verbindungen,
            "Server startet"
        );

        let hub = Hub::starten(cfg.hub.hub_config()).context("Hub-Konfiguration ungueltig")?;

        let speicher = Arc::new(ArbeitsspeicherSpeicher::neu());
        let handler = ChatHandler::neu(ChatService::neu(speicher), hub.clone());

        let pruefer = StatischerTokenPruefer::neu(&cfg.auth);
        if pruefer.anzahl() == 0 {
            tracing::warn!("Keine Tokens konfiguriert – es kann sich kein Client anmelden");
        }

        let metriken = FunkhausMetrics::neu()?;
        let health = HealthState::neu();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(metrik_schleife(
            hub.clone(),
            metriken.clone(),
            health.clone(),
            abbruch.clone(),
        )));

        if cfg.observability.aktiviert {
            let addr: SocketAddr = cfg
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Adresse")?;
            let (m, h, a) = (metriken.clone(), health.clone(), abbruch.clone());
            tasks.push(tokio::spawn(async move {
                if let Err(e) =
                    funkhaus_observability::observability_server_starten(addr, m, h, a).await
                {
                    tracing::error!(fehler = %e, "Observability-Server fehlgeschlagen");
                }
            }));
        }

        let tcp = TcpListener::bind(cfg.tcp_bind_adresse())
            .await
            .with_context(|| format!("TCP-Bind auf {} fehlgeschlagen", cfg.tcp_bind_adresse()))?;
        let lokale_addr = tcp.local_addr()?;
        let listener = ClientListener::neu(
            hub.clone(),
            Arc::new(pruefer),
            handler,
            cfg.server.max_verbindungen,
            cfg.hub.handshake_timeout(),
        );
        let a = abbruch.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = listener.starten(tcp, a).await {
                tracing::error!(fehler = %e, "TCP-Listener fehlgeschlagen");
            }
        }));

        Ok(LaufenderServer {
            hub,
            health,
            tcp_adresse: lokale_addr,
            tasks,
        })
    }
}

/// Handles eines hochgefahrenen Servers
pub struct LaufenderServer {
    pub hub: Hub,
    pub health: HealthState,
    pub tcp_adresse: SocketAddr,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl LaufenderServer {
    /// Stoppt Listener und Hintergrund-Tasks, dann den Hub
    pub async fn herunterfahren(self, abbruch: CancellationToken) {
        abbruch.cancel();
        self.health.hub_status_setzen(false);
        self.hub.herunterfahren().await;
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!("Server beendet");
    }
}

/// Aktuelle Kennzahlen des Hubs
pub fn kennzahlen_erfassen(hub: &Hub) -> HubKennzahlen {
    let registry = hub.registry();
    let statistik = hub.statistik();
    HubKennzahlen {
        verbindungen: registry.verbindungs_anzahl() as u64,
        online_benutzer: registry.benutzer_anzahl() as u64,
        aktive_raeume: registry.raum_anzahl() as u64,
        zugestellt: statistik.zugestellt,
        verworfen: statistik.verworfen,
        verbindungen_gesamt: statistik.verbindungen_gesamt,
        timeouts: statistik.timeouts,
    }
}

/// Uebernimmt periodisch die Hub-Statistik in Prometheus und Health
async fn metrik_schleife(
    hub: Hub,
    metriken: FunkhausMetrics,
    health: HealthState,
    abbruch: CancellationToken,
) {
    let mut ticker = tokio::time::interval(METRIK_INTERVALL);
    loop {
        tokio::select! {
            _ = abbruch.cancelled() => break,
            _ = ticker.tick() => {
                let kennzahlen = kennzahlen_erfassen(&hub);
                metriken.kennzahlen_uebernehmen(&kennzahlen);
                health.verbindungen_setzen(kennzahlen.verbindungen);
                health.hub_status_setzen(!hub.ist_beendet());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funkhaus_protocol::{FrameCodec, FrameTyp, HubFrame};
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::Framed;
    use uuid::Uuid;

    fn test_config(uuid: Uuid) -> ServerConfig {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "127.0.0.1".into();
        cfg.netzwerk.tcp_port = 0;
        cfg.observability.aktiviert = false;
        cfg.auth.tokens.insert("geheim".into(), uuid);
        cfg
    }

    #[tokio::test]
    async fn hochfahren_anmelden_herunterfahren() {
        let uuid = Uuid::new_v4();
        let server = Server::neu(test_config(uuid));
        let abbruch = CancellationToken::new();
        let laufend = server.hochfahren(abbruch.clone()).await.unwrap();

        let stream = tokio::net::TcpStream::connect(laufend.tcp_adresse)
            .await
            .unwrap();
        let mut client = Framed::new(stream, FrameCodec::new());
        let auth = HubFrame::new(FrameTyp::Andere("auth".into()))
            .mit_daten(&serde_json::json!({ "token": "geheim" }))
            .unwrap();
        client.send(auth.zu_bytes().unwrap()).await.unwrap();

        let online = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(online.typ, FrameTyp::UserOnline);

        let kennzahlen = kennzahlen_erfassen(&laufend.hub);
        assert_eq!(kennzahlen.verbindungen, 1);
        assert_eq!(kennzahlen.online_benutzer, 1);
        assert_eq!(kennzahlen.verbindungen_gesamt, 1);

        laufend.herunterfahren(abbruch).await;

        // Nach dem Shutdown endet der Stream
        let rest = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(Ok(_)) = client.next().await {}
        })
        .await;
        assert!(rest.is_ok());
    }

    #[tokio::test]
    async fn ungueltige_hub_config_verhindert_start() {
        let mut cfg = test_config(Uuid::new_v4());
        cfg.hub.queue_kapazitaet = 0;
        let ergebnis = Server::neu(cfg).hochfahren(CancellationToken::new()).await;
        assert!(ergebnis.is_err());
    }
}
