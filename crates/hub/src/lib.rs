//! funkhaus-hub – Echtzeit-Verbindungshub
//!
//! Verwaltet langlebige, authentifizierte Client-Verbindungen, ordnet sie
//! Raeumen zu und verteilt Frames an Verbindungen, Benutzer oder Raeume.
//!
//! ## Architektur
//!
//! ```text
//! Transport (TCP, Duplex, ...)
//!     |
//!     v
//! Verbindung (Eingangs- und Ausgangsschleife pro Client)
//!     |  room_join / room_leave / pong    -> Hub
//!     |  alles andere                     -> NachrichtenHandler
//!     v
//! Hub (Dispatcher-Task, einziger Schreiber)
//!     |
//!     v
//! MembershipRegistry  – Verbindungen, Benutzer, Raeume
//! ClientHandle        – Send-Queue pro Verbindung (drop-on-full)
//! Liveness            – globale Pings
//! ```

pub mod client;
pub mod config;
mod connection;
pub mod dispatcher;
pub mod error;
pub mod handler;
mod liveness;
pub mod registry;
pub mod statistik;

// Bequeme Re-Exporte
pub use client::{ClientHandle, VerbindungsZustand};
pub use config::HubConfig;
pub use dispatcher::{AusgehendeNachricht, Hub, Zustellziel};
pub use error::{HubError, HubResult};
pub use handler::{HandlerFehler, NachrichtenHandler};
pub use registry::{MembershipRegistry, PraesenzEreignis};
pub use statistik::{HubStatistik, StatistikSnapshot};
