//! funkhaus-chat – Text-Chat ueber den Hub
//!
//! Dieses Crate implementiert:
//! - ChatService: Nachrichten senden, editieren, loeschen, Verlauf
//! - ChatHandler: `NachrichtenHandler` fuer `message`, `message_edit`, `message_delete`
//! - NachrichtenSpeicher-Trait + ArbeitsspeicherSpeicher-Implementierung
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use funkhaus_chat::{ArbeitsspeicherSpeicher, ChatHandler, ChatService};
//! use funkhaus_hub::{Hub, HubConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Hub::starten(HubConfig::default()).unwrap();
//!     let speicher = Arc::new(ArbeitsspeicherSpeicher::neu());
//!     let handler = ChatHandler::neu(ChatService::neu(speicher), hub.clone());
//!     // handler an hub.verbinden_transport(...) uebergeben
//! }
//! ```

pub mod error;
pub mod handler;
pub mod service;
pub mod storage;
pub mod types;


// Bequeme Re-Exporte
pub use error::{ChatError, ChatResult};
pub use handler::ChatHandler;
pub use service::ChatService;
pub use storage::{ArbeitsspeicherSpeicher, NachrichtenSpeicher};
pub use types::{ChatNachricht, NachrichtenTyp, VerlaufAnfrage};
