//! funkhaus-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Identifikationstypen bereit, die Hub, Protokoll
//! und Chat gemeinsam nutzen.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FunkhausError, Result};
pub use types::{ConnectionId, RoomId, UserId};
