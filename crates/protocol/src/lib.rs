//! funkhaus-protocol – Frame-Umschlag und Wire-Format
//!
//! Definiert den JSON-Umschlag (`HubFrame`), der in beide Richtungen
//! ueber eine Verbindung laeuft, und den laengenpraefixierten Codec fuer
//! Byte-Stream-Transporte.

pub mod frame;
pub mod wire;

pub use frame::{ErrorCode, FehlerDaten, FrameTyp, HubFrame};
pub use wire::FrameCodec;
