//! Identifikationstypen fuer Funkhaus
//!
//! Alle IDs verwenden das Newtype-Pattern, damit eine Raum-ID nie versehentlich
//! als Verbindungs-ID durchgereicht werden kann. Die Serialisierung ist
//! transparent (nackte UUID im JSON).

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! id_typ {
    ($(#[$meta:meta])* $name:ident, $praefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Erzeugt eine neue zufaellige ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Gibt die innere UUID zurueck
            pub fn inner(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($praefix, ":{}"), self.0)
            }
        }
    };
}

id_typ!(
    /// Stabile Benutzer-ID (vom externen Token-Pruefer vergeben)
    UserId,
    "user"
);

id_typ!(
    /// Raum-ID; Existenz und Berechtigung verwaltet der externe Speicher
    RoomId,
    "room"
);

id_typ!(
    /// ID einer einzelnen Transport-Verbindung (ein Geraet eines Benutzers)
    ConnectionId,
    "conn"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_eindeutig() {
        assert_ne!(UserId::new(), UserId::new());
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn display_mit_praefix() {
        let id = RoomId(Uuid::nil());
        assert_eq!(id.to_string(), "room:00000000-0000-0000-0000-000000000000");
        assert!(ConnectionId::new().to_string().starts_with("conn:"));
    }

    #[test]
    fn serde_ist_transparent() {
        let uid = UserId(Uuid::nil());
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        let zurueck: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, uid);
    }

    #[test]
    fn aus_string_parsen() {
        let uuid = Uuid::new_v4();
        let uid: UserId = uuid.to_string().parse().unwrap();
        assert_eq!(uid.inner(), uuid);
        assert!("kein-uuid".parse::<RoomId>().is_err());
    }
}
