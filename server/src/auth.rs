//! Token-Pruefung beim Verbindungsaufbau
//!
//! Der Hub selbst kennt keine Authentifizierung: der Server prueft das
//! Token aus dem ersten Frame und uebergibt dem Hub nur noch die
//! festgestellte `UserId`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use funkhaus_core::UserId;
use thiserror::Error;

use crate::config::AuthEinstellungen;

/// Gruende, aus denen ein Token abgelehnt wird
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthFehler {
    #[error("Token fehlt")]
    TokenFehlt,

    #[error("Token ungueltig")]
    TokenUngueltig,

    #[error("Token widerrufen")]
    TokenWiderrufen,
}

/// Bildet ein Token auf eine stabile Benutzer-ID ab
#[async_trait]
pub trait TokenPruefer: Send + Sync + 'static {
    async fn pruefen(&self, token: &str) -> Result<UserId, AuthFehler>;
}

/// Token-Pruefer auf Basis der `[auth]`-Sektion der Konfiguration
#[derive(Debug, Default)]
pub struct StatischerTokenPruefer {
    tokens: HashMap<String, UserId>,
    widerrufen: HashSet<String>,
}

impl StatischerTokenPruefer {
    pub fn neu(einstellungen: &AuthEinstellungen) -> Self {
        Self {
            tokens: einstellungen
                .tokens
                .iter()
                .map(|(token, uuid)| (token.clone(), UserId::from(*uuid)))
                .collect(),
            widerrufen: einstellungen.widerrufen.iter().cloned().collect(),
        }
    }

    pub fn anzahl(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl TokenPruefer for StatischerTokenPruefer {
    async fn pruefen(&self, token: &str) -> Result<UserId, AuthFehler> {
        if token.is_empty() {
            return Err(AuthFehler::TokenFehlt);
        }
        if self.widerrufen.contains(token) {
            return Err(AuthFehler::TokenWiderrufen);
        }
        self.tokens
            .get(token)
            .copied()
            .ok_or(AuthFehler::TokenUngueltig)
    }
}
