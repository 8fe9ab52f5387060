//! Token → identity resolution for WebSocket clients.
//!
//! Tokens from `[auth] users` are held only as SHA-256 digests and compared
//! in constant time, the same way the admin guard treats its bearer token.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use pm_domain::config::{AuthConfig, GuestConfig};
use pm_domain::error::{Error, Result};
use pm_domain::UserId;
use serde::Serialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Identity bound to a connection after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: String,
}

impl AuthenticatedUser {
    /// The fallback identity used for connections that present no token.
    pub fn guest(cfg: &GuestConfig) -> Result<Self> {
        Ok(Self {
            user_id: cfg.user_id.parse()?,
            username: cfg.username.clone(),
        })
    }
}

/// SHA-256 digest of a secret, as stored for later comparison.
pub fn token_digest(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

/// Constant-time comparison of `token`'s digest against a stored digest.
pub fn digest_matches(token: &str, expected: &[u8]) -> bool {
    bool::from(Sha256::digest(token.as_bytes()).ct_eq(expected))
}

/// Token from an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a client token to the identity it belongs to.
    async fn resolve(&self, token: &str) -> Result<AuthenticatedUser>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TokenTable
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct TokenEntry {
    digest: Vec<u8>,
    user: AuthenticatedUser,
    enabled: bool,
}

/// Static token table built from configuration.
pub struct TokenTable {
    entries: Vec<TokenEntry>,
}

impl TokenTable {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        let entries = cfg
            .users
            .iter()
            .filter(|u| !u.token.is_empty())
            .map(|u| TokenEntry {
                digest: token_digest(&u.token),
                user: AuthenticatedUser {
                    user_id: u.user_id,
                    username: u.username.clone(),
                },
                enabled: u.enabled,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Authenticator for TokenTable {
    async fn resolve(&self, token: &str) -> Result<AuthenticatedUser> {
        // Compare against every entry so timing does not reveal the position
        // of a match.
        let mut found: Option<&TokenEntry> = None;
        for entry in &self.entries {
            if digest_matches(token, &entry.digest) {
                found = Some(entry);
            }
        }

        match found {
            Some(entry) if !entry.enabled => {
                tracing::warn!(user_id = %entry.user.user_id, "token belongs to a disabled account");
                Err(Error::Auth("account disabled".into()))
            }
            Some(entry) => Ok(entry.user.clone()),
            None => Err(Error::Auth("unknown token".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_domain::config::UserCredential;

    fn table() -> TokenTable {
        TokenTable::from_config(&AuthConfig {
            users: vec![
                UserCredential {
                    user_id: UserId::from_bytes([1; 12]),
                    username: "alice".into(),
                    token: "tok-alice".into(),
                    enabled: true,
                },
                UserCredential {
                    user_id: UserId::from_bytes([2; 12]),
                    username: "bob".into(),
                    token: "tok-bob".into(),
                    enabled: false,
                },
                UserCredential {
                    user_id: UserId::from_bytes([3; 12]),
                    username: "blank".into(),
                    token: String::new(),
                    enabled: true,
                },
            ],
            guest: GuestConfig::default(),
        })
    }

    #[tokio::test]
    async fn resolves_known_token() {
        let user = table().resolve("tok-alice").await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.user_id, UserId::from_bytes([1; 12]));
    }

    #[tokio::test]
    async fn rejects_unknown_and_disabled() {
        let t = table();
        assert!(matches!(t.resolve("nope").await, Err(Error::Auth(_))));
        let err = t.resolve("tok-bob").await.unwrap_err();
        assert_eq!(err.to_string(), "auth: account disabled");
    }

    #[tokio::test]
    async fn empty_tokens_are_never_registered() {
        let t = table();
        assert_eq!(t.len(), 2);
        assert!(t.resolve("").await.is_err());
    }

    #[test]
    fn guest_identity_parses_default_id() {
        let guest = AuthenticatedUser::guest(&GuestConfig::default()).unwrap();
        assert_eq!(guest.user_id.to_hex(), "507f1f77bcf86cd799439011");
        assert_eq!(guest.username, "testuser@example.com");
    }
}
