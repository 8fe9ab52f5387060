use serde::{Deserialize, Serialize};

use crate::identity::UserId;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client authentication
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session tokens accepted by the built-in token table.
    #[serde(default)]
    pub users: Vec<UserCredential>,
    /// Identity used for connections that present no token at all.
    #[serde(default)]
    pub guest: GuestConfig,
}

/// One user known to the token table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCredential {
    pub user_id: UserId,
    pub username: String,
    /// Session token the client presents. Only its SHA-256 digest is kept
    /// in memory after startup.
    pub token: String,
    #[serde(default = "d_true")]
    pub enabled: bool,
}

/// Relaxed-auth fallback for token-less connections.
///
/// Enabled by default so local clients can connect without credentials;
/// production deployments should set `enabled = false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_guest_id")]
    pub user_id: String,
    #[serde(default = "d_guest_name")]
    pub username: String,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_id: d_guest_id(),
            username: d_guest_name(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_guest_id() -> String {
    "507f1f77bcf86cd799439011".into()
}
fn d_guest_name() -> String {
    "testuser@example.com".into()
}
