mod accrual;
mod auth;
mod connection;
mod observability;
mod server;
mod store;

pub use accrual::*;
pub use auth::*;
pub use connection::*;
pub use observability::*;
pub use server::*;
pub use store::*;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::UserId;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub accrual: AccrualConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Environment variable holding the admin bearer token.
    /// If the env var is unset, admin endpoints are open (dev mode).
    #[serde(default = "d_admin_token_env")]
    pub token_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token_env: d_admin_token_env(),
        }
    }
}

fn d_admin_token_env() -> String {
    "PM_ADMIN_TOKEN".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Apply `PM_*` environment overrides on top of the file values.
    ///
    /// Unparseable values are ignored with a warning so a typo in the
    /// environment never prevents startup.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) with an
    /// injectable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_parsed(&lookup, "PM_PORT", &mut self.server.port);
        override_parsed(
            &lookup,
            "PM_ACCRUAL_INTERVAL_SECS",
            &mut self.accrual.interval_secs,
        );
        override_parsed(
            &lookup,
            "PM_POINTS_PER_TICK",
            &mut self.accrual.points_per_tick,
        );
        override_parsed(
            &lookup,
            "PM_HEARTBEAT_INTERVAL_SECS",
            &mut self.connection.heartbeat_interval_secs,
        );
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    let Some(raw) = lookup(key).filter(|v| !v.is_empty()) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable env override"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: &str, message: String| {
            errors.push(ConfigError {
                severity,
                field: field.into(),
                message,
            });
        };

        if self.server.port == 0 {
            push(ConfigSeverity::Error, "server.port", "port must be greater than 0".into());
        }
        if self.server.host.is_empty() {
            push(ConfigSeverity::Error, "server.host", "host must not be empty".into());
        }
        if self.server.cors.allowed_origins.iter().any(|o| o == "*") {
            push(
                ConfigSeverity::Warning,
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)".into(),
            );
        }

        if self.accrual.interval_secs == 0 {
            push(ConfigSeverity::Error, "accrual.interval_secs", "must be greater than 0".into());
        }
        if self.accrual.points_per_tick <= 0 {
            push(ConfigSeverity::Error, "accrual.points_per_tick", "must be greater than 0".into());
        }

        let conn = &self.connection;
        if conn.heartbeat_interval_secs == 0 {
            push(
                ConfigSeverity::Error,
                "connection.heartbeat_interval_secs",
                "must be greater than 0".into(),
            );
        }
        if conn.liveness_sweep_secs == 0 {
            push(
                ConfigSeverity::Error,
                "connection.liveness_sweep_secs",
                "must be greater than 0".into(),
            );
        }
        if conn.inactivity_timeout_secs <= conn.heartbeat_interval_secs {
            push(
                ConfigSeverity::Warning,
                "connection.inactivity_timeout_secs",
                format!(
                    "{}s is not longer than the heartbeat interval ({}s); healthy clients may be marked inactive",
                    conn.inactivity_timeout_secs, conn.heartbeat_interval_secs
                ),
            );
        }
        if conn.outbound_buffer == 0 {
            push(ConfigSeverity::Error, "connection.outbound_buffer", "must be greater than 0".into());
        }

        if self.store.timeout_ms == 0 {
            push(ConfigSeverity::Error, "store.timeout_ms", "must be greater than 0".into());
        }
        if self.store.flush_interval_secs == 0 {
            push(
                ConfigSeverity::Error,
                "store.flush_interval_secs",
                "must be greater than 0".into(),
            );
        }

        let mut seen_tokens = HashSet::new();
        for (i, user) in self.auth.users.iter().enumerate() {
            if user.token.is_empty() {
                push(
                    ConfigSeverity::Error,
                    &format!("auth.users[{i}].token"),
                    "token must not be empty".into(),
                );
            } else if !seen_tokens.insert(user.token.as_str()) {
                push(
                    ConfigSeverity::Error,
                    &format!("auth.users[{i}].token"),
                    "token is shared with another user".into(),
                );
            }
            if user.username.is_empty() {
                push(
                    ConfigSeverity::Warning,
                    &format!("auth.users[{i}].username"),
                    "username is empty".into(),
                );
            }
        }

        if self.auth.guest.enabled {
            if let Err(e) = self.auth.guest.user_id.parse::<UserId>() {
                push(ConfigSeverity::Error, "auth.guest.user_id", e.to_string());
            }
            push(
                ConfigSeverity::Warning,
                "auth.guest.enabled",
                "connections without a token are accepted as the guest user".into(),
            );
        }

        errors
    }
}
