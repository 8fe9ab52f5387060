use std::sync::Arc;

use pm_domain::config::Config;
use pm_ledger::BalanceStore;

use crate::accrual::AccrualScheduler;
use crate::auth::{AuthenticatedUser, Authenticator};
use crate::sessions::{Notifier, SessionRegistry};

/// Shared application state passed to all handlers and connection loops.
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    /// Balance store. Every call is already bounded by `store.timeout_ms`.
    pub store: Arc<dyn BalanceStore>,

    // ── Sessions ──────────────────────────────────────────────────────
    pub sessions: Arc<SessionRegistry>,
    pub notifier: Notifier,

    // ── Auth ──────────────────────────────────────────────────────────
    pub auth: Arc<dyn Authenticator>,
    /// Identity for connections without a token. `None` = tokens required.
    pub guest: Option<AuthenticatedUser>,

    // ── Accrual ───────────────────────────────────────────────────────
    pub accrual: Arc<AccrualScheduler>,

    // ── Security (startup-computed) ───────────────────────────────────
    /// SHA-256 hash of the admin bearer token (read once at startup).
    /// `None` = dev mode (admin endpoints accessible without auth).
    pub admin_token_hash: Option<Vec<u8>>,

    /// Notified to request a graceful shutdown.
    pub shutdown_tx: Arc<tokio::sync::Notify>,
}
