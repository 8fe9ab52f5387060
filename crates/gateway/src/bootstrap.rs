//! AppState construction and background-task spawning extracted from `main.rs`.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use pm_domain::config::{Config, ConfigSeverity, StoreBackend};
use pm_domain::trace::TraceEvent;
use pm_ledger::{BalanceStore, BoundedStore, FileBalanceStore, MemoryBalanceStore};

use crate::accrual::{AccrualScheduler, SchedulerHandle};
use crate::auth::{token_digest, AuthenticatedUser, Authenticator, TokenTable};
use crate::sessions::{Notifier, SessionRegistry};
use crate::state::AppState;

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`] using the store selected by `[store] backend`.
pub async fn build_app_state(
    config: Arc<Config>,
    shutdown_tx: Arc<tokio::sync::Notify>,
) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Balance store ────────────────────────────────────────────────
    let store: Arc<dyn BalanceStore> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory balance store");
            Arc::new(MemoryBalanceStore::new())
        }
        StoreBackend::File => {
            let store = FileBalanceStore::open(&config.store.path).with_context(|| {
                format!("opening balance store at {}", config.store.path.display())
            })?;
            Arc::new(store)
        }
    };

    let auth = Arc::new(TokenTable::from_config(&config.auth));
    tracing::info!(tokens = auth.len(), "token table ready");

    build_app_state_with(config, store, auth, shutdown_tx)
}

/// Wire an [`AppState`] around an existing store and authenticator.
///
/// Store calls are wrapped in [`BoundedStore`] so none can outlive
/// `store.timeout_ms`.
pub fn build_app_state_with(
    config: Arc<Config>,
    store: Arc<dyn BalanceStore>,
    auth: Arc<dyn Authenticator>,
    shutdown_tx: Arc<tokio::sync::Notify>,
) -> anyhow::Result<AppState> {
    let store: Arc<dyn BalanceStore> =
        Arc::new(BoundedStore::new(store, config.store.timeout()));

    // ── Guest identity ───────────────────────────────────────────────
    let guest = if config.auth.guest.enabled {
        let guest =
            AuthenticatedUser::guest(&config.auth.guest).context("parsing auth.guest.user_id")?;
        tracing::warn!(
            user_id = %guest.user_id,
            "guest access enabled: connections without a token are accepted"
        );
        Some(guest)
    } else {
        None
    };

    // ── Sessions + accrual ───────────────────────────────────────────
    let sessions = Arc::new(SessionRegistry::new());
    let notifier = Notifier::new(sessions.clone());
    let accrual = Arc::new(AccrualScheduler::new(
        sessions.clone(),
        store.clone(),
        notifier.clone(),
        &config.accrual,
    ));

    // ── Admin token hash (read once) ─────────────────────────────────
    let admin_token_hash = std::env::var(&config.admin.token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .map(|t| token_digest(&t));
    if admin_token_hash.is_none() {
        tracing::warn!(
            env = %config.admin.token_env,
            "admin token not set: admin endpoints are open (dev mode)"
        );
    }

    Ok(AppState {
        config,
        store,
        sessions,
        notifier,
        auth,
        guest,
        accrual,
        admin_token_hash,
        shutdown_tx,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Background tasks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handles to the long-running loops, used to stop them at shutdown.
pub struct BackgroundTasks {
    scheduler: Option<SchedulerHandle>,
    maintenance: CancellationToken,
}

impl BackgroundTasks {
    /// Stop the scheduler (letting an in-flight sweep finish) and the
    /// maintenance loops.
    pub async fn shutdown(self) {
        self.maintenance.cancel();
        if let Some(scheduler) = self.scheduler {
            scheduler.stop();
            scheduler.join().await;
        }
    }
}

/// Spawn the accrual scheduler, the liveness sweep and the periodic store
/// flush.
pub fn spawn_background_tasks(state: &AppState) -> BackgroundTasks {
    let maintenance = CancellationToken::new();

    // ── Accrual scheduler ────────────────────────────────────────────
    let scheduler = if state.config.accrual.enabled {
        Some(state.accrual.clone().spawn())
    } else {
        tracing::info!("accrual scheduler disabled; manual trigger still available");
        None
    };

    // ── Liveness sweep ───────────────────────────────────────────────
    {
        let sessions = state.sessions.clone();
        let conn = state.config.connection.clone();
        let token = maintenance.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(conn.liveness_sweep());
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        sweep_inactive(&sessions, conn.inactivity_timeout(), conn.close_inactive);
                    }
                }
            }
        });
    }

    // ── Periodic store flush ─────────────────────────────────────────
    {
        let store = state.store.clone();
        let every = std::time::Duration::from_secs(state.config.store.flush_interval_secs);
        let token = maintenance.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = store.flush().await {
                            tracing::warn!(error = %e, "balance store flush failed");
                        }
                    }
                }
            }
        });
    }

    tracing::info!("background tasks spawned");
    BackgroundTasks {
        scheduler,
        maintenance,
    }
}

/// Deactivate sessions that stopped sending heartbeats and, when
/// `close` is set, close their connections.
pub fn sweep_inactive(
    sessions: &SessionRegistry,
    timeout: std::time::Duration,
    close: bool,
) -> usize {
    let expired = sessions.check_inactive(timeout);
    if expired.is_empty() {
        return 0;
    }

    TraceEvent::SessionsInactive {
        count: expired.len(),
        timeout_secs: timeout.as_secs(),
    }
    .emit();

    if close {
        for user_id in &expired {
            sessions.close(user_id);
        }
    }
    expired.len()
}
