//! In-memory registry of live client sessions, keyed by user.
//!
//! A single `parking_lot::RwLock` guards the whole map. Every operation holds
//! it only for in-memory work; cancellation of superseded connections happens
//! after the lock is released.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pm_domain::trace::TraceEvent;
use pm_domain::UserId;
use pm_protocol::Outbound;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Outbound queue drained by a connection's writer task.
pub type SessionSink = mpsc::Sender<Outbound>;

/// Handle to the connection that owns a session.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: Uuid,
    pub sink: SessionSink,
    /// Cancelling this closes the connection and ends its protocol loop.
    pub cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(sink: SessionSink) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            sink,
            cancel: CancellationToken::new(),
        }
    }
}

/// One live connection bound to a user.
///
/// Values handed out by the registry are copies: later registry mutations
/// are not reflected in a `Session` a caller already holds.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
    pub conn: ConnectionHandle,
    pub connected_at: DateTime<Utc>,
    pub last_accrual: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub is_active: bool,
}

/// Admin view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub user_id: UserId,
    pub username: String,
    pub connected_at: DateTime<Utc>,
    pub last_accrual: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub is_active: bool,
}

impl From<&Session> for SessionInfo {
    fn from(s: &Session) -> Self {
        Self {
            user_id: s.user_id,
            username: s.username.clone(),
            connected_at: s.connected_at,
            last_accrual: s.last_accrual,
            last_heartbeat: s.last_heartbeat,
            is_active: s.is_active,
        }
    }
}

/// Thread-safe registry of all live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session for `user_id`, replacing any existing one.
    ///
    /// A replaced session belonging to another connection is taken over: it
    /// is marked inactive and its connection is cancelled.
    pub fn add(&self, user_id: UserId, username: &str, conn: ConnectionHandle) -> Session {
        let now = Utc::now();
        let session = Session {
            user_id,
            username: username.to_owned(),
            conn,
            connected_at: now,
            last_accrual: now,
            last_heartbeat: now,
            is_active: true,
        };

        let replaced = self.sessions.write().insert(user_id, session.clone());

        tracing::info!(
            user_id = %user_id,
            username = %username,
            conn_id = %session.conn.conn_id,
            "session registered"
        );
        TraceEvent::SessionRegistered {
            user_id: user_id.to_hex(),
            username: username.to_owned(),
            conn_id: session.conn.conn_id.to_string(),
        }
        .emit();

        if let Some(old) = replaced {
            self.supersede(old, session.conn.conn_id);
        }
        session
    }

    pub fn get(&self, user_id: &UserId) -> Option<Session> {
        self.sessions.read().get(user_id).cloned()
    }

    /// Mark the session inactive and drop it. No-op if absent.
    pub fn remove(&self, user_id: &UserId) -> Option<Session> {
        let removed = self.sessions.write().remove(user_id).map(|mut s| {
            s.is_active = false;
            s
        });
        if let Some(s) = &removed {
            self.log_removed(s);
        }
        removed
    }

    /// Teardown path: remove the session for `user_id` only if it still
    /// belongs to connection `conn_id`. Returns whether anything was removed.
    pub fn remove_connection(&self, user_id: &UserId, conn_id: Uuid) -> bool {
        let removed = {
            let mut sessions = self.sessions.write();
            if matches!(sessions.get(user_id), Some(s) if s.conn.conn_id == conn_id) {
                sessions.remove(user_id)
            } else {
                None
            }
        };
        match removed {
            Some(mut s) => {
                s.is_active = false;
                self.log_removed(&s);
                true
            }
            None => false,
        }
    }

    pub fn update_heartbeat(&self, user_id: &UserId) {
        if let Some(s) = self.sessions.write().get_mut(user_id) {
            s.last_heartbeat = Utc::now();
        }
    }

    pub fn update_last_accrual(&self, user_id: &UserId) {
        if let Some(s) = self.sessions.write().get_mut(user_id) {
            s.last_accrual = Utc::now();
        }
    }

    /// Point-in-time copy of every active session.
    pub fn active_sessions(&self) -> Vec<Session> {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect()
    }

    /// Mark active sessions whose last heartbeat is older than `timeout` as
    /// inactive and return their ids. Entries stay in the map, and a session
    /// is reported only on the sweep that deactivates it.
    pub fn check_inactive(&self, timeout: Duration) -> Vec<UserId> {
        let now = Utc::now();
        let mut expired = Vec::new();
        let mut sessions = self.sessions.write();
        for s in sessions.values_mut() {
            if !s.is_active {
                continue;
            }
            let stale = now
                .signed_duration_since(s.last_heartbeat)
                .to_std()
                .map(|age| age > timeout)
                .unwrap_or(false);
            if stale {
                s.is_active = false;
                expired.push(s.user_id);
                tracing::warn!(
                    user_id = %s.user_id,
                    username = %s.username,
                    "session marked inactive after heartbeat timeout"
                );
            }
        }
        expired
    }

    /// Move the session owned by `conn_id` from `old` to `new_user`
    /// (in-band re-authentication). Timestamps are kept. Any other
    /// connection already registered as `new_user` is taken over.
    ///
    /// Returns `false` when `old` is no longer owned by `conn_id`.
    pub fn rekey(&self, old: &UserId, conn_id: Uuid, new_user: UserId, new_name: &str) -> bool {
        let replaced = {
            let mut sessions = self.sessions.write();
            if !matches!(sessions.get(old), Some(s) if s.conn.conn_id == conn_id) {
                return false;
            }
            let Some(mut session) = sessions.remove(old) else {
                return false;
            };
            session.user_id = new_user;
            session.username = new_name.to_owned();
            sessions
                .insert(new_user, session)
                .filter(|prev| prev.conn.conn_id != conn_id)
        };

        tracing::info!(
            from = %old,
            to = %new_user,
            conn_id = %conn_id,
            "session re-authenticated"
        );
        if let Some(prev) = replaced {
            self.supersede(prev, conn_id);
        }
        true
    }

    /// Cancel the connection behind `user_id`'s session.
    pub fn close(&self, user_id: &UserId) -> bool {
        let token = self.sessions.read().get(user_id).map(|s| s.conn.cancel.clone());
        match token {
            Some(t) => {
                t.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every connection. Used at shutdown.
    pub fn close_all(&self) -> usize {
        let tokens: Vec<CancellationToken> = self
            .sessions
            .read()
            .values()
            .map(|s| s.conn.cancel.clone())
            .collect();
        for t in &tokens {
            t.cancel();
        }
        tokens.len()
    }

    /// Every session, active or not, oldest connection first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self.sessions.read().values().map(SessionInfo::from).collect();
        all.sort_by_key(|s| s.connected_at);
        all
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn supersede(&self, mut old: Session, new_conn_id: Uuid) {
        if old.conn.conn_id == new_conn_id {
            return;
        }
        old.is_active = false;
        old.conn.cancel.cancel();
        tracing::info!(
            user_id = %old.user_id,
            old_conn_id = %old.conn.conn_id,
            new_conn_id = %new_conn_id,
            "session taken over by a new connection"
        );
        TraceEvent::SessionSuperseded {
            user_id: old.user_id.to_hex(),
            old_conn_id: old.conn.conn_id.to_string(),
            new_conn_id: new_conn_id.to_string(),
        }
        .emit();
    }

    fn log_removed(&self, s: &Session) {
        tracing::info!(user_id = %s.user_id, username = %s.username, "session removed");
        TraceEvent::SessionRemoved {
            user_id: s.user_id.to_hex(),
            conn_id: s.conn.conn_id.to_string(),
        }
        .emit();
    }

    #[cfg(test)]
    pub(crate) fn set_last_heartbeat(&self, user_id: &UserId, at: DateTime<Utc>) {
        if let Some(s) = self.sessions.write().get_mut(user_id) {
            s.last_heartbeat = at;
        }
    }
}
