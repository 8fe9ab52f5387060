//! Pushes typed messages to a session's connection.

use std::sync::Arc;

use chrono::Utc;
use pm_domain::UserId;
use pm_protocol::{AccrualPayload, BalanceUpdatePayload, Outbound};
use tokio::sync::mpsc::error::TrySendError;

use super::registry::{SessionRegistry, SessionSink};

/// Delivers unsolicited messages to whichever connection currently owns a
/// user's session.
///
/// Delivery never waits: a full or closed outbound queue drops the message.
/// Nothing is queued for sessions that are gone.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<SessionRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Send `msg` to `user_id` if it has an active session. Returns whether
    /// the message was queued.
    pub fn send_to(&self, user_id: &UserId, msg: Outbound) -> bool {
        let Some(session) = self.registry.get(user_id) else {
            tracing::debug!(user_id = %user_id, kind = msg.kind(), "no session, dropping message");
            return false;
        };
        if !session.is_active {
            tracing::debug!(user_id = %user_id, kind = msg.kind(), "session inactive, dropping message");
            return false;
        }

        let kind = msg.kind();
        match session.conn.sink.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(user_id = %user_id, kind, "outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(user_id = %user_id, kind, "connection closing, dropping message");
                false
            }
        }
    }

    pub fn accrual(&self, user_id: &UserId, points: i64, new_balance: i64) -> bool {
        let sent = self.send_to(
            user_id,
            Outbound::Accrual(AccrualPayload {
                points,
                new_balance,
                timestamp: Utc::now().timestamp(),
            }),
        );
        if sent {
            tracing::debug!(user_id = %user_id, points, new_balance, "accrual notification queued");
        }
        sent
    }

    pub fn balance_update(&self, user_id: &UserId, balance: i64) -> bool {
        self.send_to(
            user_id,
            Outbound::BalanceUpdate(BalanceUpdatePayload {
                balance,
                timestamp: Utc::now().timestamp(),
            }),
        )
    }
}

/// Queue a reply on a connection's own sink, waiting for room.
///
/// Returns `false` once the writer has gone away.
pub async fn reply(sink: &SessionSink, msg: Outbound) -> bool {
    sink.send(msg).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::registry::ConnectionHandle;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn uid(n: u8) -> UserId {
        UserId::from_bytes([n; 12])
    }

    #[tokio::test]
    async fn delivers_to_active_session() {
        let reg = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        reg.add(uid(1), "a", ConnectionHandle::new(tx));
        let notifier = Notifier::new(reg);

        assert!(notifier.accrual(&uid(1), 1, 2));
        match rx.recv().await.unwrap() {
            Outbound::Accrual(p) => {
                assert_eq!(p.points, 1);
                assert_eq!(p.new_balance, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn drops_for_missing_or_inactive_sessions() {
        let reg = Arc::new(SessionRegistry::new());
        let (tx, mut rx) = mpsc::channel(4);
        reg.add(uid(1), "a", ConnectionHandle::new(tx));
        let notifier = Notifier::new(reg.clone());

        assert!(!notifier.balance_update(&uid(2), 5));

        std::thread::sleep(Duration::from_millis(5));
        reg.check_inactive(Duration::ZERO);
        assert!(!notifier.balance_update(&uid(1), 5));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let reg = Arc::new(SessionRegistry::new());
        let (tx, _rx) = mpsc::channel(1);
        reg.add(uid(1), "a", ConnectionHandle::new(tx));
        let notifier = Notifier::new(reg);

        assert!(notifier.balance_update(&uid(1), 1));
        assert!(!notifier.balance_update(&uid(1), 2));
    }
}
