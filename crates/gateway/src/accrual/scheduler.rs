//! Accrual scheduler: on every tick, credit each active session and push an
//! `accrual` notification over its connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pm_domain::config::AccrualConfig;
use pm_domain::trace::TraceEvent;
use pm_ledger::{accrue_points, BalanceStore, MovementTarget};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::sessions::{Notifier, SessionRegistry};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Active sessions in the snapshot.
    pub sessions: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Accrual notifications actually queued.
    pub notified: usize,
    pub duration_ms: u64,
}

pub struct AccrualScheduler {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn BalanceStore>,
    notifier: Notifier,
    points_per_tick: i64,
    interval: Duration,
}

impl AccrualScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn BalanceStore>,
        notifier: Notifier,
        cfg: &AccrualConfig,
    ) -> Self {
        Self {
            registry,
            store,
            notifier,
            points_per_tick: cfg.points_per_tick,
            interval: cfg.interval(),
        }
    }

    pub fn points_per_tick(&self) -> i64 {
        self.points_per_tick
    }

    /// Run one sweep over a snapshot of the active sessions.
    ///
    /// Sessions are processed one after another; a failure for one session
    /// is logged and counted and never stops the rest. This is also what the
    /// manual trigger calls.
    pub async fn run_sweep(&self) -> SweepReport {
        let started = Instant::now();
        let sessions = self.registry.active_sessions();
        let mut report = SweepReport {
            sessions: sessions.len(),
            ..SweepReport::default()
        };

        if sessions.is_empty() {
            tracing::debug!("no active sessions, skipping accrual");
            return report;
        }
        tracing::info!(sessions = sessions.len(), "accrual sweep started");

        for session in &sessions {
            let user_id = &session.user_id;
            if let Err(e) = accrue_points(
                self.store.as_ref(),
                user_id,
                &session.username,
                self.points_per_tick,
                MovementTarget::PointAccrual,
            )
            .await
            {
                tracing::warn!(
                    user_id = %user_id,
                    username = %session.username,
                    error = %e,
                    "accrual failed"
                );
                report.failed += 1;
                continue;
            }

            self.registry.update_last_accrual(user_id);
            report.succeeded += 1;

            // Read back rather than trusting the credit result so the
            // notification reflects any concurrent change.
            match self.store.balance(user_id).await {
                Ok(balance) => {
                    if self
                        .notifier
                        .accrual(user_id, self.points_per_tick, balance.points())
                    {
                        report.notified += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "balance refresh after accrual failed");
                }
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            sessions = report.sessions,
            succeeded = report.succeeded,
            failed = report.failed,
            notified = report.notified,
            duration_ms = report.duration_ms,
            "accrual sweep completed"
        );
        TraceEvent::AccrualSweep {
            sessions: report.sessions,
            succeeded: report.succeeded,
            failed: report.failed,
            notified: report.notified,
            duration_ms: report.duration_ms,
        }
        .emit();
        report
    }

    /// Start the periodic loop. The first sweep runs one full interval after
    /// spawning.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(
                interval_secs = period.as_secs(),
                points_per_tick = self.points_per_tick,
                "accrual scheduler started"
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // Stop requests are only observed between sweeps, so an
                        // in-flight sweep always completes.
                        self.run_sweep().await;
                    }
                }
            }
            tracing::info!("accrual scheduler stopped");
        });

        SchedulerHandle { stop, task }
    }
}

/// Control handle for a running scheduler loop.
pub struct SchedulerHandle {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop scheduling further sweeps.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Wait for the loop to exit, including any sweep still running.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "accrual scheduler task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_domain::UserId;
    use pm_ledger::MemoryBalanceStore;
    use pm_protocol::Outbound;
    use tokio::sync::mpsc;

    use crate::sessions::ConnectionHandle;

    fn uid(n: u8) -> UserId {
        UserId::from_bytes([n; 12])
    }

    fn scheduler(
        store: Arc<MemoryBalanceStore>,
        points: i64,
        interval_secs: u64,
    ) -> (Arc<SessionRegistry>, Arc<AccrualScheduler>) {
        let registry = Arc::new(SessionRegistry::new());
        let cfg = AccrualConfig {
            enabled: true,
            interval_secs,
            points_per_tick: points,
        };
        let sched = Arc::new(AccrualScheduler::new(
            registry.clone(),
            store,
            Notifier::new(registry.clone()),
            &cfg,
        ));
        (registry, sched)
    }

    fn connect(reg: &SessionRegistry, id: UserId) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(8);
        reg.add(id, "user", ConnectionHandle::new(tx));
        rx
    }

    #[tokio::test]
    async fn empty_registry_is_a_noop() {
        let store = Arc::new(MemoryBalanceStore::new());
        let (_reg, sched) = scheduler(store.clone(), 1, 60);
        let report = sched.run_sweep().await;
        assert_eq!(report, SweepReport::default());
        assert_eq!(store.wallet_count(), 0);
    }

    #[tokio::test]
    async fn sweep_credits_and_notifies_with_fresh_balance() {
        let store = Arc::new(MemoryBalanceStore::new());
        let (reg, sched) = scheduler(store.clone(), 1, 60);
        let id = uid(1);

        assert_eq!(store.get_or_create(&id).await.unwrap().balance.points(), 0);
        assert_eq!(store.credit(&id, 1).await.unwrap().after.points(), 1);

        let mut rx = connect(&reg, id);
        let report = sched.run_sweep().await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.notified, 1);

        match rx.try_recv().unwrap() {
            Outbound::Accrual(p) => {
                assert_eq!(p.points, 1);
                assert_eq!(p.new_balance, 2);
                assert_eq!(p.new_balance, store.balance(&id).await.unwrap().points());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_failing_credit_does_not_stop_the_sweep() {
        let store = Arc::new(MemoryBalanceStore::new());
        let (reg, sched) = scheduler(store.clone(), 1, 60);

        let mut rxs = Vec::new();
        for n in 1..=4 {
            rxs.push(connect(&reg, uid(n)));
        }
        let before: Vec<_> = (1..=4).map(|n| reg.get(&uid(n)).unwrap().last_accrual).collect();
        store.fail_credits_for(uid(3));

        tokio::time::sleep(Duration::from_millis(5)).await;
        let report = sched.run_sweep().await;
        assert_eq!(report.sessions, 4);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 1);

        for n in 1..=4u8 {
            let s = reg.get(&uid(n)).unwrap();
            let moved = s.last_accrual > before[(n - 1) as usize];
            assert_eq!(moved, n != 3, "last_accrual for user {n}");
            let expected = if n == 3 { 0 } else { 1 };
            assert_eq!(store.balance(&uid(n)).await.unwrap().points(), expected);
        }
        assert!(rxs[2].try_recv().is_err());
        assert!(rxs[0].try_recv().is_ok());
    }

    #[tokio::test]
    async fn removed_session_is_credited_but_not_notified() {
        let store = Arc::new(MemoryBalanceStore::new());
        let (reg, sched) = scheduler(store.clone(), 2, 60);
        let mut rx = connect(&reg, uid(1));

        // Slow credit so the session can go away mid-sweep.
        store.set_credit_delay(Some(Duration::from_millis(50)));
        let sweep = {
            let sched = sched.clone();
            tokio::spawn(async move { sched.run_sweep().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        reg.remove(&uid(1));

        let report = sweep.await.unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.notified, 0);
        assert_eq!(store.balance(&uid(1)).await.unwrap().points(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_skips_first_tick_and_stops() {
        let store = Arc::new(MemoryBalanceStore::new());
        let (reg, sched) = scheduler(store.clone(), 1, 60);
        let _rx = connect(&reg, uid(1));

        let handle = sched.spawn();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.balance(&uid(1)).await.unwrap().points(), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(store.balance(&uid(1)).await.unwrap().points(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.balance(&uid(1)).await.unwrap().points(), 2);

        handle.stop();
        handle.join().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.balance(&uid(1)).await.unwrap().points(), 2);
    }
}
