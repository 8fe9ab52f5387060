use serde::Serialize;

/// Structured trace events emitted across all pointmine crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionRegistered {
        user_id: String,
        username: String,
        conn_id: String,
    },
    SessionSuperseded {
        user_id: String,
        old_conn_id: String,
        new_conn_id: String,
    },
    SessionRemoved {
        user_id: String,
        conn_id: String,
    },
    SessionsInactive {
        count: usize,
        timeout_secs: u64,
    },
    PointsAccrued {
        user_id: String,
        points: i64,
        new_balance: i64,
    },
    MovementRecorded {
        user_id: String,
        kind: String,
        amount: i64,
        before: i64,
        after: i64,
    },
    AccrualSweep {
        sessions: usize,
        succeeded: usize,
        failed: usize,
        notified: usize,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pm_event");
    }
}
