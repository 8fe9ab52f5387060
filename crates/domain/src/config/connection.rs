use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection / liveness
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Seconds between server-sent `heartbeat` messages.
    #[serde(default = "d_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    /// A session whose last client heartbeat is older than this is marked
    /// inactive by the liveness sweep.
    #[serde(default = "d_inactivity_secs")]
    pub inactivity_timeout_secs: u64,
    /// Seconds between liveness sweeps.
    #[serde(default = "d_liveness_sweep_secs")]
    pub liveness_sweep_secs: u64,
    /// Close the connection of a session once it has been marked inactive.
    #[serde(default = "d_true")]
    pub close_inactive: bool,
    /// Capacity of each connection's outbound message buffer. When full,
    /// pushed notifications are dropped instead of blocking the sender.
    #[serde(default = "d_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Inbound text frames larger than this are dropped unparsed.
    #[serde(default = "d_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: d_heartbeat_secs(),
            inactivity_timeout_secs: d_inactivity_secs(),
            liveness_sweep_secs: d_liveness_sweep_secs(),
            close_inactive: true,
            outbound_buffer: d_outbound_buffer(),
            max_frame_bytes: d_max_frame_bytes(),
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn liveness_sweep(&self) -> Duration {
        Duration::from_secs(self.liveness_sweep_secs)
    }
}

fn d_true() -> bool {
    true
}
fn d_heartbeat_secs() -> u64 {
    30
}
fn d_inactivity_secs() -> u64 {
    90
}
fn d_liveness_sweep_secs() -> u64 {
    30
}
fn d_outbound_buffer() -> usize {
    64
}
fn d_max_frame_bytes() -> usize {
    64 * 1024
}
