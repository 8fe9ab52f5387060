use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Accrual
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Periodic point accrual for connected users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccrualConfig {
    /// When false the recurring sweep is not started. The manual trigger
    /// still works.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Seconds between sweeps.
    #[serde(default = "d_interval_secs")]
    pub interval_secs: u64,
    /// Points credited to every active session per sweep.
    #[serde(default = "d_points_per_tick")]
    pub points_per_tick: i64,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: d_interval_secs(),
            points_per_tick: d_points_per_tick(),
        }
    }
}

impl AccrualConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn d_true() -> bool {
    true
}
fn d_interval_secs() -> u64 {
    60
}
fn d_points_per_tick() -> i64 {
    1
}
