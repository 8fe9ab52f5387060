use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Balance store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local maps; balances are lost on restart.
    #[default]
    Memory,
    /// JSON wallet snapshot plus an append-only JSONL movement log.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for the `file` backend.
    #[serde(default = "d_path")]
    pub path: PathBuf,
    /// Upper bound on any single store call made by the gateway.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    /// Seconds between background flushes of dirty wallet state.
    #[serde(default = "d_flush_secs")]
    pub flush_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: d_path(),
            timeout_ms: d_timeout_ms(),
            flush_interval_secs: d_flush_secs(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn d_path() -> PathBuf {
    PathBuf::from("./data/ledger")
}
fn d_timeout_ms() -> u64 {
    5_000
}
fn d_flush_secs() -> u64 {
    30
}
