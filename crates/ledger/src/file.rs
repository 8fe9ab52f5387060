//! File-backed balance store.
//!
//! Wallets live in memory and are snapshotted to `wallets.json` on
//! [`flush`](BalanceStore::flush) (write to a temp file, then rename).
//! Movements are appended to `movements.jsonl` as they happen, one JSON
//! object per line.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use pm_domain::error::{Error, Result};
use pm_domain::UserId;

use crate::store::{BalanceStore, WalletBook};
use crate::types::{BalanceChange, TransactionMovement, Wallet};

const WALLETS_FILE: &str = "wallets.json";
const MOVEMENTS_FILE: &str = "movements.jsonl";

pub struct FileBalanceStore {
    wallets_path: PathBuf,
    movements_path: PathBuf,
    book: WalletBook,
    dirty: AtomicBool,
}

impl FileBalanceStore {
    /// Open (or create) the store under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(Error::Io)?;

        let wallets_path = dir.join(WALLETS_FILE);
        let wallets: Vec<Wallet> = if wallets_path.exists() {
            let raw = std::fs::read_to_string(&wallets_path).map_err(Error::Io)?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Store(format!("parsing {}: {e}", wallets_path.display())))?
        } else {
            Vec::new()
        };

        tracing::info!(
            wallets = wallets.len(),
            path = %dir.display(),
            "balance store loaded"
        );

        Ok(Self {
            wallets_path,
            movements_path: dir.join(MOVEMENTS_FILE),
            book: WalletBook::from_wallets(wallets),
            dirty: AtomicBool::new(false),
        })
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

#[async_trait]
impl BalanceStore for FileBalanceStore {
    async fn get_or_create(&self, user_id: &UserId) -> Result<Wallet> {
        let (wallet, created) = self.book.get_or_create(user_id);
        if created {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(wallet)
    }

    async fn credit(&self, user_id: &UserId, amount: i64) -> Result<BalanceChange> {
        let change = self.book.credit(user_id, amount)?;
        self.dirty.store(true, Ordering::Release);
        Ok(change)
    }

    async fn record_movement(&self, movement: TransactionMovement) -> Result<()> {
        let mut line = serde_json::to_string(&movement)?;
        line.push('\n');
        let path = self.movements_path.clone();

        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(Error::Io)?;
            file.write_all(line.as_bytes()).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }

    async fn movements(&self, user_id: &UserId) -> Result<Vec<TransactionMovement>> {
        let path = self.movements_path.clone();
        let user_id = *user_id;

        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(Vec::new());
            }
            let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
            let mut out = Vec::new();
            for (n, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<TransactionMovement>(line) {
                    Ok(m) if m.user_id == user_id => out.push(m),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping corrupt movement line"),
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))?
    }

    async fn flush(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let snapshot = self.book.snapshot();
        let count = snapshot.len();
        let json = serde_json::to_string_pretty(&snapshot)?;
        let path = self.wallets_path.clone();

        let written = tokio::task::spawn_blocking(move || {
            let tmp = path.with_extension("json.tmp");
            std::fs::write(&tmp, json).map_err(Error::Io)?;
            std::fs::rename(&tmp, &path).map_err(Error::Io)?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))
        .and_then(|r| r);

        if written.is_err() {
            // Keep the state marked so the next flush retries.
            self.dirty.store(true, Ordering::Release);
        } else {
            tracing::debug!(wallets = count, "balance store flushed");
        }
        written
    }
}
