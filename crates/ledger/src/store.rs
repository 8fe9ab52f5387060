//! The `BalanceStore` trait and the in-memory wallet book shared by the
//! concrete backends.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use pm_domain::error::{Error, Result};
use pm_domain::{Balance, BalanceError, UserId};

use crate::types::{BalanceChange, TransactionMovement, Wallet};

/// Durable point ledger keyed by user.
///
/// Implementations may be process-local, file-backed, or a test double.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Return the user's wallet, creating an empty one if absent. Concurrent
    /// callers for the same user converge on a single wallet.
    async fn get_or_create(&self, user_id: &UserId) -> Result<Wallet>;

    /// Current balance (creates the wallet if absent).
    async fn balance(&self, user_id: &UserId) -> Result<Balance> {
        Ok(self.get_or_create(user_id).await?.balance)
    }

    /// Atomically apply a signed point delta. Fails with
    /// [`Error::InsufficientBalance`] and leaves the balance untouched when
    /// the result would be negative.
    async fn credit(&self, user_id: &UserId, amount: i64) -> Result<BalanceChange>;

    /// Append an audit record. Never rolls back a balance change.
    async fn record_movement(&self, movement: TransactionMovement) -> Result<()>;

    /// All recorded movements for a user, oldest first.
    async fn movements(&self, user_id: &UserId) -> Result<Vec<TransactionMovement>>;

    /// Persist any buffered state. Called periodically and on shutdown.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WalletBook
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lock-guarded wallet map. Every mutation happens under one write lock so
/// credits are atomic per user.
#[derive(Default)]
pub(crate) struct WalletBook {
    wallets: RwLock<HashMap<UserId, Wallet>>,
}

impl WalletBook {
    pub(crate) fn from_wallets(wallets: impl IntoIterator<Item = Wallet>) -> Self {
        Self {
            wallets: RwLock::new(wallets.into_iter().map(|w| (w.user_id, w)).collect()),
        }
    }

    /// Returns `(wallet, created)`.
    pub(crate) fn get_or_create(&self, user_id: &UserId) -> (Wallet, bool) {
        if let Some(w) = self.wallets.read().get(user_id) {
            return (w.clone(), false);
        }

        // Another caller may have created it between the two locks; `entry`
        // makes the second create a no-op.
        let mut wallets = self.wallets.write();
        let mut created = false;
        let wallet = wallets.entry(*user_id).or_insert_with(|| {
            created = true;
            Wallet::new(*user_id)
        });
        if created {
            tracing::info!(user_id = %user_id, "created point wallet");
        }
        (wallet.clone(), created)
    }

    pub(crate) fn credit(&self, user_id: &UserId, amount: i64) -> Result<BalanceChange> {
        let mut wallets = self.wallets.write();
        let wallet = wallets
            .entry(*user_id)
            .or_insert_with(|| Wallet::new(*user_id));

        let before = wallet.balance;
        let after = before.checked_add(amount).map_err(|e| match e {
            BalanceError::Insufficient => Error::InsufficientBalance {
                balance: before.points(),
                amount,
            },
            BalanceError::Overflow => {
                Error::Store(format!("balance overflow crediting {amount} to {user_id}"))
            }
        })?;

        wallet.balance = after;
        wallet.modified_by = "ledger".into();
        wallet.modified_at = Utc::now();

        Ok(BalanceChange {
            amount,
            before,
            after,
        })
    }

    pub(crate) fn snapshot(&self) -> Vec<Wallet> {
        let mut all: Vec<Wallet> = self.wallets.read().values().cloned().collect();
        all.sort_by_key(|w| w.user_id);
        all
    }

    pub(crate) fn len(&self) -> usize {
        self.wallets.read().len()
    }
}
