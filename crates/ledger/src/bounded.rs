//! Deadline enforcement for store calls.
//!
//! A stalled store must never wedge a connection or the accrual sweep, so
//! every call made through [`BoundedStore`] is wrapped in a timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pm_domain::error::{Error, Result};
use pm_domain::{Balance, UserId};

use crate::store::BalanceStore;
use crate::types::{BalanceChange, TransactionMovement, Wallet};

/// Run `fut` with a deadline. Elapsed deadlines become [`Error::Timeout`]
/// naming `op`.
pub async fn bounded<T, F>(timeout: Duration, op: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(op, timeout_ms = timeout.as_millis() as u64, "store call timed out");
            Err(Error::Timeout(format!(
                "{op} exceeded {}ms",
                timeout.as_millis()
            )))
        }
    }
}

/// A [`BalanceStore`] that applies one deadline to every call of the store
/// it wraps.
pub struct BoundedStore {
    inner: Arc<dyn BalanceStore>,
    timeout: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn BalanceStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl BalanceStore for BoundedStore {
    async fn get_or_create(&self, user_id: &UserId) -> Result<Wallet> {
        bounded(self.timeout, "get_or_create", self.inner.get_or_create(user_id)).await
    }

    async fn balance(&self, user_id: &UserId) -> Result<Balance> {
        bounded(self.timeout, "balance", self.inner.balance(user_id)).await
    }

    async fn credit(&self, user_id: &UserId, amount: i64) -> Result<BalanceChange> {
        bounded(self.timeout, "credit", self.inner.credit(user_id, amount)).await
    }

    async fn record_movement(&self, movement: TransactionMovement) -> Result<()> {
        bounded(
            self.timeout,
            "record_movement",
            self.inner.record_movement(movement),
        )
        .await
    }

    async fn movements(&self, user_id: &UserId) -> Result<Vec<TransactionMovement>> {
        bounded(self.timeout, "movements", self.inner.movements(user_id)).await
    }

    async fn flush(&self) -> Result<()> {
        bounded(self.timeout, "flush", self.inner.flush()).await
    }
}
