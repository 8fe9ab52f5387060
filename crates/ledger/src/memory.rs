//! Process-local balance store. Also serves as the test double: credits can
//! be made to fail or stall for chosen users.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use pm_domain::error::{Error, Result};
use pm_domain::UserId;

use crate::store::{BalanceStore, WalletBook};
use crate::types::{BalanceChange, TransactionMovement, Wallet};

#[derive(Default)]
pub struct MemoryBalanceStore {
    book: WalletBook,
    movements: RwLock<Vec<TransactionMovement>>,
    failing: RwLock<HashSet<UserId>>,
    credit_delay: RwLock<Option<Duration>>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent credit for `user_id` fail with a store error.
    pub fn fail_credits_for(&self, user_id: UserId) {
        self.failing.write().insert(user_id);
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// Delay every credit by `delay` before it is applied.
    pub fn set_credit_delay(&self, delay: Option<Duration>) {
        *self.credit_delay.write() = delay;
    }

    pub fn wallet_count(&self) -> usize {
        self.book.len()
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn get_or_create(&self, user_id: &UserId) -> Result<Wallet> {
        Ok(self.book.get_or_create(user_id).0)
    }

    async fn credit(&self, user_id: &UserId, amount: i64) -> Result<BalanceChange> {
        let delay = *self.credit_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.read().contains(user_id) {
            return Err(Error::Store(format!("credit unavailable for {user_id}")));
        }
        self.book.credit(user_id, amount)
    }

    async fn record_movement(&self, movement: TransactionMovement) -> Result<()> {
        self.movements.write().push(movement);
        Ok(())
    }

    async fn movements(&self, user_id: &UserId) -> Result<Vec<TransactionMovement>> {
        Ok(self
            .movements
            .read()
            .iter()
            .filter(|m| m.user_id == *user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn uid(n: u8) -> UserId {
        UserId::from_bytes([n; 12])
    }

    #[tokio::test]
    async fn get_or_create_starts_at_zero() {
        let store = MemoryBalanceStore::new();
        let w = store.get_or_create(&uid(1)).await.unwrap();
        assert_eq!(w.balance.points(), 0);
        assert_eq!(w.name, "Point Wallet");
        let again = store.get_or_create(&uid(1)).await.unwrap();
        assert_eq!(again.id, w.id);
    }

    #[tokio::test]
    async fn credit_adds_exactly_and_rejects_overdraft() {
        let store = MemoryBalanceStore::new();
        let change = store.credit(&uid(1), 1).await.unwrap();
        assert_eq!(change.before.points(), 0);
        assert_eq!(change.after.points(), 1);

        let err = store.credit(&uid(1), -5).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientBalance { balance: 1, amount: -5 }
        ));
        assert_eq!(store.balance(&uid(1)).await.unwrap().points(), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_converge_on_one_wallet() {
        let store = Arc::new(MemoryBalanceStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = store.clone();
            handles.push(tokio::spawn(async move {
                s.get_or_create(&uid(7)).await.unwrap().id
            }));
        }
        let mut ids = HashSet::new();
        for h in handles {
            ids.insert(h.await.unwrap());
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(store.wallet_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_credits_are_not_lost() {
        let store = Arc::new(MemoryBalanceStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let s = store.clone();
            handles.push(tokio::spawn(async move { s.credit(&uid(3), 2).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(store.balance(&uid(3)).await.unwrap().points(), 100);
    }

    #[tokio::test]
    async fn injected_failure_is_per_user() {
        let store = MemoryBalanceStore::new();
        store.fail_credits_for(uid(2));
        assert!(matches!(
            store.credit(&uid(2), 1).await,
            Err(Error::Store(_))
        ));
        assert!(store.credit(&uid(1), 1).await.is_ok());
        store.clear_failures();
        assert!(store.credit(&uid(2), 1).await.is_ok());
    }
}
