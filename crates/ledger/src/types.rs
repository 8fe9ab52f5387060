use chrono::{DateTime, Utc};
use pm_domain::{Balance, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wallet
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalletKind {
    #[default]
    Point,
}

/// A user's point wallet. One per user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: UserId,
    #[serde(default)]
    pub kind: WalletKind,
    pub name: String,
    pub balance: Balance,
    pub enabled: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub modified_by: String,
    pub modified_at: DateTime<Utc>,
}

impl Wallet {
    /// A fresh, empty point wallet.
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind: WalletKind::Point,
            name: "Point Wallet".into(),
            balance: Balance::ZERO,
            enabled: true,
            created_by: "system".into(),
            created_at: now,
            modified_by: "system".into(),
            modified_at: now,
        }
    }
}

/// Result of a successful credit: the balance on either side of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub amount: i64,
    pub before: Balance,
    pub after: Balance,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Movement log
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Credit,
    Debit,
}

/// What a movement was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementTarget {
    PointAccrual,
    Manual,
}

/// Immutable audit record of one balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMovement {
    pub id: Uuid,
    pub user_id: UserId,
    pub username: String,
    pub kind: MovementKind,
    pub target: MovementTarget,
    pub amount: i64,
    pub before: Balance,
    pub after: Balance,
    pub enabled: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl TransactionMovement {
    pub fn from_change(
        user_id: UserId,
        username: &str,
        target: MovementTarget,
        change: &BalanceChange,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            username: username.to_owned(),
            kind: if change.amount < 0 {
                MovementKind::Debit
            } else {
                MovementKind::Credit
            },
            target,
            amount: change.amount.abs(),
            before: change.before,
            after: change.after,
            enabled: true,
            created_by: "system".into(),
            created_at: Utc::now(),
        }
    }
}
