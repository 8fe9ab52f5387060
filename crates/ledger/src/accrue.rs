use pm_domain::error::Result;
use pm_domain::trace::TraceEvent;
use pm_domain::UserId;

use crate::store::BalanceStore;
use crate::types::{BalanceChange, MovementKind, MovementTarget, TransactionMovement};

/// Credit `points` to a user's wallet and record the movement.
///
/// The wallet is created on first use. A failed movement write is logged
/// and does not undo the credit.
pub async fn accrue_points(
    store: &dyn BalanceStore,
    user_id: &UserId,
    username: &str,
    points: i64,
    target: MovementTarget,
) -> Result<BalanceChange> {
    store.get_or_create(user_id).await?;
    let change = store.credit(user_id, points).await?;

    let movement =
        TransactionMovement::from_change(*user_id, username, target, &change);
    let kind = movement.kind;
    if let Err(e) = store.record_movement(movement).await {
        tracing::warn!(user_id = %user_id, error = %e, "failed to record movement");
    } else {
        TraceEvent::MovementRecorded {
            user_id: user_id.to_hex(),
            kind: match kind {
                MovementKind::Credit => "credit".into(),
                MovementKind::Debit => "debit".into(),
            },
            amount: change.amount,
            before: change.before.points(),
            after: change.after.points(),
        }
        .emit();
    }

    TraceEvent::PointsAccrued {
        user_id: user_id.to_hex(),
        points,
        new_balance: change.after.points(),
    }
    .emit();

    Ok(change)
}
