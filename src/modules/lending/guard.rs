//! Borrowing-limit checks shared by the create path and the sweep.

use biblio_kernel::error::{LendingError, LendingResult};
use biblio_kernel::ledger::LedgerTx;
use biblio_kernel::model::{User, UserId};

/// Reject a new reservation once the reader holds `limit` outstanding ones.
/// Runs inside the create transaction, so two concurrent creates cannot both
/// squeeze past at `limit - 1`.
pub(super) async fn check_quota(
    tx: &mut dyn LedgerTx,
    user_id: UserId,
    limit: u32,
) -> LendingResult<()> {
    let outstanding = tx.outstanding_count(user_id).await?;
    if outstanding >= limit {
        return Err(LendingError::LimitExceeded { limit });
    }
    Ok(())
}

/// Block the reader if their overdue count has reached the threshold.
/// Returns true when this call newly blocked them; the caller commits and
/// notifies.
pub(super) async fn block_if_delinquent(
    tx: &mut dyn LedgerTx,
    user: &User,
    threshold: u32,
) -> LendingResult<bool> {
    if user.is_blocked {
        return Ok(false);
    }
    let overdue = tx.overdue_count(user.id).await?;
    if overdue >= threshold {
        tx.set_blocked(user.id, true).await?;
        tracing::warn!(user = %user.id, overdue, "reader blocked for overdue books");
        return Ok(true);
    }
    Ok(false)
}
