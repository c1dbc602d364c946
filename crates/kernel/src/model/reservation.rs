use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{BookId, ReservationId, UserId};

/// Lifecycle states of a reservation.
///
/// `Pending`, `Confirmed`, and `Active` are the live states; at most one
/// live reservation may reference a given book. The remaining states are
/// terminal for user-driven transitions (returning an overdue book is the
/// one path that moves an `Expired` reservation on, mirroring how a return
/// closes the loan regardless of how late it is).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Active,
    Cancelled,
    Completed,
    Expired,
}

impl ReservationStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Active)
    }

    /// States counted against a reader's borrowing quota. Expired loans keep
    /// occupying a slot until the book comes back.
    pub fn counts_against_quota(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Confirmed | Self::Active | Self::Expired
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Expired => "expired",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = crate::error::LendingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            "expired" => Ok(Self::Expired),
            other => Err(crate::error::LendingError::Validation(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

/// Who withdrew a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    User,
    Librarian,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub book_id: BookId,
    pub user_id: UserId,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    /// Deadline of the current countdown: pickup window once confirmed,
    /// loan window once active. `None` while pending.
    pub expires_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<CancelledBy>,
    /// Set once the one-time return reminder has gone out.
    pub reminder_sent_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn pending(book_id: BookId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::new(),
            book_id,
            user_id,
            status: ReservationStatus::Pending,
            created_at: now,
            expires_at: None,
            cancelled_by: None,
            reminder_sent_at: None,
        }
    }
}

/// Ledger query filter for reservation listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationFilter {
    pub user_id: Option<UserId>,
    pub status: Option<ReservationStatus>,
    pub limit: u64,
    pub offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_states_are_exactly_pending_confirmed_active() {
        use ReservationStatus::*;
        for status in [Pending, Confirmed, Active] {
            assert!(status.is_live(), "{status} should be live");
        }
        for status in [Cancelled, Completed, Expired] {
            assert!(!status.is_live(), "{status} should not be live");
        }
    }

    #[test]
    fn expired_still_occupies_a_quota_slot() {
        assert!(ReservationStatus::Expired.counts_against_quota());
        assert!(!ReservationStatus::Completed.counts_against_quota());
        assert!(!ReservationStatus::Cancelled.counts_against_quota());
    }

    #[test]
    fn fresh_reservations_have_no_deadline() {
        let r = Reservation::pending(BookId::new(), UserId::new(), Utc::now());
        assert_eq!(r.status, ReservationStatus::Pending);
        assert!(r.expires_at.is_none());
        assert!(r.cancelled_by.is_none());
    }
}
