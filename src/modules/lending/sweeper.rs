//! Periodic reconciliation of time-based state.
//!
//! The sweep scans for reservations whose deadline has passed and applies
//! the corresponding transition: unclaimed confirmations are cancelled,
//! overrun loans expire and mark their book overdue, delinquent readers get
//! blocked, soon-due loans get their one-time reminder, and wishlist entries
//! for books back on the shelf are notified and drained.
//!
//! Every pass first collects candidate ids in a read transaction, then
//! handles each row in its own short transaction with the precondition
//! re-checked. A row that moved on between scan and handling is skipped,
//! which makes the whole sweep idempotent; running it twice changes nothing
//! the second time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;

use biblio_kernel::error::LendingResult;
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::{
    BookStatus, CancelledBy, ReservationId, ReservationStatus, UserId, WishlistId,
};
use biblio_kernel::notify::{Notification, NotificationKind, NotificationSink};
use biblio_kernel::settings::LendingSettings;

use super::guard;

/// Counts of what one sweep run actually did.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Confirmed reservations cancelled because pickup never happened.
    pub cancelled_unclaimed: usize,
    /// Active loans expired and marked overdue.
    pub expired_overdue: usize,
    /// Readers newly blocked for delinquency.
    pub blocked: usize,
    /// One-time return reminders sent.
    pub reminded: usize,
    /// Wishlist entries notified and drained.
    pub wishlist_notified: usize,
    /// True when another sweep was already running and this one backed off.
    pub skipped: bool,
}

pub struct Sweeper {
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn NotificationSink>,
    policy: LendingSettings,
    // Single-flight gate; an interval tick overlapping a manual run backs off.
    gate: Mutex<()>,
}

impl Sweeper {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn NotificationSink>,
        policy: LendingSettings,
    ) -> Self {
        Self {
            ledger,
            notifier,
            policy,
            gate: Mutex::new(()),
        }
    }

    pub async fn run(&self) -> LendingResult<SweepReport> {
        let Ok(_gate) = self.gate.try_lock() else {
            tracing::info!("sweep already in progress, backing off");
            return Ok(SweepReport {
                skipped: true,
                ..SweepReport::default()
            });
        };
        self.run_at(Utc::now()).await
    }

    /// The sweep body with an injectable clock. Callers other than tests go
    /// through [`run`](Self::run), which also takes the single-flight gate.
    pub(super) async fn run_at(&self, now: DateTime<Utc>) -> LendingResult<SweepReport> {
        let mut report = SweepReport::default();
        self.cancel_unclaimed(now, &mut report).await?;
        self.expire_overrun_loans(now, &mut report).await?;
        self.block_delinquents(&mut report).await?;
        self.send_return_reminders(now, &mut report).await?;
        self.drain_wishlist(&mut report).await?;
        tracing::info!(?report, "reconciliation sweep finished");
        Ok(report)
    }

    /// Pass 1: confirmed reservations whose pickup window has closed.
    async fn cancel_unclaimed(
        &self,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> LendingResult<()> {
        let candidates = {
            let mut tx = self.ledger.begin().await?;
            tx.confirmed_expiring_before(now).await?
        };
        for reservation in candidates {
            match self.cancel_one_unclaimed(reservation.id, now).await {
                Ok(Some(note)) => {
                    report.cancelled_unclaimed += 1;
                    self.notifier.notify(note);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        reservation = %reservation.id,
                        error = %err,
                        "failed to cancel unclaimed reservation"
                    );
                }
            }
        }
        Ok(())
    }

    async fn cancel_one_unclaimed(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> LendingResult<Option<Notification>> {
        let mut tx = self.ledger.begin().await?;
        let Some(mut reservation) = tx.find_reservation(id).await? else {
            return Ok(None);
        };
        // Re-check under the transaction; the scan ran outside it.
        if reservation.status != ReservationStatus::Confirmed
            || reservation.expires_at.is_none_or(|deadline| deadline >= now)
        {
            return Ok(None);
        }

        let book = tx.find_book(reservation.book_id).await?;
        reservation.status = ReservationStatus::Cancelled;
        reservation.cancelled_by = Some(CancelledBy::System);
        tx.update_reservation(reservation.clone()).await?;
        if let Some(book) = &book {
            tx.set_book_status(book.id, BookStatus::Available, now)
                .await?;
        }
        let user = tx.find_user(reservation.user_id).await?;
        tx.commit().await?;

        tracing::info!(reservation = %reservation.id, "unclaimed reservation cancelled");
        Ok(user.map(|user| {
            Notification::new(
                NotificationKind::ReservationCancelled,
                user.email,
                json!({
                    "reservation_id": reservation.id.to_string(),
                    "book_title": book.map(|b| b.title),
                    "reason": "pickup window elapsed",
                }),
            )
        }))
    }

    /// Pass 2: active loans past their due date expire and flag the book
    /// overdue. No mail goes out here; the reminder pass already warned the
    /// reader, and blocking handles repeat offenders.
    async fn expire_overrun_loans(
        &self,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> LendingResult<()> {
        let candidates = {
            let mut tx = self.ledger.begin().await?;
            tx.active_expiring_before(now).await?
        };
        for reservation in candidates {
            match self.expire_one_loan(reservation.id, now).await {
                Ok(true) => report.expired_overdue += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        reservation = %reservation.id,
                        error = %err,
                        "failed to expire overrun loan"
                    );
                }
            }
        }
        Ok(())
    }

    async fn expire_one_loan(&self, id: ReservationId, now: DateTime<Utc>) -> LendingResult<bool> {
        let mut tx = self.ledger.begin().await?;
        let Some(mut reservation) = tx.find_reservation(id).await? else {
            return Ok(false);
        };
        if reservation.status != ReservationStatus::Active
            || reservation.expires_at.is_none_or(|deadline| deadline >= now)
        {
            return Ok(false);
        }

        reservation.status = ReservationStatus::Expired;
        tx.update_reservation(reservation.clone()).await?;
        if tx.find_book(reservation.book_id).await?.is_some() {
            tx.set_book_status(reservation.book_id, BookStatus::Overdue, now)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(
            reservation = %reservation.id,
            book = %reservation.book_id,
            "loan overrun, book marked overdue"
        );
        Ok(true)
    }

    /// Pass 3: readers whose overdue count crossed the threshold get blocked.
    async fn block_delinquents(&self, report: &mut SweepReport) -> LendingResult<()> {
        let candidates = {
            let mut tx = self.ledger.begin().await?;
            tx.users_with_overdue().await?
        };
        for user_id in candidates {
            match self.block_one(user_id).await {
                Ok(Some(note)) => {
                    report.blocked += 1;
                    self.notifier.notify(note);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(user = %user_id, error = %err, "failed to block reader");
                }
            }
        }
        Ok(())
    }

    async fn block_one(&self, user_id: UserId) -> LendingResult<Option<Notification>> {
        let mut tx = self.ledger.begin().await?;
        let Some(user) = tx.find_user(user_id).await? else {
            return Ok(None);
        };
        if !guard::block_if_delinquent(tx.as_mut(), &user, self.policy.overdue_block_threshold)
            .await?
        {
            return Ok(None);
        }
        tx.commit().await?;

        Ok(Some(Notification::new(
            NotificationKind::AccountBlocked,
            user.email,
            json!({ "reason": "overdue books" }),
        )))
    }

    /// Pass 4: loans due within the lookahead window get their one reminder.
    /// `reminder_sent_at` on the reservation keeps this one-shot across runs.
    async fn send_return_reminders(
        &self,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) -> LendingResult<()> {
        let until = now + self.policy.reminder_lookahead();
        let candidates = {
            let mut tx = self.ledger.begin().await?;
            tx.active_due_within(now, until).await?
        };
        for reservation in candidates {
            match self.remind_one(reservation.id, now, until).await {
                Ok(Some(note)) => {
                    report.reminded += 1;
                    self.notifier.notify(note);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        reservation = %reservation.id,
                        error = %err,
                        "failed to send return reminder"
                    );
                }
            }
        }
        Ok(())
    }

    async fn remind_one(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> LendingResult<Option<Notification>> {
        let mut tx = self.ledger.begin().await?;
        let Some(mut reservation) = tx.find_reservation(id).await? else {
            return Ok(None);
        };
        let due_soon = reservation
            .expires_at
            .is_some_and(|due| due > now && due <= until);
        if reservation.status != ReservationStatus::Active
            || reservation.reminder_sent_at.is_some()
            || !due_soon
        {
            return Ok(None);
        }

        reservation.reminder_sent_at = Some(now);
        tx.update_reservation(reservation.clone()).await?;
        let book = tx.find_book(reservation.book_id).await?;
        let user = tx.find_user(reservation.user_id).await?;
        tx.commit().await?;

        Ok(user.map(|user| {
            Notification::new(
                NotificationKind::ReturnReminder,
                user.email,
                json!({
                    "reservation_id": reservation.id.to_string(),
                    "book_title": book.map(|b| b.title),
                    "due": reservation.expires_at,
                }),
            )
        }))
    }

    /// Pass 5: wishlist entries whose book is back on the shelf. Each entry
    /// is notified once and removed, so the wishlist drains itself.
    async fn drain_wishlist(&self, report: &mut SweepReport) -> LendingResult<()> {
        let candidates = {
            let mut tx = self.ledger.begin().await?;
            tx.wishlist_for_available_books().await?
        };
        for (entry, _) in candidates {
            match self.notify_one_wish(entry.id).await {
                Ok(Some(note)) => {
                    report.wishlist_notified += 1;
                    self.notifier.notify(note);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(entry = %entry.id, error = %err, "failed to drain wishlist entry");
                }
            }
        }
        Ok(())
    }

    async fn notify_one_wish(&self, id: WishlistId) -> LendingResult<Option<Notification>> {
        let mut tx = self.ledger.begin().await?;
        // Re-scan under the transaction; the entry may be gone or the book
        // reserved again since the outer scan.
        let Some((entry, book)) = tx
            .wishlist_for_available_books()
            .await?
            .into_iter()
            .find(|(entry, _)| entry.id == id)
        else {
            return Ok(None);
        };
        tx.remove_wishlist(entry.id).await?;
        let user = tx.find_user(entry.user_id).await?;
        tx.commit().await?;

        Ok(user.map(|user| {
            Notification::new(
                NotificationKind::BookAvailable,
                user.email,
                json!({
                    "book_id": book.id.to_string(),
                    "book_title": book.title,
                }),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::lending::testing::{fixture, reserve_and_activate};

    use biblio_kernel::model::WishlistEntry;
    use chrono::Duration;

    #[tokio::test]
    async fn unclaimed_confirmations_are_cancelled_by_the_system() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();

        let record = service
            .create_reservation(fx.reader.id, fx.book.id)
            .await
            .unwrap();
        service
            .confirm_reservation(record.reservation.id)
            .await
            .unwrap();

        // Six days later the five-day pickup window has elapsed.
        let report = sweeper
            .run_at(Utc::now() + Duration::days(6))
            .await
            .unwrap();
        assert_eq!(report.cancelled_unclaimed, 1);

        let mut tx = fx.ledger.begin().await.unwrap();
        let reservation = tx
            .find_reservation(record.reservation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Cancelled);
        assert_eq!(reservation.cancelled_by, Some(CancelledBy::System));
        let book = tx.find_book(fx.book.id).await.unwrap().unwrap();
        assert_eq!(book.status, BookStatus::Available);
        drop(tx);

        assert_eq!(fx.sink.count_of(NotificationKind::ReservationCancelled), 1);
    }

    #[tokio::test]
    async fn confirmations_inside_the_window_are_left_alone() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();

        let record = service
            .create_reservation(fx.reader.id, fx.book.id)
            .await
            .unwrap();
        service
            .confirm_reservation(record.reservation.id)
            .await
            .unwrap();

        let report = sweeper.run().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[tokio::test]
    async fn overrun_loans_expire_and_mark_the_book_overdue() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();
        let reservation = reserve_and_activate(&fx, &service).await;

        let report = sweeper
            .run_at(Utc::now() + Duration::days(15))
            .await
            .unwrap();
        assert_eq!(report.expired_overdue, 1);

        let mut tx = fx.ledger.begin().await.unwrap();
        let row = tx.find_reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(row.status, ReservationStatus::Expired);
        let book = tx.find_book(fx.book.id).await.unwrap().unwrap();
        assert_eq!(book.status, BookStatus::Overdue);
    }

    #[tokio::test]
    async fn two_overdue_books_get_the_reader_blocked_once() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();

        reserve_and_activate(&fx, &service).await;
        let second_book = fx.add_book("Second Book").await;
        let record = service
            .create_reservation(fx.reader.id, second_book.id)
            .await
            .unwrap();
        service
            .confirm_reservation(record.reservation.id)
            .await
            .unwrap();
        service.checkout(record.reservation.id).await.unwrap();

        let late = Utc::now() + Duration::days(15);
        let report = sweeper.run_at(late).await.unwrap();
        assert_eq!(report.expired_overdue, 2);
        assert_eq!(report.blocked, 1);

        let mut tx = fx.ledger.begin().await.unwrap();
        let reader = tx.find_user(fx.reader.id).await.unwrap().unwrap();
        assert!(reader.is_blocked);
        drop(tx);

        // Second run finds nothing new to do.
        let report = sweeper.run_at(late).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(fx.sink.count_of(NotificationKind::AccountBlocked), 1);
    }

    #[tokio::test]
    async fn one_overdue_book_is_below_the_blocking_threshold() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();
        reserve_and_activate(&fx, &service).await;

        let report = sweeper
            .run_at(Utc::now() + Duration::days(15))
            .await
            .unwrap();
        assert_eq!(report.expired_overdue, 1);
        assert_eq!(report.blocked, 0);

        let mut tx = fx.ledger.begin().await.unwrap();
        let reader = tx.find_user(fx.reader.id).await.unwrap().unwrap();
        assert!(!reader.is_blocked);
    }

    #[tokio::test]
    async fn return_reminder_fires_exactly_once() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();
        reserve_and_activate(&fx, &service).await;

        // Twelve days in, the loan is due in two days: inside the three-day
        // lookahead.
        let near_due = Utc::now() + Duration::days(12);
        let report = sweeper.run_at(near_due).await.unwrap();
        assert_eq!(report.reminded, 1);

        let report = sweeper.run_at(near_due).await.unwrap();
        assert_eq!(report.reminded, 0);
        assert_eq!(fx.sink.count_of(NotificationKind::ReturnReminder), 1);
    }

    #[tokio::test]
    async fn fresh_loans_get_no_reminder_yet() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();
        reserve_and_activate(&fx, &service).await;

        let report = sweeper.run().await.unwrap();
        assert_eq!(report.reminded, 0);
    }

    #[tokio::test]
    async fn wishlist_entries_for_available_books_are_notified_and_drained() {
        let fx = fixture().await;
        let sweeper = fx.sweeper();

        let mut tx = fx.ledger.begin().await.unwrap();
        tx.insert_wishlist(WishlistEntry::new(fx.reader.id, fx.book.id, Utc::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let report = sweeper.run().await.unwrap();
        assert_eq!(report.wishlist_notified, 1);
        assert_eq!(fx.sink.count_of(NotificationKind::BookAvailable), 1);

        let report = sweeper.run().await.unwrap();
        assert_eq!(report.wishlist_notified, 0);

        let mut tx = fx.ledger.begin().await.unwrap();
        assert!(tx
            .wishlist_for_user(fx.reader.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn wishlist_waits_while_the_book_is_out() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();
        let other = fx.add_reader("other@example.com").await;

        let reservation = reserve_and_activate(&fx, &service).await;

        let mut tx = fx.ledger.begin().await.unwrap();
        tx.insert_wishlist(WishlistEntry::new(other.id, fx.book.id, Utc::now()))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let report = sweeper.run().await.unwrap();
        assert_eq!(report.wishlist_notified, 0);

        service.return_book(reservation.id).await.unwrap();
        let report = sweeper.run().await.unwrap();
        assert_eq!(report.wishlist_notified, 1);
    }

    #[tokio::test]
    async fn full_sweep_is_idempotent() {
        let fx = fixture().await;
        let service = fx.service();
        let sweeper = fx.sweeper();

        // One unclaimed confirmation and one overrun loan side by side.
        let unclaimed_book = fx.add_book("Unclaimed").await;
        let unclaimed = service
            .create_reservation(fx.reader.id, unclaimed_book.id)
            .await
            .unwrap();
        service
            .confirm_reservation(unclaimed.reservation.id)
            .await
            .unwrap();
        reserve_and_activate(&fx, &service).await;

        let late = Utc::now() + Duration::days(20);
        let first = sweeper.run_at(late).await.unwrap();
        assert_eq!(first.cancelled_unclaimed, 1);
        assert_eq!(first.expired_overdue, 1);

        let second = sweeper.run_at(late).await.unwrap();
        assert_eq!(second, SweepReport::default());
    }
}
