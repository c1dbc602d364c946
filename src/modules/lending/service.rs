//! Reservation lifecycle transitions.
//!
//! Each operation runs its precondition checks and writes inside a single
//! ledger transaction, then emits a notification only after the commit.
//! Failing any precondition leaves the store untouched because the dropped
//! transaction rolls back.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use biblio_kernel::error::{LendingError, LendingResult};
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::{
    Book, BookId, BookStatus, CancelledBy, Reservation, ReservationFilter, ReservationId,
    ReservationStatus, User, UserId,
};
use biblio_kernel::notify::{Notification, NotificationKind, NotificationSink};
use biblio_kernel::settings::LendingSettings;

use super::guard;

/// A reservation together with its book, as handed back to the route layer.
#[derive(Debug, Clone)]
pub struct ReservationRecord {
    pub reservation: Reservation,
    pub book: Book,
}

pub struct LendingService {
    ledger: Arc<dyn Ledger>,
    notifier: Arc<dyn NotificationSink>,
    policy: LendingSettings,
}

impl LendingService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn NotificationSink>,
        policy: LendingSettings,
    ) -> Self {
        Self {
            ledger,
            notifier,
            policy,
        }
    }

    /// Place a new reservation: the book moves `available -> reserved` and a
    /// `pending` reservation row appears, or nothing happens at all.
    pub async fn create_reservation(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> LendingResult<ReservationRecord> {
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let user = tx
            .find_user(user_id)
            .await?
            .ok_or(LendingError::NotFound("user"))?;
        if user.is_blocked {
            return Err(LendingError::Forbidden(
                "account is blocked; return overdue books and contact a librarian".into(),
            ));
        }
        // The sweep normally blocks delinquents, but books may have gone
        // overdue since its last run. Check again at the gate.
        if guard::block_if_delinquent(tx.as_mut(), &user, self.policy.overdue_block_threshold)
            .await?
        {
            tx.commit().await?;
            self.notifier.notify(Notification::new(
                NotificationKind::AccountBlocked,
                &user.email,
                json!({ "reason": "overdue books" }),
            ));
            return Err(LendingError::Forbidden(
                "account is blocked; return overdue books and contact a librarian".into(),
            ));
        }

        guard::check_quota(tx.as_mut(), user_id, self.policy.reservation_limit).await?;

        let mut book = tx
            .find_book(book_id)
            .await?
            .ok_or(LendingError::NotFound("book"))?;
        if tx.live_reservation_for_book(book_id).await?.is_some() {
            return Err(LendingError::Conflict(
                "book already has a live reservation".into(),
            ));
        }
        if book.status != BookStatus::Available {
            return Err(LendingError::Conflict(format!(
                "book is {} and cannot be reserved",
                book.status
            )));
        }

        let reservation = Reservation::pending(book_id, user_id, now);
        tx.insert_reservation(reservation.clone()).await?;
        tx.set_book_status(book_id, BookStatus::Reserved, now).await?;
        tx.commit().await?;

        book.status = BookStatus::Reserved;
        book.updated_at = now;

        tracing::info!(
            reservation = %reservation.id,
            book = %book_id,
            user = %user_id,
            "reservation placed"
        );
        self.notifier.notify(Notification::new(
            NotificationKind::ReservationReceived,
            &user.email,
            json!({
                "reservation_id": reservation.id.to_string(),
                "book_title": book.title,
            }),
        ));

        Ok(ReservationRecord { reservation, book })
    }

    /// Librarian approval: `pending -> confirmed`, starting the pickup
    /// countdown.
    pub async fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> LendingResult<ReservationRecord> {
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let mut reservation = tx
            .find_reservation(reservation_id)
            .await?
            .ok_or(LendingError::NotFound("reservation"))?;
        if reservation.status != ReservationStatus::Pending {
            return Err(LendingError::Conflict(format!(
                "reservation is {} and cannot be confirmed",
                reservation.status
            )));
        }
        let book = tx
            .find_book(reservation.book_id)
            .await?
            .ok_or(LendingError::NotFound("book"))?;
        if book.status.is_out() {
            return Err(LendingError::Conflict(format!(
                "book is {} and cannot be confirmed for pickup",
                book.status
            )));
        }
        let user = tx
            .find_user(reservation.user_id)
            .await?
            .ok_or(LendingError::NotFound("user"))?;

        reservation.status = ReservationStatus::Confirmed;
        reservation.expires_at = Some(now + self.policy.pickup_window());
        tx.update_reservation(reservation.clone()).await?;
        tx.commit().await?;

        tracing::info!(
            reservation = %reservation.id,
            pickup_by = ?reservation.expires_at,
            "reservation confirmed"
        );
        self.notifier.notify(Notification::new(
            NotificationKind::ReservationConfirmed,
            &user.email,
            json!({
                "reservation_id": reservation.id.to_string(),
                "book_title": book.title,
                "pickup_by": reservation.expires_at,
            }),
        ));

        Ok(ReservationRecord { reservation, book })
    }

    /// Hand the book over at the desk: `confirmed -> active`, book
    /// `reserved -> checked_out`, loan countdown starts.
    pub async fn checkout(&self, reservation_id: ReservationId) -> LendingResult<ReservationRecord> {
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let mut reservation = tx
            .find_reservation(reservation_id)
            .await?
            .ok_or(LendingError::NotFound("reservation"))?;
        if reservation.status != ReservationStatus::Confirmed {
            return Err(LendingError::Conflict(format!(
                "reservation is {} and cannot be checked out",
                reservation.status
            )));
        }
        let mut book = tx
            .find_book(reservation.book_id)
            .await?
            .ok_or(LendingError::NotFound("book"))?;
        if book.status != BookStatus::Reserved {
            return Err(LendingError::Conflict(format!(
                "book is {} and cannot be checked out",
                book.status
            )));
        }
        let user = tx
            .find_user(reservation.user_id)
            .await?
            .ok_or(LendingError::NotFound("user"))?;

        reservation.status = ReservationStatus::Active;
        reservation.expires_at = Some(now + self.policy.loan_window());
        tx.update_reservation(reservation.clone()).await?;
        tx.set_book_status(book.id, BookStatus::CheckedOut, now)
            .await?;
        tx.commit().await?;

        book.status = BookStatus::CheckedOut;
        book.updated_at = now;

        tracing::info!(
            reservation = %reservation.id,
            due = ?reservation.expires_at,
            "book checked out"
        );
        self.notifier.notify(Notification::new(
            NotificationKind::BookCheckedOut,
            &user.email,
            json!({
                "reservation_id": reservation.id.to_string(),
                "book_title": book.title,
                "due": reservation.expires_at,
            }),
        ));

        Ok(ReservationRecord { reservation, book })
    }

    /// Withdraw a reservation that has not been collected yet. Readers may
    /// only withdraw their own; librarians may withdraw any.
    pub async fn decline(
        &self,
        reservation_id: ReservationId,
        actor: &User,
    ) -> LendingResult<ReservationRecord> {
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let mut reservation = tx
            .find_reservation(reservation_id)
            .await?
            .ok_or(LendingError::NotFound("reservation"))?;
        if !actor.is_librarian() && reservation.user_id != actor.id {
            return Err(LendingError::Forbidden(
                "only your own reservations can be cancelled".into(),
            ));
        }
        let mut book = tx
            .find_book(reservation.book_id)
            .await?
            .ok_or(LendingError::NotFound("book"))?;
        if book.status.is_out() {
            return Err(LendingError::Conflict(
                "book has been collected; it must be returned instead".into(),
            ));
        }
        if !matches!(
            reservation.status,
            ReservationStatus::Pending | ReservationStatus::Confirmed
        ) {
            return Err(LendingError::Conflict(format!(
                "reservation is {} and cannot be cancelled",
                reservation.status
            )));
        }
        let owner = tx
            .find_user(reservation.user_id)
            .await?
            .ok_or(LendingError::NotFound("user"))?;

        reservation.status = ReservationStatus::Cancelled;
        reservation.cancelled_by = Some(if actor.is_librarian() && actor.id != reservation.user_id {
            CancelledBy::Librarian
        } else {
            CancelledBy::User
        });
        tx.update_reservation(reservation.clone()).await?;
        tx.set_book_status(book.id, BookStatus::Available, now)
            .await?;
        tx.commit().await?;

        book.status = BookStatus::Available;
        book.updated_at = now;

        tracing::info!(
            reservation = %reservation.id,
            cancelled_by = ?reservation.cancelled_by,
            "reservation cancelled"
        );
        self.notifier.notify(Notification::new(
            NotificationKind::ReservationCancelled,
            &owner.email,
            json!({
                "reservation_id": reservation.id.to_string(),
                "book_title": book.title,
            }),
        ));

        Ok(ReservationRecord { reservation, book })
    }

    /// Take the book back at the desk. Works for on-time and overdue loans
    /// alike; either way the loan closes as `completed` and the book goes
    /// back on the shelf.
    pub async fn return_book(
        &self,
        reservation_id: ReservationId,
    ) -> LendingResult<ReservationRecord> {
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let mut reservation = tx
            .find_reservation(reservation_id)
            .await?
            .ok_or(LendingError::NotFound("reservation"))?;
        if !matches!(
            reservation.status,
            ReservationStatus::Active | ReservationStatus::Expired
        ) {
            return Err(LendingError::Conflict(format!(
                "reservation is {} and does not hold a book",
                reservation.status
            )));
        }
        let mut book = tx
            .find_book(reservation.book_id)
            .await?
            .ok_or(LendingError::NotFound("book"))?;
        if !book.status.is_out() {
            return Err(LendingError::Conflict(format!(
                "book is {} and cannot be returned",
                book.status
            )));
        }
        let user = tx
            .find_user(reservation.user_id)
            .await?
            .ok_or(LendingError::NotFound("user"))?;

        reservation.status = ReservationStatus::Completed;
        tx.update_reservation(reservation.clone()).await?;
        tx.set_book_status(book.id, BookStatus::Available, now)
            .await?;
        tx.commit().await?;

        book.status = BookStatus::Available;
        book.updated_at = now;

        tracing::info!(reservation = %reservation.id, book = %book.id, "book returned");
        self.notifier.notify(Notification::new(
            NotificationKind::BookReturned,
            &user.email,
            json!({
                "reservation_id": reservation.id.to_string(),
                "book_title": book.title,
            }),
        ));

        Ok(ReservationRecord { reservation, book })
    }

    pub async fn get_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> LendingResult<(Reservation, Option<Book>)> {
        let mut tx = self.ledger.begin().await?;
        let reservation = tx
            .find_reservation(reservation_id)
            .await?
            .ok_or(LendingError::NotFound("reservation"))?;
        let book = tx.find_book(reservation.book_id).await?;
        Ok((reservation, book))
    }

    /// Listing joined with book rows. A reservation whose book was since
    /// deleted comes back without one.
    pub async fn list_reservations(
        &self,
        filter: ReservationFilter,
    ) -> LendingResult<(u64, Vec<(Reservation, Option<Book>)>)> {
        let mut tx = self.ledger.begin().await?;
        let (total, reservations) = tx.list_reservations(filter).await?;
        let mut rows = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            let book = tx.find_book(reservation.book_id).await?;
            rows.push((reservation, book));
        }
        Ok((total, rows))
    }
}
