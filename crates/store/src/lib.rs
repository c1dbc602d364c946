//! In-memory implementation of the ledger traits.
//!
//! The whole store sits behind one async mutex: a [`MemoryTx`] owns the
//! guard for its entire lifetime, which makes every transaction serializable
//! and gives the same linearization a `SELECT ... FOR UPDATE` would. An undo
//! snapshot is taken at `begin`; dropping a transaction without committing
//! restores it, so aborted transitions leave no partial writes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use biblio_kernel::error::{LendingError, LendingResult};
use biblio_kernel::ledger::{Ledger, LedgerTx};
use biblio_kernel::model::{
    Book, BookId, BookListOptions, BookStatus, LibraryStats, Reservation, ReservationFilter,
    ReservationId, ReservationStatus, Role, User, UserId, WishlistEntry, WishlistId,
};

#[derive(Debug, Default, Clone)]
struct LedgerState {
    books: BTreeMap<BookId, Book>,
    reservations: BTreeMap<ReservationId, Reservation>,
    users: BTreeMap<UserId, User>,
    wishlist: BTreeMap<WishlistId, WishlistEntry>,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn begin(&self) -> LendingResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let undo = guard.clone();
        Ok(Box::new(MemoryTx {
            undo: Some(undo),
            guard,
        }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<LedgerState>,
    /// Snapshot restored on drop unless the transaction committed.
    undo: Option<LedgerState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(undo) = self.undo.take() {
            *self.guard = undo;
        }
    }
}

fn page<T>(mut rows: Vec<T>, limit: u64, offset: u64) -> (u64, Vec<T>) {
    let total = rows.len() as u64;
    let offset = offset.min(total) as usize;
    let mut items = rows.split_off(offset);
    items.truncate(limit as usize);
    (total, items)
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn insert_book(&mut self, book: Book) -> LendingResult<()> {
        if self.guard.books.contains_key(&book.id) {
            return Err(LendingError::Conflict("book already exists".into()));
        }
        self.guard.books.insert(book.id, book);
        Ok(())
    }

    async fn find_book(&mut self, id: BookId) -> LendingResult<Option<Book>> {
        Ok(self.guard.books.get(&id).cloned())
    }

    async fn list_books(&mut self, options: BookListOptions) -> LendingResult<(u64, Vec<Book>)> {
        let mut rows: Vec<Book> = self.guard.books.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, options.limit, options.offset))
    }

    async fn update_book(&mut self, book: Book) -> LendingResult<()> {
        match self.guard.books.get_mut(&book.id) {
            Some(row) => {
                *row = book;
                Ok(())
            }
            None => Err(LendingError::NotFound("book")),
        }
    }

    async fn delete_book(&mut self, id: BookId) -> LendingResult<()> {
        // Reservation history stays; it is an append-only ledger.
        self.guard
            .books
            .remove(&id)
            .map(|_| ())
            .ok_or(LendingError::NotFound("book"))
    }

    async fn set_book_status(
        &mut self,
        id: BookId,
        status: BookStatus,
        at: DateTime<Utc>,
    ) -> LendingResult<()> {
        match self.guard.books.get_mut(&id) {
            Some(row) => {
                row.status = status;
                row.updated_at = at;
                Ok(())
            }
            None => Err(LendingError::NotFound("book")),
        }
    }

    async fn insert_reservation(&mut self, reservation: Reservation) -> LendingResult<()> {
        if self.guard.reservations.contains_key(&reservation.id) {
            return Err(LendingError::Conflict("reservation already exists".into()));
        }
        self.guard.reservations.insert(reservation.id, reservation);
        Ok(())
    }

    async fn find_reservation(
        &mut self,
        id: ReservationId,
    ) -> LendingResult<Option<Reservation>> {
        Ok(self.guard.reservations.get(&id).cloned())
    }

    async fn update_reservation(&mut self, reservation: Reservation) -> LendingResult<()> {
        match self.guard.reservations.get_mut(&reservation.id) {
            Some(row) => {
                *row = reservation;
                Ok(())
            }
            None => Err(LendingError::NotFound("reservation")),
        }
    }

    async fn live_reservation_for_book(
        &mut self,
        book_id: BookId,
    ) -> LendingResult<Option<Reservation>> {
        Ok(self
            .guard
            .reservations
            .values()
            .find(|r| r.book_id == book_id && r.status.is_live())
            .cloned())
    }

    async fn outstanding_count(&mut self, user_id: UserId) -> LendingResult<u32> {
        Ok(self
            .guard
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && r.status.counts_against_quota())
            .count() as u32)
    }

    async fn overdue_count(&mut self, user_id: UserId) -> LendingResult<u32> {
        // Only the expired reservation currently holding the book counts;
        // older rows for the same book belong to past borrowers.
        let books = &self.guard.books;
        Ok(self
            .guard
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && r.status == ReservationStatus::Expired)
            .filter(|r| {
                books
                    .get(&r.book_id)
                    .is_some_and(|b| b.status == BookStatus::Overdue)
            })
            .count() as u32)
    }

    async fn confirmed_expiring_before(
        &mut self,
        at: DateTime<Utc>,
    ) -> LendingResult<Vec<Reservation>> {
        Ok(self
            .guard
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Confirmed)
            .filter(|r| r.expires_at.is_some_and(|deadline| deadline < at))
            .cloned()
            .collect())
    }

    async fn active_expiring_before(
        &mut self,
        at: DateTime<Utc>,
    ) -> LendingResult<Vec<Reservation>> {
        Ok(self
            .guard
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active)
            .filter(|r| r.expires_at.is_some_and(|deadline| deadline < at))
            .cloned()
            .collect())
    }

    async fn active_due_within(
        &mut self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> LendingResult<Vec<Reservation>> {
        Ok(self
            .guard
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.reminder_sent_at.is_none())
            .filter(|r| {
                r.expires_at
                    .is_some_and(|deadline| deadline > from && deadline <= until)
            })
            .cloned()
            .collect())
    }

    async fn list_reservations(
        &mut self,
        filter: ReservationFilter,
    ) -> LendingResult<(u64, Vec<Reservation>)> {
        let mut rows: Vec<Reservation> = self
            .guard
            .reservations
            .values()
            .filter(|r| filter.user_id.is_none_or(|user| r.user_id == user))
            .filter(|r| filter.status.is_none_or(|status| r.status == status))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn users_with_overdue(&mut self) -> LendingResult<Vec<UserId>> {
        let books = &self.guard.books;
        let users: BTreeSet<UserId> = self
            .guard
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Expired)
            .filter(|r| {
                books
                    .get(&r.book_id)
                    .is_some_and(|b| b.status == BookStatus::Overdue)
            })
            .map(|r| r.user_id)
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn insert_user(&mut self, user: User) -> LendingResult<()> {
        if self.guard.users.values().any(|u| u.email == user.email) {
            return Err(LendingError::Conflict("email already registered".into()));
        }
        self.guard.users.insert(user.id, user);
        Ok(())
    }

    async fn find_user(&mut self, id: UserId) -> LendingResult<Option<User>> {
        Ok(self.guard.users.get(&id).cloned())
    }

    async fn list_users(&mut self) -> LendingResult<Vec<User>> {
        Ok(self.guard.users.values().cloned().collect())
    }

    async fn set_blocked(&mut self, id: UserId, blocked: bool) -> LendingResult<()> {
        match self.guard.users.get_mut(&id) {
            Some(user) => {
                user.is_blocked = blocked;
                Ok(())
            }
            None => Err(LendingError::NotFound("user")),
        }
    }

    async fn insert_wishlist(&mut self, entry: WishlistEntry) -> LendingResult<()> {
        let duplicate = self
            .guard
            .wishlist
            .values()
            .any(|e| e.user_id == entry.user_id && e.book_id == entry.book_id);
        if duplicate {
            return Err(LendingError::Conflict(
                "book is already on your wishlist".into(),
            ));
        }
        self.guard.wishlist.insert(entry.id, entry);
        Ok(())
    }

    async fn remove_wishlist(&mut self, id: WishlistId) -> LendingResult<()> {
        self.guard
            .wishlist
            .remove(&id)
            .map(|_| ())
            .ok_or(LendingError::NotFound("wishlist entry"))
    }

    async fn wishlist_for_user(
        &mut self,
        user_id: UserId,
    ) -> LendingResult<Vec<WishlistEntry>> {
        Ok(self
            .guard
            .wishlist
            .values()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn wishlist_for_available_books(
        &mut self,
    ) -> LendingResult<Vec<(WishlistEntry, Book)>> {
        let books = &self.guard.books;
        Ok(self
            .guard
            .wishlist
            .values()
            .filter_map(|entry| {
                books
                    .get(&entry.book_id)
                    .filter(|b| b.status == BookStatus::Available)
                    .map(|b| (entry.clone(), b.clone()))
            })
            .collect())
    }

    async fn stats(&mut self) -> LendingResult<LibraryStats> {
        let state = &*self.guard;
        let mut stats = LibraryStats::default();

        for user in state.users.values() {
            if user.is_blocked {
                stats.blocked_users += 1;
            }
            if user.role != Role::Reader {
                continue;
            }
            stats.total_readers += 1;
            let mut has_any = false;
            let mut has_collected = false;
            for r in state.reservations.values().filter(|r| r.user_id == user.id) {
                has_any = true;
                if matches!(
                    r.status,
                    ReservationStatus::Active
                        | ReservationStatus::Completed
                        | ReservationStatus::Expired
                ) {
                    has_collected = true;
                    break;
                }
            }
            if has_collected {
                stats.active_readers += 1;
            } else if !has_any {
                stats.inactive_readers += 1;
            }
        }

        for book in state.books.values() {
            stats.total_books += 1;
            match book.status {
                BookStatus::Available => stats.available_books += 1,
                BookStatus::Reserved => stats.reserved_books += 1,
                BookStatus::CheckedOut => stats.checked_out_books += 1,
                BookStatus::Overdue => stats.overdue_books += 1,
            }
            *stats
                .books_by_language
                .entry(book.language.clone())
                .or_default() += 1;
            for category in &book.categories {
                *stats.books_by_category.entry(category.clone()).or_default() += 1;
            }
        }

        stats.returned_books = state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Completed)
            .count() as u64;

        Ok(stats)
    }

    async fn commit(mut self: Box<Self>) -> LendingResult<()> {
        self.undo = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblio_kernel::model::{CreateBook, CreateUser, Role};

    fn sample_book() -> Book {
        Book::new(
            CreateBook {
                title: "Dune".into(),
                author: "Frank Herbert".into(),
                year: 1965,
                categories: vec!["sci-fi".into()],
                language: "en".into(),
                description: "Desert planet".into(),
                cover_url: "https://covers.example/dune.jpg".into(),
            },
            Utc::now(),
        )
    }

    fn sample_user() -> User {
        User::new(CreateUser {
            name: "Reader".into(),
            email: format!("reader-{}@example.com", UserId::new()),
            role: Role::Reader,
        })
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_later_transactions() {
        let ledger = MemoryLedger::new();
        let book = sample_book();

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_book(book.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = ledger.begin().await.unwrap();
        let found = tx.find_book(book.id).await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn dropped_transactions_roll_back() {
        let ledger = MemoryLedger::new();
        let book = sample_book();

        {
            let mut tx = ledger.begin().await.unwrap();
            tx.insert_book(book.clone()).await.unwrap();
            // No commit.
        }

        let mut tx = ledger.begin().await.unwrap();
        assert!(tx.find_book(book.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rollback_restores_overwritten_rows() {
        let ledger = MemoryLedger::new();
        let book = sample_book();

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_book(book.clone()).await.unwrap();
        tx.commit().await.unwrap();

        {
            let mut tx = ledger.begin().await.unwrap();
            tx.set_book_status(book.id, BookStatus::Reserved, Utc::now())
                .await
                .unwrap();
            // No commit.
        }

        let mut tx = ledger.begin().await.unwrap();
        let found = tx.find_book(book.id).await.unwrap().unwrap();
        assert_eq!(found.status, BookStatus::Available);
    }

    #[tokio::test]
    async fn transactions_serialize_on_the_store() {
        let ledger = MemoryLedger::new();

        let held = ledger.begin().await.unwrap();
        // A second transaction must wait for the first to finish.
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            ledger.begin(),
        )
        .await;
        assert!(blocked.is_err(), "second begin should block");

        drop(held);
        let _tx = ledger.begin().await.unwrap();
    }

    #[tokio::test]
    async fn live_reservation_lookup_ignores_terminal_rows() {
        let ledger = MemoryLedger::new();
        let book = sample_book();
        let user = sample_user();

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_book(book.clone()).await.unwrap();
        tx.insert_user(user.clone()).await.unwrap();

        let mut done = Reservation::pending(book.id, user.id, Utc::now());
        done.status = ReservationStatus::Completed;
        tx.insert_reservation(done).await.unwrap();
        assert!(tx
            .live_reservation_for_book(book.id)
            .await
            .unwrap()
            .is_none());

        let live = Reservation::pending(book.id, user.id, Utc::now());
        tx.insert_reservation(live.clone()).await.unwrap();
        let found = tx.live_reservation_for_book(book.id).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(live.id));
    }

    #[tokio::test]
    async fn quota_count_skips_cancelled_and_completed() {
        let ledger = MemoryLedger::new();
        let book = sample_book();
        let user = sample_user();

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_book(book.clone()).await.unwrap();
        tx.insert_user(user.clone()).await.unwrap();

        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Expired,
            ReservationStatus::Cancelled,
            ReservationStatus::Completed,
        ] {
            let mut r = Reservation::pending(book.id, user.id, Utc::now());
            r.status = status;
            tx.insert_reservation(r).await.unwrap();
        }

        assert_eq!(tx.outstanding_count(user.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn overdue_count_ignores_past_borrowers() {
        let ledger = MemoryLedger::new();
        let book = sample_book();
        let past = sample_user();
        let current = sample_user();

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_book(book.clone()).await.unwrap();
        tx.insert_user(past.clone()).await.unwrap();
        tx.insert_user(current.clone()).await.unwrap();
        tx.set_book_status(book.id, BookStatus::Overdue, Utc::now())
            .await
            .unwrap();

        let mut done = Reservation::pending(book.id, past.id, Utc::now());
        done.status = ReservationStatus::Completed;
        tx.insert_reservation(done).await.unwrap();
        let mut held = Reservation::pending(book.id, current.id, Utc::now());
        held.status = ReservationStatus::Expired;
        tx.insert_reservation(held).await.unwrap();

        assert_eq!(tx.overdue_count(past.id).await.unwrap(), 0);
        assert_eq!(tx.overdue_count(current.id).await.unwrap(), 1);
        assert_eq!(tx.users_with_overdue().await.unwrap(), vec![current.id]);
    }

    #[tokio::test]
    async fn reservation_listing_filters_and_paginates() {
        let ledger = MemoryLedger::new();
        let book = sample_book();
        let user = sample_user();
        let other = sample_user();

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_book(book.clone()).await.unwrap();
        tx.insert_user(user.clone()).await.unwrap();
        tx.insert_user(other.clone()).await.unwrap();

        for owner in [user.id, user.id, other.id] {
            let mut r = Reservation::pending(book.id, owner, Utc::now());
            r.status = ReservationStatus::Cancelled;
            tx.insert_reservation(r).await.unwrap();
        }

        let (total, rows) = tx
            .list_reservations(ReservationFilter {
                user_id: Some(user.id),
                status: None,
                limit: 1,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 1);

        let (total, _) = tx
            .list_reservations(ReservationFilter {
                user_id: None,
                status: Some(ReservationStatus::Cancelled),
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn stats_partition_readers_and_tally_books() {
        let ledger = MemoryLedger::new();
        let borrower = sample_user();
        let browser = sample_user();
        let newcomer = sample_user();
        let librarian = User::new(CreateUser {
            name: "Desk".into(),
            email: "desk@example.com".into(),
            role: Role::Librarian,
        });

        let mut tx = ledger.begin().await.unwrap();
        for user in [&borrower, &browser, &newcomer, &librarian] {
            tx.insert_user(user.clone()).await.unwrap();
        }
        tx.set_blocked(borrower.id, true).await.unwrap();

        let book = sample_book();
        tx.insert_book(book.clone()).await.unwrap();
        let mut out = sample_book();
        out.status = BookStatus::CheckedOut;
        out.language = "uk".into();
        out.categories = vec!["sci-fi".into(), "classic".into()];
        tx.insert_book(out.clone()).await.unwrap();

        // The borrower returned one book and still holds the other; the
        // browser never got past a pending request.
        let mut done = Reservation::pending(book.id, borrower.id, Utc::now());
        done.status = ReservationStatus::Completed;
        tx.insert_reservation(done).await.unwrap();
        let mut held = Reservation::pending(out.id, borrower.id, Utc::now());
        held.status = ReservationStatus::Active;
        tx.insert_reservation(held).await.unwrap();
        tx.insert_reservation(Reservation::pending(book.id, browser.id, Utc::now()))
            .await
            .unwrap();

        let stats = tx.stats().await.unwrap();
        assert_eq!(stats.total_readers, 3);
        assert_eq!(stats.active_readers, 1);
        assert_eq!(stats.inactive_readers, 1);
        assert_eq!(stats.blocked_users, 1);
        assert_eq!(stats.total_books, 2);
        assert_eq!(stats.available_books, 1);
        assert_eq!(stats.checked_out_books, 1);
        assert_eq!(stats.reserved_books, 0);
        assert_eq!(stats.overdue_books, 0);
        assert_eq!(stats.books_by_language.get("en"), Some(&1));
        assert_eq!(stats.books_by_language.get("uk"), Some(&1));
        assert_eq!(stats.books_by_category.get("sci-fi"), Some(&2));
        assert_eq!(stats.books_by_category.get("classic"), Some(&1));
        assert_eq!(stats.returned_books, 1);
    }
}
