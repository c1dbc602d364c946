//! Transactional store boundary for the catalog and the reservation ledger.
//!
//! Every state-machine transition runs inside one [`LedgerTx`]: reads made
//! through the transaction observe a consistent snapshot, writes become
//! visible only on `commit`, and a transaction dropped without committing
//! leaves the store untouched. Implementations must linearize transactions
//! touching the same book so that two concurrent transitions can never both
//! pass their precondition checks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LendingResult;
use crate::model::{
    Book, BookId, BookListOptions, BookStatus, LibraryStats, Reservation, ReservationFilter,
    ReservationId, User, UserId, WishlistEntry, WishlistId,
};

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn begin(&self) -> LendingResult<Box<dyn LedgerTx>>;
}

#[async_trait]
pub trait LedgerTx: Send {
    // Catalog.
    async fn insert_book(&mut self, book: Book) -> LendingResult<()>;
    async fn find_book(&mut self, id: BookId) -> LendingResult<Option<Book>>;
    /// Newest first. Returns the total row count alongside the page.
    async fn list_books(&mut self, options: BookListOptions) -> LendingResult<(u64, Vec<Book>)>;
    async fn update_book(&mut self, book: Book) -> LendingResult<()>;
    async fn delete_book(&mut self, id: BookId) -> LendingResult<()>;
    async fn set_book_status(
        &mut self,
        id: BookId,
        status: BookStatus,
        at: DateTime<Utc>,
    ) -> LendingResult<()>;

    // Reservation ledger. Rows are append-only; terminal reservations stay
    // around as history.
    async fn insert_reservation(&mut self, reservation: Reservation) -> LendingResult<()>;
    async fn find_reservation(
        &mut self,
        id: ReservationId,
    ) -> LendingResult<Option<Reservation>>;
    async fn update_reservation(&mut self, reservation: Reservation) -> LendingResult<()>;
    /// The at-most-one reservation in a live state referencing this book.
    async fn live_reservation_for_book(
        &mut self,
        book_id: BookId,
    ) -> LendingResult<Option<Reservation>>;
    /// Reservations counted against the user's borrowing quota.
    async fn outstanding_count(&mut self, user_id: UserId) -> LendingResult<u32>;
    /// Reservations of this user whose book is currently overdue.
    async fn overdue_count(&mut self, user_id: UserId) -> LendingResult<u32>;
    async fn confirmed_expiring_before(
        &mut self,
        at: DateTime<Utc>,
    ) -> LendingResult<Vec<Reservation>>;
    async fn active_expiring_before(
        &mut self,
        at: DateTime<Utc>,
    ) -> LendingResult<Vec<Reservation>>;
    /// Active reservations due in `(from, until]` that have not been
    /// reminded yet.
    async fn active_due_within(
        &mut self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> LendingResult<Vec<Reservation>>;
    /// Newest first, filterable by user and status.
    async fn list_reservations(
        &mut self,
        filter: ReservationFilter,
    ) -> LendingResult<(u64, Vec<Reservation>)>;
    /// Users holding at least one reservation whose book is overdue.
    async fn users_with_overdue(&mut self) -> LendingResult<Vec<UserId>>;

    // Users.
    async fn insert_user(&mut self, user: User) -> LendingResult<()>;
    async fn find_user(&mut self, id: UserId) -> LendingResult<Option<User>>;
    async fn list_users(&mut self) -> LendingResult<Vec<User>>;
    async fn set_blocked(&mut self, id: UserId, blocked: bool) -> LendingResult<()>;

    // Wishlist.
    async fn insert_wishlist(&mut self, entry: WishlistEntry) -> LendingResult<()>;
    async fn remove_wishlist(&mut self, id: WishlistId) -> LendingResult<()>;
    async fn wishlist_for_user(&mut self, user_id: UserId)
        -> LendingResult<Vec<WishlistEntry>>;
    /// Entries whose book is back on the shelf, ready to notify and drain.
    async fn wishlist_for_available_books(
        &mut self,
    ) -> LendingResult<Vec<(WishlistEntry, Book)>>;

    /// Library-wide counters, all computed in one consistent snapshot.
    async fn stats(&mut self) -> LendingResult<LibraryStats>;

    async fn commit(self: Box<Self>) -> LendingResult<()>;
}
