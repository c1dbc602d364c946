use std::collections::BTreeMap;

use serde::Serialize;

/// Library-wide counters for the librarian dashboard.
///
/// A reader is `active` once they hold at least one reservation that reached
/// the collected stage (active, completed, or expired), and `inactive` while
/// they have no reservations at all; readers whose reservations never got
/// past pending or confirmed are in neither bucket but still count toward
/// `total_readers`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub total_readers: u64,
    pub active_readers: u64,
    pub inactive_readers: u64,
    pub blocked_users: u64,
    pub total_books: u64,
    pub available_books: u64,
    pub reserved_books: u64,
    pub checked_out_books: u64,
    pub overdue_books: u64,
    pub books_by_language: BTreeMap<String, u64>,
    pub books_by_category: BTreeMap<String, u64>,
    /// Completed loans over the whole ledger history.
    pub returned_books: u64,
}
