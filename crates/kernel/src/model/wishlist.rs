use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{BookId, UserId, WishlistId};

/// Passive notify-on-availability entry. This is not a reservation queue:
/// entries carry no position and grant no claim on the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: WishlistId,
    pub user_id: UserId,
    pub book_id: BookId,
    pub added_at: DateTime<Utc>,
}

impl WishlistEntry {
    pub fn new(user_id: UserId, book_id: BookId, now: DateTime<Utc>) -> Self {
        Self {
            id: WishlistId::new(),
            user_id,
            book_id,
            added_at: now,
        }
    }
}
