use std::sync::Arc;

use biblio_kernel::error::LendingResult;
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::LibraryStats;

pub struct StatsService {
    ledger: Arc<dyn Ledger>,
}

impl StatsService {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    /// All counters from one ledger snapshot, so the numbers are mutually
    /// consistent even while transitions run concurrently.
    pub async fn snapshot(&self) -> LendingResult<LibraryStats> {
        let mut tx = self.ledger.begin().await?;
        tx.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblio_kernel::model::{
        Book, BookStatus, CreateBook, CreateUser, Reservation, ReservationStatus, Role, User,
    };
    use biblio_store::MemoryLedger;
    use chrono::Utc;

    fn reader(email: &str) -> User {
        User::new(CreateUser {
            name: "Reader".into(),
            email: email.into(),
            role: Role::Reader,
        })
    }

    fn book(title: &str, status: BookStatus) -> Book {
        let mut book = Book::new(
            CreateBook {
                title: title.into(),
                author: "Anon".into(),
                year: 2001,
                categories: vec!["fiction".into()],
                language: "en".into(),
                description: String::new(),
                cover_url: String::new(),
            },
            Utc::now(),
        );
        book.status = status;
        book
    }

    #[tokio::test]
    async fn snapshot_reflects_the_committed_ledger() {
        let ledger = Arc::new(MemoryLedger::new());
        let ada = reader("ada@example.com");
        let bob = reader("bob@example.com");
        let shelf = book("On Shelf", BookStatus::Available);
        let late = book("Kept Too Long", BookStatus::Overdue);

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_user(ada.clone()).await.unwrap();
        tx.insert_user(bob.clone()).await.unwrap();
        tx.insert_book(shelf.clone()).await.unwrap();
        tx.insert_book(late.clone()).await.unwrap();
        let mut loan = Reservation::pending(late.id, ada.id, Utc::now());
        loan.status = ReservationStatus::Expired;
        tx.insert_reservation(loan).await.unwrap();
        tx.commit().await.unwrap();

        let stats = StatsService::new(ledger).snapshot().await.unwrap();
        assert_eq!(stats.total_readers, 2);
        assert_eq!(stats.active_readers, 1);
        assert_eq!(stats.inactive_readers, 1);
        assert_eq!(stats.total_books, 2);
        assert_eq!(stats.available_books, 1);
        assert_eq!(stats.overdue_books, 1);
        assert_eq!(stats.returned_books, 0);
    }

    #[tokio::test]
    async fn uncommitted_writes_never_show_up() {
        let ledger = Arc::new(MemoryLedger::new());
        {
            let mut tx = ledger.begin().await.unwrap();
            tx.insert_book(book("Phantom", BookStatus::Available))
                .await
                .unwrap();
            // No commit.
        }

        let stats = StatsService::new(ledger).snapshot().await.unwrap();
        assert_eq!(stats.total_books, 0);
    }
}
