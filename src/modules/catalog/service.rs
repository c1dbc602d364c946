//! Catalog maintenance and wishlist bookkeeping.
//!
//! Everything here leaves `Book::status` alone except through the explicit
//! guard on delete: a copy that is reserved or out cannot vanish from under
//! its reservation.

use std::sync::Arc;

use chrono::Utc;

use biblio_kernel::error::{LendingError, LendingResult};
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::{
    Book, BookId, BookListOptions, BookStatus, CreateBook, UpdateBook, UserId, WishlistEntry,
};

pub struct CatalogService {
    ledger: Arc<dyn Ledger>,
}

impl CatalogService {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn create_book(&self, event: CreateBook) -> LendingResult<Book> {
        if event.title.trim().is_empty() {
            return Err(LendingError::Validation("title must not be empty".into()));
        }
        let book = Book::new(event, Utc::now());
        let mut tx = self.ledger.begin().await?;
        tx.insert_book(book.clone()).await?;
        tx.commit().await?;
        tracing::info!(book = %book.id, title = %book.title, "book added to catalog");
        Ok(book)
    }

    pub async fn update_book(&self, id: BookId, event: UpdateBook) -> LendingResult<Book> {
        if event.title.trim().is_empty() {
            return Err(LendingError::Validation("title must not be empty".into()));
        }
        let mut tx = self.ledger.begin().await?;
        let mut book = tx
            .find_book(id)
            .await?
            .ok_or(LendingError::NotFound("book"))?;
        book.apply(event, Utc::now());
        tx.update_book(book.clone()).await?;
        tx.commit().await?;
        Ok(book)
    }

    /// Remove a copy from the catalog. Only an available copy may go; a
    /// reserved or collected one still belongs to a live reservation.
    pub async fn delete_book(&self, id: BookId) -> LendingResult<()> {
        let mut tx = self.ledger.begin().await?;
        let book = tx
            .find_book(id)
            .await?
            .ok_or(LendingError::NotFound("book"))?;
        if book.status != BookStatus::Available {
            return Err(LendingError::Conflict(format!(
                "book is {} and cannot be removed from the catalog",
                book.status
            )));
        }
        tx.delete_book(id).await?;
        tx.commit().await?;
        tracing::info!(book = %id, "book removed from catalog");
        Ok(())
    }

    pub async fn get_book(&self, id: BookId) -> LendingResult<Book> {
        let mut tx = self.ledger.begin().await?;
        tx.find_book(id)
            .await?
            .ok_or(LendingError::NotFound("book"))
    }

    pub async fn list_books(&self, options: BookListOptions) -> LendingResult<(u64, Vec<Book>)> {
        let mut tx = self.ledger.begin().await?;
        tx.list_books(options).await
    }

    /// Add a notify-me entry. Harmless for an available book; the next sweep
    /// simply drains it right away.
    pub async fn add_to_wishlist(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> LendingResult<WishlistEntry> {
        let mut tx = self.ledger.begin().await?;
        tx.find_book(book_id)
            .await?
            .ok_or(LendingError::NotFound("book"))?;
        let entry = WishlistEntry::new(user_id, book_id, Utc::now());
        tx.insert_wishlist(entry.clone()).await?;
        tx.commit().await?;
        Ok(entry)
    }

    pub async fn remove_from_wishlist(
        &self,
        user_id: UserId,
        book_id: BookId,
    ) -> LendingResult<()> {
        let mut tx = self.ledger.begin().await?;
        let entry = tx
            .wishlist_for_user(user_id)
            .await?
            .into_iter()
            .find(|entry| entry.book_id == book_id)
            .ok_or(LendingError::NotFound("wishlist entry"))?;
        tx.remove_wishlist(entry.id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// The caller's wishlist joined with book rows; entries for since-deleted
    /// books are dropped from the view.
    pub async fn wishlist(&self, user_id: UserId) -> LendingResult<Vec<(WishlistEntry, Book)>> {
        let mut tx = self.ledger.begin().await?;
        let entries = tx.wishlist_for_user(user_id).await?;
        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(book) = tx.find_book(entry.book_id).await? {
                rows.push((entry, book));
            }
        }
        Ok(rows)
    }
}
