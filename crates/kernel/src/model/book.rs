use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::BookId;

/// Shelf status of a single physical copy. One `Book` row is one copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    Available,
    Reserved,
    CheckedOut,
    Overdue,
}

impl BookStatus {
    /// The book is physically with a reader (collected or overdue).
    pub fn is_out(&self) -> bool {
        matches!(self, Self::CheckedOut | Self::Overdue)
    }
}

impl fmt::Display for BookStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::CheckedOut => "checked out",
            Self::Overdue => "overdue",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub categories: Vec<String>,
    pub language: String,
    pub description: String,
    pub cover_url: String,
    pub status: BookStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn new(event: CreateBook, now: DateTime<Utc>) -> Self {
        Self {
            id: BookId::new(),
            title: event.title,
            author: event.author,
            year: event.year,
            categories: event.categories,
            language: event.language,
            description: event.description,
            cover_url: event.cover_url,
            status: BookStatus::Available,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a librarian edit. Status is never touched here; only the
    /// lending state machine may move it.
    pub fn apply(&mut self, event: UpdateBook, now: DateTime<Utc>) {
        self.title = event.title;
        self.author = event.author;
        self.year = event.year;
        self.categories = event.categories;
        self.language = event.language;
        self.description = event.description;
        self.cover_url = event.cover_url;
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBook {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub categories: Vec<String>,
    pub language: String,
    pub description: String,
    pub cover_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateBook {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub categories: Vec<String>,
    pub language: String,
    pub description: String,
    pub cover_url: String,
}

/// Pagination window for catalog listings.
#[derive(Debug, Clone, Copy)]
pub struct BookListOptions {
    pub limit: u64,
    pub offset: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> CreateBook {
        CreateBook {
            title: "The Master and Margarita".into(),
            author: "Mikhail Bulgakov".into(),
            year: 1967,
            categories: vec!["fiction".into()],
            language: "en".into(),
            description: "A devil visits Moscow.".into(),
            cover_url: "https://covers.example/mm.jpg".into(),
        }
    }

    #[test]
    fn new_books_start_available() {
        let book = Book::new(sample_event(), Utc::now());
        assert_eq!(book.status, BookStatus::Available);
    }

    #[test]
    fn edits_do_not_touch_status() {
        let mut book = Book::new(sample_event(), Utc::now());
        book.status = BookStatus::Reserved;
        book.apply(
            UpdateBook {
                title: "Retitled".into(),
                author: book.author.clone(),
                year: book.year,
                categories: book.categories.clone(),
                language: book.language.clone(),
                description: book.description.clone(),
                cover_url: book.cover_url.clone(),
            },
            Utc::now(),
        );
        assert_eq!(book.title, "Retitled");
        assert_eq!(book.status, BookStatus::Reserved);
    }
}
