//! HTTP surface of the catalog module. Browsing is open to any
//! authenticated caller; mutations require the librarian role.

use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use biblio_http::error::AppError;
use biblio_http::extractor::CurrentUser;
use biblio_http::pagination::{PageQuery, Paginated};
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::{Book, BookId, BookListOptions, BookStatus, CreateBook, UpdateBook};

use super::service::CatalogService;

#[derive(Clone)]
pub struct CatalogState {
    pub service: Arc<CatalogService>,
    pub ledger: Arc<dyn Ledger>,
}

impl FromRef<CatalogState> for Arc<dyn Ledger> {
    fn from_ref(state: &CatalogState) -> Self {
        state.ledger.clone()
    }
}

pub fn router(state: CatalogState) -> Router {
    Router::new()
        .route("/books", post(create_book).get(list_books))
        .route(
            "/books/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .route("/wishlist", get(my_wishlist))
        .route(
            "/wishlist/{book_id}",
            post(add_to_wishlist).delete(remove_from_wishlist),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct BookResponse {
    id: BookId,
    title: String,
    author: String,
    year: i32,
    categories: Vec<String>,
    language: String,
    description: String,
    cover_url: String,
    status: BookStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Book> for BookResponse {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            year: book.year,
            categories: book.categories,
            language: book.language,
            description: book.description,
            cover_url: book.cover_url,
            status: book.status,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct WishlistResponse {
    book: BookResponse,
    added_at: DateTime<Utc>,
}

async fn create_book(
    State(state): State<CatalogState>,
    user: CurrentUser,
    Json(event): Json<CreateBook>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    user.require_librarian()?;
    let book = state.service.create_book(event).await?;
    Ok((StatusCode::CREATED, Json(book.into())))
}

async fn list_books(
    State(state): State<CatalogState>,
    _user: CurrentUser,
    Query(page): Query<PageQuery>,
) -> Result<Json<Paginated<BookResponse>>, AppError> {
    let (total, books) = state
        .service
        .list_books(BookListOptions {
            limit: page.limit(),
            offset: page.offset(),
        })
        .await?;
    let items = books.into_iter().map(BookResponse::from).collect();
    Ok(Json(Paginated::new(total, &page, items)))
}

async fn get_book(
    State(state): State<CatalogState>,
    _user: CurrentUser,
    Path(id): Path<BookId>,
) -> Result<Json<BookResponse>, AppError> {
    let book = state.service.get_book(id).await?;
    Ok(Json(book.into()))
}

async fn update_book(
    State(state): State<CatalogState>,
    user: CurrentUser,
    Path(id): Path<BookId>,
    Json(event): Json<UpdateBook>,
) -> Result<Json<BookResponse>, AppError> {
    user.require_librarian()?;
    let book = state.service.update_book(id, event).await?;
    Ok(Json(book.into()))
}

async fn delete_book(
    State(state): State<CatalogState>,
    user: CurrentUser,
    Path(id): Path<BookId>,
) -> Result<StatusCode, AppError> {
    user.require_librarian()?;
    state.service.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn my_wishlist(
    State(state): State<CatalogState>,
    user: CurrentUser,
) -> Result<Json<Vec<WishlistResponse>>, AppError> {
    let rows = state.service.wishlist(user.id()).await?;
    let items = rows
        .into_iter()
        .map(|(entry, book)| WishlistResponse {
            book: book.into(),
            added_at: entry.added_at,
        })
        .collect();
    Ok(Json(items))
}

async fn add_to_wishlist(
    State(state): State<CatalogState>,
    user: CurrentUser,
    Path(book_id): Path<BookId>,
) -> Result<StatusCode, AppError> {
    state.service.add_to_wishlist(user.id(), book_id).await?;
    Ok(StatusCode::CREATED)
}

async fn remove_from_wishlist(
    State(state): State<CatalogState>,
    user: CurrentUser,
    Path(book_id): Path<BookId>,
) -> Result<StatusCode, AppError> {
    state
        .service
        .remove_from_wishlist(user.id(), book_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
