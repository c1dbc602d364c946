//! HTTP surface of the lending module.
//!
//! Reservations are created by the reader; confirm, checkout, and return
//! happen at the desk and require the librarian role. Decline is open to the
//! owning reader and to librarians; the service enforces ownership.

use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use biblio_http::error::AppError;
use biblio_http::extractor::CurrentUser;
use biblio_http::pagination::{PageQuery, Paginated};
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::{
    Book, BookId, CancelledBy, Reservation, ReservationFilter, ReservationId, ReservationStatus,
};

use super::service::{LendingService, ReservationRecord};
use super::sweeper::{SweepReport, Sweeper};

#[derive(Clone)]
pub struct LendingState {
    pub service: Arc<LendingService>,
    pub sweeper: Arc<Sweeper>,
    pub ledger: Arc<dyn Ledger>,
}

impl FromRef<LendingState> for Arc<dyn Ledger> {
    fn from_ref(state: &LendingState) -> Self {
        state.ledger.clone()
    }
}

pub fn router(state: LendingState) -> Router {
    Router::new()
        .route(
            "/reservations",
            post(create_reservation).get(list_reservations),
        )
        .route("/reservations/mine", get(list_my_reservations))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/confirm", patch(confirm_reservation))
        .route("/reservations/{id}/checkout", patch(checkout))
        .route("/reservations/{id}/decline", patch(decline))
        .route("/reservations/{id}/return", patch(return_book))
        .route("/sweep", post(run_sweep))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateReservationRequest {
    book_id: BookId,
}

#[derive(Debug, Deserialize)]
struct ReservationListQuery {
    status: Option<String>,
    page: Option<u64>,
    per_page: Option<u64>,
}

impl ReservationListQuery {
    fn page_query(&self) -> PageQuery {
        let defaults = PageQuery::default();
        PageQuery {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }

    fn status(&self) -> Result<Option<ReservationStatus>, AppError> {
        self.status
            .as_deref()
            .map(|s| s.parse().map_err(AppError::from))
            .transpose()
    }
}

/// Book fields embedded in reservation responses.
#[derive(Debug, Serialize)]
struct BookSummary {
    id: BookId,
    title: String,
    author: String,
    status: biblio_kernel::model::BookStatus,
}

impl From<Book> for BookSummary {
    fn from(book: Book) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author: book.author,
            status: book.status,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReservationResponse {
    id: ReservationId,
    user_id: biblio_kernel::model::UserId,
    status: ReservationStatus,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    cancelled_by: Option<CancelledBy>,
    book: Option<BookSummary>,
}

impl ReservationResponse {
    fn from_parts(reservation: Reservation, book: Option<Book>) -> Self {
        Self {
            id: reservation.id,
            user_id: reservation.user_id,
            status: reservation.status,
            created_at: reservation.created_at,
            expires_at: reservation.expires_at,
            cancelled_by: reservation.cancelled_by,
            book: book.map(BookSummary::from),
        }
    }
}

impl From<ReservationRecord> for ReservationResponse {
    fn from(record: ReservationRecord) -> Self {
        Self::from_parts(record.reservation, Some(record.book))
    }
}

async fn create_reservation(
    State(state): State<LendingState>,
    user: CurrentUser,
    Json(request): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let record = state
        .service
        .create_reservation(user.id(), request.book_id)
        .await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn get_reservation(
    State(state): State<LendingState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, AppError> {
    let (reservation, book) = state.service.get_reservation(id).await?;
    if !user.is_librarian() && reservation.user_id != user.id() {
        // Same shape as a genuinely missing row; readers cannot probe for
        // other readers' reservations.
        return Err(AppError::not_found("reservation not found"));
    }
    Ok(Json(ReservationResponse::from_parts(reservation, book)))
}

async fn list_reservations(
    State(state): State<LendingState>,
    user: CurrentUser,
    Query(query): Query<ReservationListQuery>,
) -> Result<Json<Paginated<ReservationResponse>>, AppError> {
    user.require_librarian()?;
    let page = query.page_query();
    let filter = ReservationFilter {
        user_id: None,
        status: query.status()?,
        limit: page.limit(),
        offset: page.offset(),
    };
    let (total, rows) = state.service.list_reservations(filter).await?;
    let items = rows
        .into_iter()
        .map(|(reservation, book)| ReservationResponse::from_parts(reservation, book))
        .collect();
    Ok(Json(Paginated::new(total, &page, items)))
}

async fn list_my_reservations(
    State(state): State<LendingState>,
    user: CurrentUser,
    Query(query): Query<ReservationListQuery>,
) -> Result<Json<Paginated<ReservationResponse>>, AppError> {
    let page = query.page_query();
    let filter = ReservationFilter {
        user_id: Some(user.id()),
        status: query.status()?,
        limit: page.limit(),
        offset: page.offset(),
    };
    let (total, rows) = state.service.list_reservations(filter).await?;
    let items = rows
        .into_iter()
        .map(|(reservation, book)| ReservationResponse::from_parts(reservation, book))
        .collect();
    Ok(Json(Paginated::new(total, &page, items)))
}

async fn confirm_reservation(
    State(state): State<LendingState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, AppError> {
    user.require_librarian()?;
    let record = state.service.confirm_reservation(id).await?;
    Ok(Json(record.into()))
}

async fn checkout(
    State(state): State<LendingState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, AppError> {
    user.require_librarian()?;
    let record = state.service.checkout(id).await?;
    Ok(Json(record.into()))
}

async fn decline(
    State(state): State<LendingState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, AppError> {
    let record = state.service.decline(id, &user.user).await?;
    Ok(Json(record.into()))
}

async fn return_book(
    State(state): State<LendingState>,
    user: CurrentUser,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, AppError> {
    user.require_librarian()?;
    let record = state.service.return_book(id).await?;
    Ok(Json(record.into()))
}

/// Kick off a reconciliation sweep outside its schedule, for operators.
async fn run_sweep(
    State(state): State<LendingState>,
    user: CurrentUser,
) -> Result<Json<SweepReport>, AppError> {
    user.require_librarian()?;
    let report = state.sweeper.run().await?;
    Ok(Json(report))
}
