use std::sync::Arc;

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Serialize;

use biblio_http::error::AppError;
use biblio_http::extractor::CurrentUser;
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::{CreateUser, Role, User, UserId};

use super::service::AccountsService;

#[derive(Clone)]
pub struct AccountsState {
    pub service: Arc<AccountsService>,
    pub ledger: Arc<dyn Ledger>,
}

impl FromRef<AccountsState> for Arc<dyn Ledger> {
    fn from_ref(state: &AccountsState) -> Self {
        state.ledger.clone()
    }
}

pub fn router(state: AccountsState) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}/unblock", patch(unblock))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct UserResponse {
    id: UserId,
    name: String,
    email: String,
    role: Role,
    is_blocked: bool,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
            is_blocked: user.is_blocked,
        }
    }
}

async fn me(user: CurrentUser) -> Json<UserResponse> {
    Json(user.user.into())
}

async fn list_users(
    State(state): State<AccountsState>,
    user: CurrentUser,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    user.require_librarian()?;
    let users = state.service.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

async fn create_user(
    State(state): State<AccountsState>,
    user: CurrentUser,
    Json(event): Json<CreateUser>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    user.require_librarian()?;
    let created = state.service.create_user(event).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn unblock(
    State(state): State<AccountsState>,
    user: CurrentUser,
    Path(id): Path<UserId>,
) -> Result<Json<UserResponse>, AppError> {
    user.require_librarian()?;
    let unblocked = state.service.unblock(id).await?;
    Ok(Json(unblocked.into()))
}
