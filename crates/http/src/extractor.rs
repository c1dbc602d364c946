//! Request-layer identity.
//!
//! Token issuance and verification live in an upstream gateway; by the time
//! a request reaches this service the gateway has resolved the caller and
//! put their id in the `x-user-id` header. The extractor turns that claim
//! into a full [`User`] row so handlers can check role and blocked state.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::{User, UserId};

use crate::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller, resolved against the ledger.
pub struct CurrentUser {
    pub user: User,
}

impl CurrentUser {
    pub fn id(&self) -> UserId {
        self.user.id
    }

    pub fn is_librarian(&self) -> bool {
        self.user.is_librarian()
    }

    /// Reject callers without the librarian role.
    pub fn require_librarian(&self) -> Result<(), AppError> {
        if self.is_librarian() {
            Ok(())
        } else {
            Err(AppError::forbidden("librarian role required"))
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    Arc<dyn Ledger>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("not authenticated"))?;

        let user_id: UserId = header
            .parse()
            .map_err(|_| AppError::unauthorized("malformed user id"))?;

        let ledger = Arc::<dyn Ledger>::from_ref(state);
        let mut tx = ledger.begin().await.map_err(AppError::from)?;
        let user = tx
            .find_user(user_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::unauthorized("unknown user"))?;
        // Read-only lookup; the dropped transaction writes nothing back.

        Ok(Self { user })
    }
}
