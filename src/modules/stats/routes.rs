use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    routing::get,
    Json, Router,
};

use biblio_http::error::AppError;
use biblio_http::extractor::CurrentUser;
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::LibraryStats;

use super::service::StatsService;

#[derive(Clone)]
pub struct StatsState {
    pub service: Arc<StatsService>,
    pub ledger: Arc<dyn Ledger>,
}

impl FromRef<StatsState> for Arc<dyn Ledger> {
    fn from_ref(state: &StatsState) -> Self {
        state.ledger.clone()
    }
}

pub fn router(state: StatsState) -> Router {
    Router::new().route("/", get(snapshot)).with_state(state)
}

async fn snapshot(
    State(state): State<StatsState>,
    user: CurrentUser,
) -> Result<Json<LibraryStats>, AppError> {
    user.require_librarian()?;
    Ok(Json(state.service.snapshot().await?))
}
