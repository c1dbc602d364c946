//! Librarian dashboard counters: reader activity, blocked accounts, and
//! shelf-status breakdowns of the catalog. Read-only over tables owned by
//! the other modules, so it carries no migrations of its own.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use biblio_kernel::ledger::Ledger;
use biblio_kernel::{InitCtx, Module};

pub mod routes;
pub mod service;

use routes::StatsState;
use service::StatsService;

pub struct StatsModule {
    service: Arc<StatsService>,
    ledger: Arc<dyn Ledger>,
}

impl StatsModule {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            service: Arc::new(StatsService::new(ledger.clone())),
            ledger,
        }
    }
}

#[async_trait]
impl Module for StatsModule {
    fn name(&self) -> &'static str {
        "stats"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("stats module initialized");
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(StatsState {
            service: self.service.clone(),
            ledger: self.ledger.clone(),
        })
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "paths": {
                "/": {
                    "get": {
                        "summary": "Library-wide counters (librarian)",
                        "responses": {
                            "200": { "description": "Counters" },
                            "403": { "description": "Not a librarian" }
                        }
                    }
                }
            }
        }))
    }
}
