//! Reader and librarian accounts.
//!
//! Blocking is owned by the lending module; this module only exposes the
//! librarian's unblock lever and account lookups.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use biblio_kernel::ledger::Ledger;
use biblio_kernel::{InitCtx, Migration, Module};

pub mod routes;
pub mod service;

use routes::AccountsState;
use service::AccountsService;

pub struct AccountsModule {
    service: Arc<AccountsService>,
    ledger: Arc<dyn Ledger>,
}

impl AccountsModule {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            service: Arc::new(AccountsService::new(ledger.clone())),
            ledger,
        }
    }
}

#[async_trait]
impl Module for AccountsModule {
    fn name(&self) -> &'static str {
        "accounts"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("accounts module initialized");
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(AccountsState {
            service: self.service.clone(),
            ledger: self.ledger.clone(),
        })
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "0001_users",
            up: r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL DEFAULT 'reader',
    is_blocked BOOLEAN NOT NULL DEFAULT FALSE
);
"#,
        }]
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "paths": {
                "/me": {
                    "get": {
                        "summary": "The caller's own account",
                        "responses": { "200": { "description": "Account" } }
                    }
                },
                "/users": {
                    "get": {
                        "summary": "List accounts (librarian)",
                        "responses": { "200": { "description": "Accounts" } }
                    },
                    "post": {
                        "summary": "Register an account (librarian)",
                        "responses": {
                            "201": { "description": "Account created" },
                            "409": { "description": "Email already registered" }
                        }
                    }
                },
                "/users/{id}/unblock": {
                    "patch": {
                        "summary": "Lift a delinquency block (librarian)",
                        "responses": {
                            "200": { "description": "Account unblocked" },
                            "404": { "description": "Unknown account" }
                        }
                    }
                }
            }
        }))
    }
}
