//! Book catalog and reader wishlists.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;

use biblio_kernel::ledger::Ledger;
use biblio_kernel::{InitCtx, Migration, Module};

pub mod routes;
pub mod service;

use routes::CatalogState;
use service::CatalogService;

pub struct CatalogModule {
    service: Arc<CatalogService>,
    ledger: Arc<dyn Ledger>,
}

impl CatalogModule {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            service: Arc::new(CatalogService::new(ledger.clone())),
            ledger,
        }
    }
}

#[async_trait]
impl Module for CatalogModule {
    fn name(&self) -> &'static str {
        "catalog"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!("catalog module initialized");
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(CatalogState {
            service: self.service.clone(),
            ledger: self.ledger.clone(),
        })
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![
            Migration {
                id: "0001_books",
                up: r#"
CREATE TABLE IF NOT EXISTS books (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    year INT NOT NULL,
    categories TEXT[] NOT NULL DEFAULT '{}',
    language TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    cover_url TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'available',
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_books_status ON books (status);
"#,
            },
            Migration {
                id: "0002_wishlist",
                up: r#"
CREATE TABLE IF NOT EXISTS wishlist (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users (id),
    book_id UUID NOT NULL REFERENCES books (id),
    added_at TIMESTAMPTZ NOT NULL,
    UNIQUE (user_id, book_id)
);
"#,
            },
        ]
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "paths": {
                "/books": {
                    "get": {
                        "summary": "Browse the catalog",
                        "responses": { "200": { "description": "Paginated books" } }
                    },
                    "post": {
                        "summary": "Add a book (librarian)",
                        "responses": {
                            "201": { "description": "Book created" },
                            "422": { "description": "Invalid book data" }
                        }
                    }
                },
                "/books/{id}": {
                    "get": {
                        "summary": "Fetch one book",
                        "responses": {
                            "200": { "description": "Book" },
                            "404": { "description": "Unknown book" }
                        }
                    },
                    "put": {
                        "summary": "Edit a book (librarian)",
                        "responses": { "200": { "description": "Book updated" } }
                    },
                    "delete": {
                        "summary": "Remove an available book (librarian)",
                        "responses": {
                            "204": { "description": "Book removed" },
                            "409": { "description": "Book is reserved or out" }
                        }
                    }
                },
                "/wishlist": {
                    "get": {
                        "summary": "The caller's wishlist",
                        "responses": { "200": { "description": "Wishlist entries" } }
                    }
                },
                "/wishlist/{book_id}": {
                    "post": {
                        "summary": "Ask to be notified when a book is available",
                        "responses": { "201": { "description": "Entry added" } }
                    },
                    "delete": {
                        "summary": "Drop a wishlist entry",
                        "responses": { "204": { "description": "Entry removed" } }
                    }
                }
            }
        }))
    }
}
