//! Reservation lifecycle: the state machine, its guards, the reconciliation
//! sweep, and the HTTP surface.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use tokio::task::JoinHandle;

use biblio_kernel::ledger::Ledger;
use biblio_kernel::notify::NotificationSink;
use biblio_kernel::settings::Settings;
use biblio_kernel::{InitCtx, Migration, Module};

pub mod guard;
pub mod routes;
pub mod service;
pub mod sweeper;

use routes::LendingState;
use service::LendingService;
use sweeper::Sweeper;

pub struct LendingModule {
    service: Arc<LendingService>,
    sweeper: Arc<Sweeper>,
    ledger: Arc<dyn Ledger>,
    sweep_interval: std::time::Duration,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl LendingModule {
    pub fn new(
        settings: &Settings,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let policy = settings.lending.clone();
        let service = Arc::new(LendingService::new(
            ledger.clone(),
            notifier.clone(),
            policy.clone(),
        ));
        let sweeper = Arc::new(Sweeper::new(ledger.clone(), notifier, policy.clone()));
        Self {
            service,
            sweeper,
            ledger,
            sweep_interval: policy.sweep_interval(),
            sweep_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Module for LendingModule {
    fn name(&self) -> &'static str {
        "lending"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            "lending module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(LendingState {
            service: self.service.clone(),
            sweeper: self.sweeper.clone(),
            ledger: self.ledger.clone(),
        })
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "0001_reservations",
            up: r#"
CREATE TABLE IF NOT EXISTS reservations (
    id UUID PRIMARY KEY,
    book_id UUID NOT NULL REFERENCES books (id),
    user_id UUID NOT NULL REFERENCES users (id),
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ,
    cancelled_by TEXT,
    reminder_sent_at TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS idx_reservations_status ON reservations (status);
CREATE INDEX IF NOT EXISTS idx_reservations_user ON reservations (user_id);
"#,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let sweeper = self.sweeper.clone();
        let period = self.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup stays quiet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = sweeper.run().await {
                    tracing::error!(error = %err, "scheduled sweep failed");
                }
            }
        });
        *self
            .sweep_task
            .lock()
            .map_err(|_| anyhow::anyhow!("sweep task lock poisoned"))? = Some(handle);
        tracing::info!("lending sweep scheduled");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(handle) = self
            .sweep_task
            .lock()
            .map_err(|_| anyhow::anyhow!("sweep task lock poisoned"))?
            .take()
        {
            handle.abort();
        }
        tracing::info!("lending module stopped");
        Ok(())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "paths": {
                "/reservations": {
                    "post": {
                        "summary": "Place a reservation for an available book",
                        "responses": {
                            "201": { "description": "Reservation placed" },
                            "400": { "description": "Borrowing limit reached" },
                            "409": { "description": "Book is not available" }
                        }
                    },
                    "get": {
                        "summary": "List all reservations (librarian)",
                        "responses": { "200": { "description": "Paginated reservations" } }
                    }
                },
                "/reservations/mine": {
                    "get": {
                        "summary": "List the caller's reservations",
                        "responses": { "200": { "description": "Paginated reservations" } }
                    }
                },
                "/reservations/{id}": {
                    "get": {
                        "summary": "Fetch one reservation",
                        "responses": {
                            "200": { "description": "Reservation" },
                            "404": { "description": "Unknown reservation" }
                        }
                    }
                },
                "/reservations/{id}/confirm": {
                    "patch": {
                        "summary": "Approve a pending reservation (librarian)",
                        "responses": {
                            "200": { "description": "Pickup window started" },
                            "409": { "description": "Reservation is not pending" }
                        }
                    }
                },
                "/reservations/{id}/checkout": {
                    "patch": {
                        "summary": "Hand the book over (librarian)",
                        "responses": {
                            "200": { "description": "Loan started" },
                            "409": { "description": "Reservation is not confirmed" }
                        }
                    }
                },
                "/reservations/{id}/decline": {
                    "patch": {
                        "summary": "Withdraw a reservation before pickup",
                        "responses": {
                            "200": { "description": "Reservation cancelled" },
                            "409": { "description": "Book already collected" }
                        }
                    }
                },
                "/reservations/{id}/return": {
                    "patch": {
                        "summary": "Take a book back at the desk (librarian)",
                        "responses": {
                            "200": { "description": "Loan completed" },
                            "409": { "description": "Book is not out" }
                        }
                    }
                },
                "/sweep": {
                    "post": {
                        "summary": "Run a reconciliation sweep now (librarian)",
                        "responses": { "200": { "description": "Sweep report" } }
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixture for lending tests: one reader, one librarian, one
    //! available book, a recording notification sink.

    use std::sync::Arc;

    use chrono::Utc;

    use biblio_kernel::ledger::Ledger;
    use biblio_kernel::model::{Book, CreateBook, CreateUser, Reservation, Role, User};
    use biblio_kernel::settings::LendingSettings;
    use biblio_notify::RecordingSink;
    use biblio_store::MemoryLedger;

    use super::service::LendingService;
    use super::sweeper::Sweeper;

    pub struct Fixture {
        pub ledger: Arc<dyn Ledger>,
        pub sink: Arc<RecordingSink>,
        pub reader: User,
        pub librarian: User,
        pub book: Book,
        pub policy: LendingSettings,
    }

    impl Fixture {
        pub fn service(&self) -> LendingService {
            LendingService::new(self.ledger.clone(), self.sink.clone(), self.policy.clone())
        }

        pub fn sweeper(&self) -> Sweeper {
            Sweeper::new(self.ledger.clone(), self.sink.clone(), self.policy.clone())
        }

        pub async fn add_reader(&self, email: &str) -> User {
            let user = User::new(CreateUser {
                name: "Reader".into(),
                email: email.into(),
                role: Role::Reader,
            });
            let mut tx = self.ledger.begin().await.unwrap();
            tx.insert_user(user.clone()).await.unwrap();
            tx.commit().await.unwrap();
            user
        }

        pub async fn add_book(&self, title: &str) -> Book {
            let book = Book::new(
                CreateBook {
                    title: title.into(),
                    author: "Author".into(),
                    year: 2000,
                    categories: vec!["fiction".into()],
                    language: "en".into(),
                    description: String::new(),
                    cover_url: String::new(),
                },
                Utc::now(),
            );
            let mut tx = self.ledger.begin().await.unwrap();
            tx.insert_book(book.clone()).await.unwrap();
            tx.commit().await.unwrap();
            book
        }
    }

    pub async fn fixture() -> Fixture {
        let ledger: Arc<dyn Ledger> = Arc::new(MemoryLedger::new());
        let sink = RecordingSink::new();

        let reader = User::new(CreateUser {
            name: "Reader".into(),
            email: "reader@example.com".into(),
            role: Role::Reader,
        });
        let librarian = User::new(CreateUser {
            name: "Librarian".into(),
            email: "librarian@example.com".into(),
            role: Role::Librarian,
        });
        let book = Book::new(
            CreateBook {
                title: "The Idiot".into(),
                author: "Fyodor Dostoevsky".into(),
                year: 1869,
                categories: vec!["fiction".into()],
                language: "en".into(),
                description: String::new(),
                cover_url: String::new(),
            },
            Utc::now(),
        );

        let mut tx = ledger.begin().await.unwrap();
        tx.insert_user(reader.clone()).await.unwrap();
        tx.insert_user(librarian.clone()).await.unwrap();
        tx.insert_book(book.clone()).await.unwrap();
        tx.commit().await.unwrap();

        Fixture {
            ledger,
            sink,
            reader,
            librarian,
            book,
            policy: LendingSettings::default(),
        }
    }

    /// Drive the fixture book all the way to an active loan and return the
    /// reservation.
    pub async fn reserve_and_activate(fx: &Fixture, service: &LendingService) -> Reservation {
        let record = service
            .create_reservation(fx.reader.id, fx.book.id)
            .await
            .unwrap();
        service
            .confirm_reservation(record.reservation.id)
            .await
            .unwrap();
        let record = service.checkout(record.reservation.id).await.unwrap();
        record.reservation
    }
}
