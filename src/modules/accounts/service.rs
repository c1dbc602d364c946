use std::sync::Arc;

use biblio_kernel::error::{LendingError, LendingResult};
use biblio_kernel::ledger::Ledger;
use biblio_kernel::model::{CreateUser, User, UserId};

pub struct AccountsService {
    ledger: Arc<dyn Ledger>,
}

impl AccountsService {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn create_user(&self, event: CreateUser) -> LendingResult<User> {
        if event.email.trim().is_empty() || !event.email.contains('@') {
            return Err(LendingError::Validation(
                "a valid email address is required".into(),
            ));
        }
        let user = User::new(event);
        let mut tx = self.ledger.begin().await?;
        tx.insert_user(user.clone()).await?;
        tx.commit().await?;
        tracing::info!(user = %user.id, role = ?user.role, "account registered");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> LendingResult<User> {
        let mut tx = self.ledger.begin().await?;
        tx.find_user(id)
            .await?
            .ok_or(LendingError::NotFound("user"))
    }

    pub async fn list_users(&self) -> LendingResult<Vec<User>> {
        let mut tx = self.ledger.begin().await?;
        tx.list_users().await
    }

    /// Lift a delinquency block. Idempotent: unblocking an unblocked account
    /// is a no-op.
    pub async fn unblock(&self, id: UserId) -> LendingResult<User> {
        let mut tx = self.ledger.begin().await?;
        let mut user = tx
            .find_user(id)
            .await?
            .ok_or(LendingError::NotFound("user"))?;
        if user.is_blocked {
            tx.set_blocked(id, false).await?;
            tx.commit().await?;
            user.is_blocked = false;
            tracing::info!(user = %id, "account unblocked");
        }
        Ok(user)
    }
}
