use serde::{Deserialize, Serialize};

use super::id::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Reader,
    Librarian,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_blocked: bool,
}

impl User {
    pub fn new(event: CreateUser) -> Self {
        Self {
            id: UserId::new(),
            name: event.name,
            email: event.email.to_lowercase(),
            role: event.role,
            is_blocked: false,
        }
    }

    pub fn is_librarian(&self) -> bool {
        self.role == Role::Librarian
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub email: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized_to_lowercase() {
        let user = User::new(CreateUser {
            name: "Ada".into(),
            email: "Ada@Example.COM".into(),
            role: Role::Reader,
        });
        assert_eq!(user.email, "ada@example.com");
        assert!(!user.is_blocked);
    }
}
