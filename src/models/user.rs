use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::jwt::Subject;

/// A user as stored by the principal store, credentials included.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Read-only view of a user, safe to return to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
    pub is_active: bool,
}

impl Principal {
    pub fn subject(&self) -> Subject {
        Subject {
            id: self.id,
            username: self.username.clone(),
            is_admin: self.is_admin,
        }
    }
}

impl From<&UserRecord> for Principal {
    fn from(u: &UserRecord) -> Self {
        Self {
            id: u.id,
            username: u.username.clone(),
            is_admin: u.is_admin,
            is_active: u.is_active,
        }
    }
}

impl From<UserRecord> for Principal {
    fn from(u: UserRecord) -> Self {
        Principal::from(&u)
    }
}
