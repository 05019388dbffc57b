//! User lookup consumed by the session core. Owned by user management; this
//! crate only reads principals and creates them on registration.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{errors::AppError, models::user::UserRecord};

pub use memory::MemoryPrincipalStore;
pub use mongo::MongoPrincipalStore;

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError>;

    /// Insert a new active, non-admin user. A taken username is `Conflict`.
    async fn create(&self, username: &str, password_hash: &str) -> Result<UserRecord, AppError>;

    /// Flip `is_active` and return the new value, `None` for an unknown id.
    async fn toggle_active(&self, id: Uuid) -> Result<Option<bool>, AppError>;
}

pub(crate) fn new_user(username: &str, password_hash: &str) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: password_hash.to_string(),
        is_admin: false,
        is_active: true,
        created_at: chrono::Utc::now(),
    }
}

pub(crate) fn username_taken() -> AppError {
    AppError::Conflict("username already exists".into())
}
