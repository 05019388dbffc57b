use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::user::UserRecord,
    principal::{new_user, username_taken, PrincipalStore},
};

#[derive(Default)]
pub struct MemoryPrincipalStore {
    users: RwLock<HashMap<Uuid, UserRecord>>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable an account. Returns `false` for an unknown id.
    pub fn set_active(&self, id: Uuid, active: bool) -> bool {
        match self.users.write().get_mut(&id) {
            Some(user) => {
                user.is_active = active;
                true
            }
            None => false,
        }
    }

    pub fn set_admin(&self, id: Uuid, admin: bool) -> bool {
        match self.users.write().get_mut(&id) {
            Some(user) => {
                user.is_admin = admin;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: Uuid) -> Option<UserRecord> {
        self.users.write().remove(&id)
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, AppError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, AppError> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn create(&self, username: &str, password_hash: &str) -> Result<UserRecord, AppError> {
        let mut users = self.users.write();
        if users.values().any(|u| u.username == username) {
            return Err(username_taken());
        }
        let user = new_user(username, password_hash);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn toggle_active(&self, id: Uuid) -> Result<Option<bool>, AppError> {
        Ok(self.users.write().get_mut(&id).map(|user| {
            user.is_active = !user.is_active;
            user.is_active
        }))
    }
}
