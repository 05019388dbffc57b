//! Durable storage of refresh-token records and the atomic claim primitive
//! that serializes rotation.

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{errors::AppError, models::refresh_token::RefreshTokenRecord};

pub use memory::MemoryLedger;
pub use mongo::MongoLedger;

#[async_trait]
pub trait RefreshTokenLedger: Send + Sync {
    /// Persist a new record. A duplicate `token_hash` is an error.
    async fn create(&self, record: RefreshTokenRecord) -> Result<RefreshTokenRecord, AppError>;

    /// Record for `token_hash` only if it is neither revoked nor expired.
    async fn find_active_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Record for `token_hash` in any state. Only used to tell "never issued"
    /// apart from "issued and already consumed".
    async fn find_any_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, AppError>;

    /// Revoke `old_id` (pointing it at `successor`) and insert `successor` as
    /// one unit, but only while `old_id` is still unrevoked. Returns `false`
    /// when another writer got there first; nothing is written in that case.
    async fn claim_and_replace(
        &self,
        old_id: Uuid,
        successor: RefreshTokenRecord,
    ) -> Result<bool, AppError>;

    /// Revoke a single record if it is not revoked yet.
    async fn revoke(&self, id: Uuid) -> Result<bool, AppError>;

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, AppError>;

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Every record of a family, oldest first.
    async fn list_family(&self, family_id: Uuid) -> Result<Vec<RefreshTokenRecord>, AppError>;
}
