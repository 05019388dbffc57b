use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One link of a rotation chain. The raw bearer value is never stored, only
/// its hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub token_hash: String,

    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Issue time of the first record in the family; bounds every successor.
    pub family_created_at: DateTime<Utc>,

    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<Uuid>,
}

impl RefreshTokenRecord {
    /// First record of a brand-new family.
    pub fn first_in_family(
        user_id: Uuid,
        family_id: Uuid,
        token_hash: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            family_id,
            token_hash,
            issued_at,
            expires_at,
            family_created_at: issued_at,
            revoked_at: None,
            replaced_by: None,
        }
    }

    /// Record that takes over from `self` once rotation commits.
    pub fn successor(
        &self,
        token_hash: String,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            family_id: self.family_id,
            token_hash,
            issued_at,
            expires_at,
            family_created_at: self.family_created_at,
            revoked_at: None,
            replaced_by: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }

    /// Whole seconds until `expires_at`, zero once past it.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}
