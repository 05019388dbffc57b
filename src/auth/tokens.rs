use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    auth::jwt::{sha256_hex, SecretSigner},
    config::Config,
    errors::AppError,
    models::{jwt::Subject, refresh_token::RefreshTokenRecord},
};

#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub record: RefreshTokenRecord,
}

/// Lifetime rules for refresh-token records.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub sliding_ttl: Duration,
    pub max_session_age: Duration,
}

impl SessionPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            sliding_ttl: Duration::seconds(cfg.refresh_sliding_ttl_seconds),
            max_session_age: Duration::seconds(cfg.max_session_age_seconds),
        }
    }

    /// `min(now + sliding_ttl, family_created_at + max_session_age)`.
    pub fn expiry_for(&self, now: DateTime<Utc>, family_created_at: DateTime<Utc>) -> DateTime<Utc> {
        std::cmp::min(now + self.sliding_ttl, family_created_at + self.max_session_age)
    }
}

/// A signed refresh token and the record it will be stored under.
pub struct MintedRefresh {
    pub raw: String,
    pub record: RefreshTokenRecord,
}

pub fn mint_first_refresh(
    signer: &SecretSigner,
    policy: &SessionPolicy,
    subject: &Subject,
) -> Result<MintedRefresh, AppError> {
    let now = Utc::now();
    let family_id = Uuid::new_v4();
    let expires_at = policy.expiry_for(now, now);

    let raw = signer.issue_refresh(subject, family_id, expires_at)?;
    let record =
        RefreshTokenRecord::first_in_family(subject.id, family_id, sha256_hex(&raw), now, expires_at);
    Ok(MintedRefresh { raw, record })
}

pub fn mint_successor(
    signer: &SecretSigner,
    subject: &Subject,
    current: &RefreshTokenRecord,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<MintedRefresh, AppError> {
    let raw = signer.issue_refresh(subject, current.family_id, expires_at)?;
    let record = current.successor(sha256_hex(&raw), now, expires_at);
    Ok(MintedRefresh { raw, record })
}
