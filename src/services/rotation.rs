use std::sync::Arc;

use chrono::Utc;

use crate::{
    auth::{
        jwt::{sha256_hex, SecretSigner},
        tokens::{mint_successor, IssuedTokens, SessionPolicy},
    },
    errors::AppError,
    ledger::RefreshTokenLedger,
    models::{jwt::TokenKind, refresh_token::RefreshTokenRecord},
};

/// Exchanges a presented refresh token for a new token pair.
///
/// Every presentation ends in exactly one of: a rotated pair, `Expired`,
/// `Unauthorized` (never issued here), or `SessionCompromised` (the token
/// was already consumed, so every session of the owner is revoked).
#[derive(Clone)]
pub struct RotationService {
    signer: Arc<SecretSigner>,
    ledger: Arc<dyn RefreshTokenLedger>,
    policy: SessionPolicy,
}

impl RotationService {
    pub fn new(
        signer: Arc<SecretSigner>,
        ledger: Arc<dyn RefreshTokenLedger>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            signer,
            ledger,
            policy,
        }
    }

    pub async fn rotate(&self, presented: &str) -> Result<IssuedTokens, AppError> {
        // Signature first: garbage never reaches the ledger. Expiry is judged
        // on the record, after the reuse check.
        let claims = self
            .signer
            .verify_signature(presented, TokenKind::Refresh)
            .map_err(|_| AppError::Unauthorized)?;
        let subject = claims.subject().map_err(|_| AppError::Unauthorized)?;

        let token_hash = sha256_hex(presented);
        let Some(current) = self.ledger.find_any_by_hash(&token_hash).await? else {
            tracing::debug!(user_id = %subject.id, "refresh token not found in ledger");
            return Err(AppError::Unauthorized);
        };

        if current.user_id != subject.id {
            return Err(AppError::Unauthorized);
        }

        if current.is_revoked() {
            return Err(self.compromised(&current, "revoked token presented").await);
        }

        let now = Utc::now();
        if current.expires_at <= now {
            tracing::debug!(family_id = %current.family_id, "refresh token expired");
            return Err(AppError::Expired);
        }

        let expires_at = self.policy.expiry_for(now, current.family_created_at);
        if expires_at <= now {
            return Err(AppError::Expired);
        }

        let minted = mint_successor(&self.signer, &subject, &current, now, expires_at)?;
        let successor = minted.record.clone();

        if !self
            .ledger
            .claim_and_replace(current.id, minted.record)
            .await?
        {
            return Err(self.compromised(&current, "lost rotation race").await);
        }

        tracing::info!(
            user_id = %current.user_id,
            family_id = %current.family_id,
            record_id = %successor.id,
            "refresh token rotated"
        );

        Ok(IssuedTokens {
            access_token: self.signer.issue_access(&subject)?,
            refresh_token: minted.raw,
            token_type: "Bearer".to_string(),
            record: successor,
        })
    }

    /// Revokes every session of the record's owner and yields the error to
    /// return. A ledger failure during the cascade is surfaced instead.
    async fn compromised(&self, record: &RefreshTokenRecord, reason: &'static str) -> AppError {
        match self.ledger.revoke_all_for_user(record.user_id).await {
            Ok(revoked) => {
                tracing::warn!(
                    user_id = %record.user_id,
                    family_id = %record.family_id,
                    record_id = %record.id,
                    revoked,
                    reason,
                    "refresh token reuse detected, all sessions revoked"
                );
                AppError::SessionCompromised
            }
            Err(e) => {
                tracing::error!(user_id = %record.user_id, error = %e, "reuse cascade failed");
                e
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::tokens::mint_first_refresh,
        ledger::MemoryLedger,
        models::jwt::Subject,
    };
    use chrono::Duration;
    use uuid::Uuid;

    struct Fixture {
        signer: Arc<SecretSigner>,
        ledger: Arc<MemoryLedger>,
        service: RotationService,
        policy: SessionPolicy,
        subject: Subject,
    }

    fn fixture(sliding: Duration, max_age: Duration) -> Fixture {
        let signer = Arc::new(SecretSigner::new("access-k", "refresh-k", 60));
        let ledger = Arc::new(MemoryLedger::new());
        let policy = SessionPolicy {
            sliding_ttl: sliding,
            max_session_age: max_age,
        };
        let service = RotationService::new(signer.clone(), ledger.clone(), policy);
        Fixture {
            signer,
            ledger,
            service,
            policy,
            subject: Subject {
                id: Uuid::new_v4(),
                username: "erin".into(),
                is_admin: false,
            },
        }
    }

    impl Fixture {
        async fn login(&self) -> (String, RefreshTokenRecord) {
            let minted = mint_first_refresh(&self.signer, &self.policy, &self.subject).unwrap();
            let record = self.ledger.create(minted.record).await.unwrap();
            (minted.raw, record)
        }
    }

    #[tokio::test]
    async fn rotation_replaces_the_active_member() {
        let f = fixture(Duration::days(7), Duration::days(30));
        let (raw, first) = f.login().await;

        let issued = f.service.rotate(&raw).await.unwrap();
        assert_ne!(issued.refresh_token, raw);
        assert_eq!(issued.record.family_id, first.family_id);

        let chain = f.ledger.list_family(first.family_id).await.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].replaced_by, Some(issued.record.id));
        assert!(chain[0].is_revoked());
        assert!(!chain[1].is_revoked());

        let claims = f.signer.verify(&issued.access_token, TokenKind::Access).unwrap();
        assert_eq!(claims.subject().unwrap(), f.subject);
    }

    #[tokio::test]
    async fn garbage_is_unauthorized_without_touching_the_ledger() {
        let f = fixture(Duration::days(7), Duration::days(30));
        assert!(matches!(
            f.service.rotate("garbage").await,
            Err(AppError::Unauthorized)
        ));
        assert!(f.ledger.is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let f = fixture(Duration::days(7), Duration::days(30));
        let raw = f
            .signer
            .issue_refresh(&f.subject, Uuid::new_v4(), Utc::now() + Duration::days(1))
            .unwrap();
        assert!(matches!(f.service.rotate(&raw).await, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn reuse_revokes_every_family_of_the_user() {
        let f = fixture(Duration::days(7), Duration::days(30));
        let (stale, first) = f.login().await;
        let (_, other_device) = f.login().await;

        let rotated = f.service.rotate(&stale).await.unwrap();

        assert!(matches!(
            f.service.rotate(&stale).await,
            Err(AppError::SessionCompromised)
        ));
        assert!(matches!(
            f.service.rotate(&rotated.refresh_token).await,
            Err(AppError::SessionCompromised)
        ));

        for family in [first.family_id, other_device.family_id] {
            let now = Utc::now();
            let active = f
                .ledger
                .list_family(family)
                .await
                .unwrap()
                .iter()
                .filter(|r| r.is_active_at(now))
                .count();
            assert_eq!(active, 0);
        }
    }

    #[tokio::test]
    async fn expired_record_is_not_a_security_event() {
        let f = fixture(Duration::days(7), Duration::days(30));
        let raw = f
            .signer
            .issue_refresh(&f.subject, Uuid::new_v4(), Utc::now() + Duration::days(1))
            .unwrap();
        let now = Utc::now();
        let mut record = RefreshTokenRecord::first_in_family(
            f.subject.id,
            Uuid::new_v4(),
            sha256_hex(&raw),
            now - Duration::days(2),
            now - Duration::seconds(1),
        );
        record.family_created_at = now - Duration::days(2);
        f.ledger.create(record).await.unwrap();
        let (_, untouched) = f.login().await;

        assert!(matches!(f.service.rotate(&raw).await, Err(AppError::Expired)));
        assert!(f
            .ledger
            .find_active_by_hash(&untouched.token_hash)
            .await
            .unwrap()
            .is_some());
    }

    /// A consumed token whose `exp` has passed, next to a live session.
    async fn expired_token(f: &Fixture, revoked: bool) -> (String, RefreshTokenRecord) {
        let now = Utc::now();
        let family_id = Uuid::new_v4();
        let expires_at = now - Duration::seconds(5);
        let raw = f
            .signer
            .issue_refresh(&f.subject, family_id, expires_at)
            .unwrap();
        let mut record = RefreshTokenRecord::first_in_family(
            f.subject.id,
            family_id,
            sha256_hex(&raw),
            now - Duration::days(8),
            expires_at,
        );
        record.family_created_at = now - Duration::days(8);
        if revoked {
            record.revoked_at = Some(now - Duration::days(1));
        }
        f.ledger.create(record).await.unwrap();

        let (_, live) = f.login().await;
        (raw, live)
    }

    #[tokio::test]
    async fn replay_after_expiry_is_still_reuse() {
        let f = fixture(Duration::days(7), Duration::days(30));
        let (raw, live) = expired_token(&f, true).await;

        assert!(matches!(
            f.service.rotate(&raw).await,
            Err(AppError::SessionCompromised)
        ));
        assert!(f
            .ledger
            .find_active_by_hash(&live.token_hash)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expired_unconsumed_token_is_only_expired() {
        let f = fixture(Duration::days(7), Duration::days(30));
        let (raw, live) = expired_token(&f, false).await;

        assert!(matches!(f.service.rotate(&raw).await, Err(AppError::Expired)));
        assert!(f
            .ledger
            .find_active_by_hash(&live.token_hash)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn rotation_never_outlives_the_family_ceiling() {
        let f = fixture(Duration::hours(2), Duration::hours(1));
        let (mut raw, first) = f.login().await;
        let ceiling = first.family_created_at + Duration::hours(1);

        for _ in 0..5 {
            let issued = f.service.rotate(&raw).await.unwrap();
            assert!(issued.record.expires_at <= ceiling);
            assert_eq!(issued.record.family_created_at, first.family_created_at);
            raw = issued.refresh_token;
        }
    }
}
