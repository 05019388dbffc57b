use std::sync::Arc;

use uuid::Uuid;

use crate::{
    auth::{
        jwt::{sha256_hex, SecretSigner},
        tokens::{mint_first_refresh, IssuedTokens, SessionPolicy},
    },
    dto::auth::{LoginRequest, RegisterRequest},
    errors::AppError,
    ledger::RefreshTokenLedger,
    models::{
        jwt::{Subject, TokenKind},
        user::{Principal, UserRecord},
    },
    password::PasswordHasher,
    principal::PrincipalStore,
    services::rotation::RotationService,
};

pub struct SessionStart {
    pub user: Principal,
    pub tokens: IssuedTokens,
}

/// Request-level entry points: register, login, refresh, logout, and
/// access-token introspection for the rest of the API.
#[derive(Clone)]
pub struct SessionGateway {
    principals: Arc<dyn PrincipalStore>,
    hasher: Arc<dyn PasswordHasher>,
    ledger: Arc<dyn RefreshTokenLedger>,
    signer: Arc<SecretSigner>,
    rotation: RotationService,
    policy: SessionPolicy,
}

impl SessionGateway {
    pub fn new(
        principals: Arc<dyn PrincipalStore>,
        hasher: Arc<dyn PasswordHasher>,
        ledger: Arc<dyn RefreshTokenLedger>,
        signer: Arc<SecretSigner>,
        policy: SessionPolicy,
    ) -> Self {
        let rotation = RotationService::new(signer.clone(), ledger.clone(), policy);
        Self {
            principals,
            hasher,
            ledger,
            signer,
            rotation,
            policy,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn RefreshTokenLedger> {
        &self.ledger
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<SessionStart, AppError> {
        req.validate()?;
        let username = req.username.trim();

        if self.principals.find_by_username(username).await?.is_some() {
            return Err(AppError::Conflict("username already exists".into()));
        }

        let password_hash = self.hasher.hash(&req.password)?;
        let user = self.principals.create(username, &password_hash).await?;
        tracing::info!(user_id = %user.id, "user registered");

        self.start_session(&user).await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<SessionStart, AppError> {
        req.validate()?;

        let user = self
            .principals
            .find_by_username(req.username.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !self.hasher.verify(&req.password, &user.password_hash)? {
            tracing::debug!(user_id = %user.id, "login rejected: bad password");
            return Err(AppError::InvalidCredentials);
        }
        if !user.is_active {
            tracing::info!(user_id = %user.id, "login rejected: account disabled");
            return Err(AppError::AccountDisabled);
        }

        self.start_session(&user).await
    }

    /// Rotates the presented refresh token. The owner is re-read afterwards;
    /// a vanished or disabled account loses the freshly rotated family.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedTokens, AppError> {
        let issued = self.rotation.rotate(presented).await?;

        let owner = self.principals.find_by_id(issued.record.user_id).await?;
        let denied = match owner {
            Some(user) if user.is_active => None,
            Some(_) => Some(AppError::AccountDisabled),
            None => Some(AppError::Unauthorized),
        };
        if let Some(err) = denied {
            let revoked = self.ledger.revoke_family(issued.record.family_id).await?;
            tracing::info!(
                user_id = %issued.record.user_id,
                family_id = %issued.record.family_id,
                revoked,
                "refresh denied for inactive owner"
            );
            return Err(err);
        }

        Ok(issued)
    }

    /// Revokes only the record behind `presented`. Unknown, expired or
    /// already revoked tokens are a silent no-op.
    pub async fn logout(&self, presented: &str) -> Result<bool, AppError> {
        let token_hash = sha256_hex(presented);
        let Some(record) = self.ledger.find_active_by_hash(&token_hash).await? else {
            return Ok(false);
        };

        let revoked = self.ledger.revoke(record.id).await?;
        if revoked {
            tracing::info!(user_id = %record.user_id, family_id = %record.family_id, "logged out");
        }
        Ok(revoked)
    }

    /// Identity claims of a valid access token. No storage access.
    pub fn current_principal(&self, access_token: &str) -> Result<Subject, AppError> {
        let claims = self.signer.verify(access_token, TokenKind::Access)?;
        Ok(claims.subject()?)
    }

    pub async fn principal(&self, id: Uuid) -> Result<Option<Principal>, AppError> {
        Ok(self.principals.find_by_id(id).await?.map(Principal::from))
    }

    /// Flips `is_active`. Disabling also revokes every refresh token the
    /// user holds, so outstanding sessions end at their next refresh.
    pub async fn toggle_active(&self, id: Uuid) -> Result<bool, AppError> {
        let active = self
            .principals
            .toggle_active(id)
            .await?
            .ok_or(AppError::NotFound)?;

        if active {
            tracing::info!(user_id = %id, "account enabled");
        } else {
            let revoked = self.ledger.revoke_all_for_user(id).await?;
            tracing::info!(user_id = %id, revoked, "account disabled");
        }
        Ok(active)
    }

    async fn start_session(&self, user: &UserRecord) -> Result<SessionStart, AppError> {
        let principal = Principal::from(user);
        let subject = principal.subject();

        let minted = mint_first_refresh(&self.signer, &self.policy, &subject)?;
        let record = self.ledger.create(minted.record).await?;
        let access_token = self.signer.issue_access(&subject)?;

        tracing::info!(user_id = %user.id, family_id = %record.family_id, "session started");

        Ok(SessionStart {
            user: principal,
            tokens: IssuedTokens {
                access_token,
                refresh_token: minted.raw,
                token_type: "Bearer".to_string(),
                record,
            },
        })
    }
}
