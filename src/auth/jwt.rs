use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    config::Config,
    errors::{AppError, TokenError},
    models::jwt::{Claims, Subject, TokenKind},
};

#[derive(Clone)]
pub struct Keys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
}

impl Keys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub fn sha256_hex(s: &str) -> String {
    let mut h = Sha256::new();
    h.update(s.as_bytes());
    hex::encode(h.finalize())
}

/// Signs and verifies access and refresh tokens with independent keys.
///
/// Holds no mutable state; share it behind an `Arc` across any number of
/// request handlers.
#[derive(Clone)]
pub struct SecretSigner {
    access: Keys,
    refresh: Keys,
    access_ttl: Duration,
}

impl SecretSigner {
    pub fn new(access_secret: &str, refresh_secret: &str, access_ttl_seconds: i64) -> Self {
        Self {
            access: Keys::from_secret(access_secret.as_bytes()),
            refresh: Keys::from_secret(refresh_secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_seconds),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            &cfg.jwt_access_secret,
            &cfg.jwt_refresh_secret,
            cfg.jwt_access_ttl_seconds,
        )
    }

    pub fn issue_access(&self, subject: &Subject) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.id.to_string(),
            username: subject.username.clone(),
            is_admin: subject.is_admin,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            typ: TokenKind::Access,
            jti: None,
            fam: None,
        };
        self.sign(&claims, &self.access)
    }

    /// The token's `exp` is the owning record's `expires_at`.
    pub fn issue_refresh(
        &self,
        subject: &Subject,
        family_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = Claims {
            sub: subject.id.to_string(),
            username: subject.username.clone(),
            is_admin: subject.is_admin,
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
            typ: TokenKind::Refresh,
            jti: Some(Uuid::new_v4().to_string()),
            fam: Some(family_id.to_string()),
        };
        self.sign(&claims, &self.refresh)
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        self.decode(token, kind, true)
    }

    /// Like [`Self::verify`] but accepts tokens past their `exp`. Refresh
    /// tokens go through here so the ledger decides between reuse and expiry.
    pub fn verify_signature(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        self.decode(token, kind, false)
    }

    fn decode(&self, token: &str, kind: TokenKind, check_exp: bool) -> Result<Claims, TokenError> {
        let keys = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = check_exp;

        let data = decode::<Claims>(token, &keys.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed,
                _ => TokenError::InvalidSignature,
            }
        })?;

        if data.claims.typ != kind {
            return Err(TokenError::InvalidSignature);
        }
        Ok(data.claims)
    }

    fn sign(&self, claims: &Claims, keys: &Keys) -> Result<String, AppError> {
        encode(&Header::new(Algorithm::HS256), claims, &keys.encoding)
            .map_err(|e| AppError::Internal(format!("jwt encode: {e}")))
    }
}
