use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::TokenError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
    pub typ: TokenKind,

    // refresh only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fam: Option<String>,
}

/// Identity claims carried by every token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: Uuid,
    pub username: String,
    pub is_admin: bool,
}

impl Claims {
    pub fn subject(&self) -> Result<Subject, TokenError> {
        let id = Uuid::parse_str(&self.sub).map_err(|_| TokenError::Malformed)?;
        Ok(Subject {
            id,
            username: self.username.clone(),
            is_admin: self.is_admin,
        })
    }

    pub fn family_id(&self) -> Option<Uuid> {
        self.fam.as_deref().and_then(|f| Uuid::parse_str(f).ok())
    }
}
