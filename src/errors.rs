use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Why a signed token was rejected by [`crate::auth::jwt::SecretSigner::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("malformed token")]
    Malformed,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Token expired")]
    Expired,

    #[error("Session compromised")]
    SessionCompromised,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Forbidden")]
    Forbidden,

    #[error("Malformed token")]
    Malformed,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found")]
    NotFound,

    #[error("Database error: {0}")]
    Db(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code, safe to show to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Unauthorized => "unauthorized",
            AppError::Expired => "expired",
            AppError::SessionCompromised => "session_compromised",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::AccountDisabled => "account_disabled",
            AppError::Forbidden => "forbidden",
            AppError::Malformed => "malformed",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound => "not_found",
            AppError::Db(_) => "database",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(e: mongodb::error::Error) -> Self {
        AppError::Db(e.to_string())
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidSignature => AppError::Unauthorized,
            TokenError::Expired => AppError::Expired,
            TokenError::Malformed => AppError::Malformed,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::Validation(s) => (StatusCode::BAD_REQUEST, s.as_str()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Expired => (StatusCode::UNAUTHORIZED, "session expired"),
            AppError::SessionCompromised => (
                StatusCode::UNAUTHORIZED,
                "signed out everywhere for security reasons",
            ),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid credentials"),
            AppError::AccountDisabled => (StatusCode::FORBIDDEN, "account disabled"),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "admin access required"),
            AppError::Malformed => (StatusCode::UNAUTHORIZED, "malformed token"),
            AppError::Conflict(s) => (StatusCode::CONFLICT, s.as_str()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found"),
            AppError::Db(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };

        (status, Json(json!({ "error": msg, "code": self.code() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_map_to_taxonomy() {
        assert!(matches!(
            AppError::from(TokenError::InvalidSignature),
            AppError::Unauthorized
        ));
        assert!(matches!(AppError::from(TokenError::Expired), AppError::Expired));
        assert!(matches!(AppError::from(TokenError::Malformed), AppError::Malformed));
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::SessionCompromised.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::AccountDisabled.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Db("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
