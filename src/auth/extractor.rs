use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{errors::AppError, models::jwt::Subject, state::AppState};

/// Caller identity taken from a valid `Authorization: Bearer` access token.
#[derive(Debug, Clone)]
pub struct AuthPrincipal(pub Subject);

impl FromRequestParts<Arc<AppState>> for AuthPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let subject = state.gateway.current_principal(bearer.token())?;
        Ok(Self(subject))
    }
}

/// An [`AuthPrincipal`] whose access token carries `is_admin`. Anyone else
/// gets 403.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Subject);

impl FromRequestParts<Arc<AppState>> for AdminPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthPrincipal(subject) = AuthPrincipal::from_request_parts(parts, state).await?;
        if !subject.is_admin {
            tracing::debug!(user_id = %subject.id, "admin route rejected");
            return Err(AppError::Forbidden);
        }
        Ok(Self(subject))
    }
}
