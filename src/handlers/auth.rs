use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use std::sync::Arc;

use crate::{
    auth::{
        cookies::{clear_refresh, presented_for_logout, presented_for_refresh, set_refresh},
        AuthPrincipal,
    },
    dto::auth::{
        LoginRequest, LogoutResponse, MeResponse, RefreshRequest, RefreshResponse,
        RegisterRequest, SessionResponse,
    },
    errors::AppError,
    services::auth_service::SessionStart,
    state::AppState,
};

fn session_reply(
    state: &AppState,
    jar: CookieJar,
    start: SessionStart,
) -> (CookieJar, Json<SessionResponse>) {
    let max_age = start.tokens.record.remaining_seconds(Utc::now());
    let jar = set_refresh(jar, &state.cfg.cookie, start.tokens.refresh_token, max_age);
    (
        jar,
        Json(SessionResponse {
            access_token: start.tokens.access_token,
            token_type: start.tokens.token_type,
            user: start.user,
        }),
    )
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let start = state.gateway.register(req).await?;
    Ok(session_reply(&state, jar, start))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let start = state.gateway.login(req).await?;
    Ok(session_reply(&state, jar, start))
}

/// Any failure also clears the refresh cookie so the client falls back to a
/// full login.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(CookieJar, Json<RefreshResponse>), (CookieJar, AppError)> {
    let cookie_cfg = &state.cfg.cookie;

    let req = match RefreshRequest::from_body(&body) {
        Ok(req) => req,
        Err(e) => return Err((clear_refresh(jar, cookie_cfg), e)),
    };
    let Some(presented) =
        presented_for_refresh(&jar, cookie_cfg, req.refresh_token.as_deref(), &headers)
    else {
        return Err((clear_refresh(jar, cookie_cfg), AppError::Unauthorized));
    };

    match state.gateway.refresh(&presented).await {
        Ok(tokens) => {
            let max_age = tokens.record.remaining_seconds(Utc::now());
            let jar = set_refresh(jar, cookie_cfg, tokens.refresh_token, max_age);
            Ok((
                jar,
                Json(RefreshResponse {
                    access_token: tokens.access_token,
                    token_type: tokens.token_type,
                }),
            ))
        }
        Err(e) => Err((clear_refresh(jar, cookie_cfg), e)),
    }
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<LogoutResponse>), AppError> {
    let req = RefreshRequest::from_body(&body)?;
    let cookie_cfg = &state.cfg.cookie;

    if let Some(presented) = presented_for_logout(&jar, cookie_cfg, req.refresh_token.as_deref()) {
        state.gateway.logout(&presented).await?;
    }

    Ok((
        clear_refresh(jar, cookie_cfg),
        Json(LogoutResponse { success: true }),
    ))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthPrincipal(subject): AuthPrincipal,
) -> Result<Json<MeResponse>, AppError> {
    let user = state
        .gateway
        .principal(subject.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(MeResponse { user }))
}
