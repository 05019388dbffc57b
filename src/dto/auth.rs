use serde::{Deserialize, Serialize};

use crate::{errors::AppError, models::user::Principal};

const MIN_USERNAME: usize = 3;
const MIN_PASSWORD: usize = 8;
const MIN_REFRESH_TOKEN: usize = 20;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn validate_credentials(username: &str, password: &str) -> Result<(), AppError> {
    if username.trim().chars().count() < MIN_USERNAME {
        return Err(AppError::Validation(format!(
            "username must be at least {MIN_USERNAME} characters"
        )));
    }
    if password.chars().count() < MIN_PASSWORD {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD} characters"
        )));
    }
    Ok(())
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_credentials(&self.username, &self.password)
    }
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_credentials(&self.username, &self.password)
    }
}

/// Body of `/auth/refresh` and `/auth/logout`; the token usually travels in
/// the cookie instead.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

impl RefreshRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.refresh_token {
            Some(t) if t.len() < MIN_REFRESH_TOKEN => {
                Err(AppError::Validation("refreshToken is too short".into()))
            }
            _ => Ok(()),
        }
    }

    /// Empty bodies are allowed.
    pub fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let req: Self = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("invalid body: {e}")))?;
        req.validate()?;
        Ok(req)
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: Principal,
}

#[derive(Serialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Serialize, Debug)]
pub struct LogoutResponse {
    pub success: bool,
}

#[derive(Serialize, Debug)]
pub struct MeResponse {
    pub user: Principal,
}
