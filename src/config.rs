use std::str::FromStr;

use cookie::SameSite;

use crate::errors::AppError;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,

    /// `None` selects the in-process store (single process only).
    pub mongodb_uri: Option<String>,
    pub db_name: String,

    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_access_ttl_seconds: i64,
    pub refresh_sliding_ttl_seconds: i64,
    pub max_session_age_seconds: i64,

    pub cookie: CookieConfig,

    pub rate_limit_auth_period_ms: u64,
    pub rate_limit_auth_burst: u32,
}

#[derive(Clone, Debug)]
pub struct CookieConfig {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "refresh_token".to_string(),
            domain: None,
            secure: true,
            same_site: SameSite::Lax,
        }
    }
}

impl Config {
    /// Defaults for everything except the two signing keys.
    pub fn with_secrets(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".into(),
            mongodb_uri: None,
            db_name: "auth_db".into(),
            jwt_access_secret: access_secret.into(),
            jwt_refresh_secret: refresh_secret.into(),
            jwt_access_ttl_seconds: 15 * 60,
            refresh_sliding_ttl_seconds: 7 * 24 * 60 * 60,
            max_session_age_seconds: 30 * 24 * 60 * 60,
            cookie: CookieConfig::default(),
            rate_limit_auth_period_ms: 45_000,
            rate_limit_auth_burst: 20,
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
        let mongodb_uri = std::env::var("MONGODB_URI").ok().filter(|v| !v.is_empty());
        let db_name = std::env::var("DB_NAME").unwrap_or_else(|_| "auth_db".to_string());

        let jwt_access_secret = required("JWT_ACCESS_SECRET")?;
        let jwt_refresh_secret = required("JWT_REFRESH_SECRET")?;

        let cookie = CookieConfig {
            name: std::env::var("COOKIE_NAME").unwrap_or_else(|_| "refresh_token".into()),
            domain: std::env::var("COOKIE_DOMAIN").ok().filter(|v| !v.is_empty()),
            secure: parse_or("COOKIE_SECURE", true)?,
            same_site: match std::env::var("COOKIE_SAMESITE") {
                Ok(v) => parse_same_site(&v)?,
                Err(_) => SameSite::Lax,
            },
        };

        let cfg = Self {
            bind_addr,
            mongodb_uri,
            db_name,
            jwt_access_secret,
            jwt_refresh_secret,
            jwt_access_ttl_seconds: parse_or("JWT_ACCESS_TTL_SECONDS", 15 * 60)?,
            refresh_sliding_ttl_seconds: parse_or("REFRESH_SLIDING_TTL_SECONDS", 7 * 24 * 60 * 60)?,
            max_session_age_seconds: parse_or("MAX_SESSION_AGE_SECONDS", 30 * 24 * 60 * 60)?,
            cookie,
            rate_limit_auth_period_ms: parse_or("RATE_LIMIT_AUTH_PERIOD_MS", 45_000)?,
            rate_limit_auth_burst: parse_or("RATE_LIMIT_AUTH_BURST", 20)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.jwt_access_secret == self.jwt_refresh_secret {
            return Err(AppError::Internal(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ".into(),
            ));
        }
        if self.jwt_access_ttl_seconds <= 0
            || self.refresh_sliding_ttl_seconds <= 0
            || self.max_session_age_seconds <= 0
        {
            return Err(AppError::Internal("token lifetimes must be positive".into()));
        }
        if self.rate_limit_auth_period_ms == 0 || self.rate_limit_auth_burst == 0 {
            return Err(AppError::Internal("rate limit settings must be positive".into()));
        }
        Ok(())
    }
}

fn required(key: &str) -> Result<String, AppError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Internal(format!("{key} is required")))
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map_err(|_| AppError::Internal(format!("{key} has an invalid value"))),
        Err(_) => Ok(default),
    }
}

pub fn parse_same_site(v: &str) -> Result<SameSite, AppError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        other => Err(AppError::Internal(format!(
            "COOKIE_SAMESITE must be lax, strict or none, got {other}"
        ))),
    }
}
