use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use cookie::time::Duration as CookieDuration;

use crate::config::CookieConfig;

pub const REFRESH_HEADER: &str = "x-refresh-token";

pub fn refresh_cookie(cfg: &CookieConfig, value: String, max_age_seconds: i64) -> Cookie<'static> {
    let mut builder = Cookie::build((cfg.name.clone(), value))
        .http_only(true)
        .secure(cfg.secure)
        .same_site(cfg.same_site)
        .path("/")
        .max_age(CookieDuration::seconds(max_age_seconds));
    if let Some(domain) = &cfg.domain {
        builder = builder.domain(domain.clone());
    }
    builder.build()
}

pub fn set_refresh(jar: CookieJar, cfg: &CookieConfig, value: String, max_age_seconds: i64) -> CookieJar {
    jar.add(refresh_cookie(cfg, value, max_age_seconds))
}

pub fn clear_refresh(jar: CookieJar, cfg: &CookieConfig) -> CookieJar {
    let mut removal = Cookie::build((cfg.name.clone(), "")).path("/");
    if let Some(domain) = &cfg.domain {
        removal = removal.domain(domain.clone());
    }
    jar.remove(removal)
}

fn non_empty(v: &str) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

/// Refresh token for `/auth/refresh`: cookie, then body, then header.
pub fn presented_for_refresh(
    jar: &CookieJar,
    cfg: &CookieConfig,
    body: Option<&str>,
    headers: &HeaderMap,
) -> Option<String> {
    jar.get(&cfg.name)
        .and_then(|c| non_empty(c.value()))
        .or_else(|| body.and_then(non_empty))
        .or_else(|| {
            headers
                .get(REFRESH_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(non_empty)
        })
}

/// Refresh token for `/auth/logout`: cookie, then body.
pub fn presented_for_logout(jar: &CookieJar, cfg: &CookieConfig, body: Option<&str>) -> Option<String> {
    jar.get(&cfg.name)
        .and_then(|c| non_empty(c.value()))
        .or_else(|| body.and_then(non_empty))
}
