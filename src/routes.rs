use axum::{
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

use crate::{
    handlers::{admin as admin_handlers, auth as auth_handlers},
    state::AppState,
};

pub fn app_router(state: Arc<AppState>) -> Router {
    // Keyed by x-forwarded-for, x-real-ip, forwarded, then the peer address.
    // Header values that do not parse as an IP are skipped.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .period(Duration::from_millis(state.cfg.rate_limit_auth_period_ms))
            .burst_size(state.cfg.rate_limit_auth_burst)
            .key_extractor(SmartIpKeyExtractor)
            .use_headers()
            .finish()
            .expect("rate limit settings are validated at startup"),
    );

    let auth = Router::new()
        .route("/register", post(auth_handlers::register))
        .route("/login", post(auth_handlers::login))
        .route("/refresh", post(auth_handlers::refresh))
        .route("/logout", post(auth_handlers::logout))
        .route("/me", get(auth_handlers::me))
        .route_layer(GovernorLayer {
            config: governor_conf,
        });

    let admin = Router::new().route(
        "/user/{id}/toggle_active",
        post(admin_handlers::toggle_user_active),
    );

    Router::new()
        .nest("/auth", auth)
        .nest("/admin", admin)
        .with_state(state)
}
