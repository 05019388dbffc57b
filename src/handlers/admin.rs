use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AdminPrincipal, dto::admin::ToggleActiveResponse, errors::AppError, state::AppState,
};

pub async fn toggle_user_active(
    State(state): State<Arc<AppState>>,
    AdminPrincipal(admin): AdminPrincipal,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ToggleActiveResponse>, AppError> {
    let new_state = state.gateway.toggle_active(user_id).await?;
    tracing::info!(admin_id = %admin.id, %user_id, new_state, "admin toggled account");

    Ok(Json(ToggleActiveResponse {
        status: "success",
        new_state,
    }))
}
