use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use super::dto::{CreateShareRequest, CreateShareResponse, SharedPlanResponse};
use super::services::{create_share, open_share};
use crate::{auth::jwt::AuthUser, error::ApiError, state::AppState};

// --- public routers ---

/// Link holders need no account.
pub fn read_routes() -> Router<AppState> {
    Router::new().route("/shared/:token", get(get_shared))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/shares", post(post_share))
}

// --- handlers ---

/// POST /shares
#[instrument(skip(state, payload))]
pub async fn post_share(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<CreateShareRequest>, JsonRejection>,
) -> Result<Json<CreateShareResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| {
        warn!(error = %e, "unreadable request body");
        ApiError::BadRequest("Invalid JSON body".into())
    })?;
    create_share(&state, user_id, body).await.map(Json)
}

/// GET /shared/:token
#[instrument(skip(state))]
pub async fn get_shared(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SharedPlanResponse>, ApiError> {
    open_share(&state, &token).await.map(Json)
}
