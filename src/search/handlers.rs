use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use tracing::{instrument, warn};

use super::dto::{QuickSearchRequest, QuickSearchResponse};
use super::services::quick_search;
use crate::{auth::jwt::AuthUser, error::ApiError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route("/quick-search", post(post_quick_search))
}

/// POST /quick-search
#[instrument(skip(state, payload))]
pub async fn post_quick_search(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<QuickSearchRequest>, JsonRejection>,
) -> Result<Json<QuickSearchResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| {
        warn!(error = %e, "unreadable request body");
        ApiError::BadRequest("Invalid JSON body".into())
    })?;
    quick_search(&state, user_id, body).await.map(Json)
}
