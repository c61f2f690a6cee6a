use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{RateMealRequest, RatingQuery, RatingResponse, SwapRequest, SwapResponse};
use super::services::{rate_meal, suggest_swaps};
use crate::{auth::jwt::AuthUser, error::ApiError, state::AppState};

// --- public routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/meals/:id/rating", get(get_rating))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/:id/rating", post(post_rating))
        .route("/meals/:id/swap", post(post_swap))
}

fn body_or_bad_request<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(v)| v).map_err(|e| {
        warn!(error = %e, "unreadable request body");
        ApiError::BadRequest("Invalid JSON body".into())
    })
}

// --- handlers ---

/// POST /meals/:id/rating
#[instrument(skip(state, payload))]
pub async fn post_rating(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(meal_id): Path<Uuid>,
    payload: Result<Json<RateMealRequest>, JsonRejection>,
) -> Result<Json<RatingResponse>, ApiError> {
    let body = body_or_bad_request(payload)?;
    let rating = rate_meal(&state, user_id, meal_id, body).await?;
    Ok(Json(RatingResponse {
        success: Some(true),
        rating: Some(rating),
    }))
}

/// GET /meals/:id/rating?subjectId=
#[instrument(skip(state))]
pub async fn get_rating(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(meal_id): Path<Uuid>,
    Query(q): Query<RatingQuery>,
) -> Result<Json<RatingResponse>, ApiError> {
    let subject_id = q
        .subject_id
        .ok_or_else(|| ApiError::BadRequest("subjectId is required".into()))?;
    let rating = state.store.get_rating(user_id, meal_id, subject_id).await?;
    Ok(Json(RatingResponse {
        success: None,
        rating,
    }))
}

/// POST /meals/:id/swap
#[instrument(skip(state, payload))]
pub async fn post_swap(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(meal_id): Path<Uuid>,
    payload: Result<Json<SwapRequest>, JsonRejection>,
) -> Result<Json<SwapResponse>, ApiError> {
    let body = body_or_bad_request(payload)?;
    suggest_swaps(&state, user_id, meal_id, body).await.map(Json)
}
