use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::dto::{GenerateResponse, ListPlansQuery};
use super::services::generate_plan;
use crate::{
    auth::jwt::AuthUser,
    error::ApiError,
    state::AppState,
    store::{PlanDetails, PlanSummary},
};

const MAX_PAGE: i64 = 100;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meal-plans", get(list_plans))
        .route("/meal-plans/:id", get(get_plan))
}

pub fn write_routes() -> Router<AppState> {
    Router::new().route("/meal-plans/generate", post(generate))
}

/// POST /meal-plans/generate
#[instrument(skip(state, payload))]
pub async fn generate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| {
        warn!(error = %e, "unreadable request body");
        ApiError::BadRequest("Invalid JSON body".into())
    })?;
    generate_plan(&state, user_id, &body).await.map(Json)
}

#[instrument(skip(state))]
pub async fn list_plans(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<ListPlansQuery>,
) -> Result<Json<Vec<PlanSummary>>, ApiError> {
    let plans = state
        .store
        .list_plans(
            user_id,
            q.subject_id,
            q.limit.clamp(1, MAX_PAGE),
            q.offset.max(0),
        )
        .await?;
    Ok(Json(plans))
}

#[instrument(skip(state))]
pub async fn get_plan(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanDetails>, ApiError> {
    state
        .store
        .get_plan(user_id, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Meal plan not found"))
}
