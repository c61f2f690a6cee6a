use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::services::generate_grocery_list;
use crate::{auth::jwt::AuthUser, error::ApiError, state::AppState, store::GroceryList};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/grocery-lists", post(create_grocery_list))
        .route("/grocery-lists/:plan_id", get(get_grocery_list))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroceryListResponse {
    pub success: bool,
    pub grocery_list: GroceryList,
}

/// POST /grocery-lists
#[instrument(skip(state, payload))]
pub async fn create_grocery_list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<GroceryListResponse>, ApiError> {
    let Json(body) = payload.map_err(|e| {
        warn!(error = %e, "unreadable request body");
        ApiError::BadRequest("Invalid JSON body".into())
    })?;
    let grocery_list = generate_grocery_list(&state, user_id, &body).await?;
    Ok(Json(GroceryListResponse {
        success: true,
        grocery_list,
    }))
}

/// GET /grocery-lists/:plan_id
#[instrument(skip(state))]
pub async fn get_grocery_list(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<GroceryList>, ApiError> {
    state
        .store
        .get_grocery_list(user_id, plan_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("Grocery list not found"))
}
