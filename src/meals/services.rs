use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{OriginalMeal, RateMealRequest, SwapRequest, SwapResponse};
use super::swap::{build_swap_prompt, validate_suggestions, SwapInput};
use crate::error::ApiError;
use crate::llm::complete_within;
use crate::plans::age_in_months;
use crate::ratelimit::RateLimitConfig;
use crate::state::AppState;
use crate::store::{MealRating, NewRating};

pub const RATE_OPERATION: &str = "rate-meal";
pub const SWAP_OPERATION: &str = "meal-swap";
const SWAP_FAILED: &str = "Failed to generate swap suggestions";

#[instrument(skip(state, body))]
pub async fn rate_meal(
    state: &AppState,
    user_id: Uuid,
    meal_id: Uuid,
    body: RateMealRequest,
) -> Result<MealRating, ApiError> {
    state.limiter.enforce(
        user_id,
        RATE_OPERATION,
        RateLimitConfig::API,
        "Please slow down",
    )?;
    let valid = body.validate().map_err(ApiError::Validation)?;

    if state.store.get_meal(user_id, meal_id).await?.is_none() {
        return Err(ApiError::NotFound("Meal not found"));
    }
    if state
        .store
        .get_profile(user_id, valid.subject_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound("Baby not found or unauthorized"));
    }

    let saved = state
        .store
        .upsert_rating(NewRating {
            meal_id,
            subject_id: valid.subject_id,
            user_id,
            rating: valid.rating,
            taste_feedback: valid.taste_feedback,
            would_make_again: valid.would_make_again,
            notes: valid.notes,
        })
        .await
        .map_err(|e| {
            error!(error = %e, %meal_id, "saving rating failed");
            ApiError::from(e)
        })?;
    info!(%meal_id, rating_id = %saved.id, "meal rated");
    Ok(saved)
}

#[instrument(skip(state))]
pub async fn suggest_swaps(
    state: &AppState,
    user_id: Uuid,
    meal_id: Uuid,
    body: SwapRequest,
) -> Result<SwapResponse, ApiError> {
    state.limiter.enforce(
        user_id,
        SWAP_OPERATION,
        state.config.limits.ai_rate_limit(),
        "Please wait before requesting more swaps",
    )?;
    let valid = body.validate().map_err(ApiError::Validation)?;

    let meal = state
        .store
        .get_meal(user_id, meal_id)
        .await?
        .ok_or(ApiError::NotFound("Meal not found"))?;

    let disliked: Vec<String> = state
        .store
        .rated_meals(meal.subject.id)
        .await?
        .into_iter()
        .filter(|m| m.is_disliked())
        .map(|m| m.title)
        .collect();

    let today = OffsetDateTime::now_utc().date();
    let prompt = build_swap_prompt(&SwapInput {
        title: &meal.title,
        summary: &meal.summary,
        meal_type: &meal.meal_type,
        ingredients: &meal.ingredients,
        age_months: age_in_months(meal.subject.birthdate, today),
        allergies: &meal.subject.allergies,
        reason: valid.reason,
        custom_reason: valid.custom_reason.as_deref(),
        disliked_meals: &disliked,
    });

    let raw = complete_within(state.llm.as_ref(), prompt, state.config.openai.timeout())
        .await
        .map_err(|e| {
            error!(error = %e, "swap generation failed");
            ApiError::Upstream(SWAP_FAILED)
        })?;
    let suggestions = validate_suggestions(&raw).map_err(|rejection| {
        warn!(violations = ?rejection.violations(), "swap suggestions rejected");
        debug!(raw = %raw, "rejected model output");
        ApiError::Upstream(SWAP_FAILED)
    })?;

    Ok(SwapResponse {
        success: true,
        original_meal: OriginalMeal {
            id: meal.id,
            title: meal.title,
            meal_type: meal.meal_type,
        },
        suggestions,
    })
}
