use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::dto::{QuickSearchRequest, QuickSearchResponse};
use super::matching::rank_recipes;
use super::suggest::{build_ideas_prompt, validate_ideas, RecipeIdea, MIN_IDEA_INGREDIENTS};
use crate::error::ApiError;
use crate::llm::complete_within;
use crate::plans::build_context;
use crate::ratelimit::{rate_limit_key, RateLimitConfig};
use crate::state::AppState;

pub const SEARCH_OPERATION: &str = "quick-search";
pub const IDEAS_OPERATION: &str = "quick-search-ai";

#[instrument(skip(state, body))]
pub async fn quick_search(
    state: &AppState,
    user_id: Uuid,
    body: QuickSearchRequest,
) -> Result<QuickSearchResponse, ApiError> {
    state.limiter.enforce(
        user_id,
        SEARCH_OPERATION,
        RateLimitConfig::API,
        "Please slow down",
    )?;
    let valid = body.validate().map_err(ApiError::Validation)?;

    let profile = state
        .store
        .get_profile(user_id, valid.subject_id)
        .await?
        .ok_or(ApiError::NotFound("Baby not found"))?;
    let history = state.store.food_history(profile.id).await?;
    let ctx = build_context(&profile, &history, &[], OffsetDateTime::now_utc().date());

    let recipes = state.store.subject_recipes(profile.id).await?;
    let scanned = recipes.len();
    let existing_recipes = rank_recipes(recipes, &valid.ingredients, &ctx.allergies);

    let ai_suggestions = if valid.include_ai && valid.ingredients.len() >= MIN_IDEA_INGREDIENTS {
        recipe_ideas(state, user_id, ctx.age_months, &valid.ingredients, &ctx.allergies).await
    } else {
        Vec::new()
    };

    info!(
        subject_id = %profile.id,
        scanned,
        matched = existing_recipes.len(),
        ideas = ai_suggestions.len(),
        "quick search"
    );
    Ok(QuickSearchResponse {
        existing_recipes,
        ai_suggestions,
        ingredient_count: valid.ingredients.len(),
    })
}

/// Best effort: a throttled, failed or rejected call yields no ideas and
/// never fails the search.
async fn recipe_ideas(
    state: &AppState,
    user_id: Uuid,
    age_months: u32,
    ingredients: &[String],
    allergies: &[String],
) -> Vec<RecipeIdea> {
    let admitted = state.limiter.check_at(
        &rate_limit_key(user_id, IDEAS_OPERATION),
        state.config.limits.ai_rate_limit(),
        OffsetDateTime::now_utc(),
    );
    if !admitted.success {
        debug!(%user_id, "recipe ideas throttled");
        return Vec::new();
    }

    let prompt = build_ideas_prompt(age_months, ingredients, allergies);
    let raw = match complete_within(state.llm.as_ref(), prompt, state.config.openai.timeout()).await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "recipe ideas failed");
            return Vec::new();
        }
    };
    match validate_ideas(&raw, allergies) {
        Ok(ideas) => ideas,
        Err(rejection) => {
            warn!(violations = ?rejection.violations(), "recipe ideas rejected");
            debug!(raw = %raw, "rejected model output");
            Vec::new()
        }
    }
}
