//! The generation pipeline: validate, gate, build context, prompt, call the
//! model, validate its output, then commit plan and quota charge together.

use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::context::build_context;
use super::dto::{GenerateRequest, GenerateResponse};
use super::prompt::build_plan_prompt;
use super::quota::{self, QuotaDecision};
use super::response::{validate_plan, GeneratedMeal, GeneratedPlan, ResponseRejection};
use super::validate::validate_generate;
use crate::error::ApiError;
use crate::llm::complete_within;
use crate::state::AppState;
use crate::store::{NewMealSlot, NewPlan, NewRecipe};

pub const GENERATE_OPERATION: &str = "generate-meal-plan";
const GENERATE_RATE_MESSAGE: &str = "Please wait before generating another meal plan";
const GENERATION_FAILED: &str = "Failed to generate meal plan";

#[instrument(skip(state, body))]
pub async fn generate_plan(
    state: &AppState,
    user_id: Uuid,
    body: &Value,
) -> Result<GenerateResponse, ApiError> {
    state.limiter.enforce(
        user_id,
        GENERATE_OPERATION,
        state.config.limits.ai_rate_limit(),
        GENERATE_RATE_MESSAGE,
    )?;

    let req = validate_generate(body).map_err(ApiError::Validation)?;

    let account = state
        .store
        .get_account(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account not found".into()))?;

    let limit = state.config.limits.free_plans_per_week;
    let now = OffsetDateTime::now_utc();
    if let QuotaDecision::Exceeded { used, limit } = quota::evaluate(&account, limit, now) {
        info!(used, limit, "weekly plan limit reached");
        return Err(ApiError::QuotaExceeded);
    }

    let profile = state
        .store
        .get_profile(user_id, req.subject_id)
        .await?
        .ok_or(ApiError::NotFound("Baby not found"))?;
    let history = state.store.food_history(profile.id).await?;
    let rated = state.store.rated_meals(profile.id).await?;

    let today = now.date();
    let ctx = build_context(&profile, &history, &rated, today);
    let prompt = build_plan_prompt(&ctx, &req);

    let raw = complete_within(state.llm.as_ref(), prompt, state.config.openai.timeout())
        .await
        .map_err(|e| {
            error!(error = %e, "generation call failed");
            ApiError::Upstream(GENERATION_FAILED)
        })?;

    let plan = validate_plan(&raw, &req).map_err(|rejection| {
        warn!(violations = ?rejection.violations(), "generated plan rejected");
        debug!(raw = %raw, "rejected model output");
        ApiError::Upstream(GENERATION_FAILED)
    })?;

    let new_plan = assemble_plan(&req, &plan, today).map_err(|rejection| {
        warn!(violations = ?rejection.violations(), "generated plan rejected");
        ApiError::Upstream(GENERATION_FAILED)
    })?;
    let slots = new_plan.slots.len();
    let charge = quota::charge_for(&account, limit, now);
    let plan_id = state.store.commit_plan(new_plan, charge).await.map_err(|e| {
        error!(error = %e, "plan commit failed");
        ApiError::from(e)
    })?;

    info!(%plan_id, slots, charged = charge.is_some(), "meal plan created");
    Ok(GenerateResponse {
        success: true,
        plan_id,
        data: plan,
    })
}

/// Plan row plus one slot (with its recipe) per generated meal. Integers
/// that do not fit their columns reject the plan.
pub fn assemble_plan(
    req: &GenerateRequest,
    plan: &GeneratedPlan,
    today: time::Date,
) -> Result<NewPlan, ResponseRejection> {
    let slots = plan
        .days
        .iter()
        .flat_map(|day| day.meals.iter().map(move |meal| slot_for(day.day_index, meal)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(NewPlan {
        subject_id: req.subject_id,
        start_date: today,
        end_date: today + Duration::days(i64::from(req.days) - 1),
        goal: req.goal,
        days: i32::from(req.days),
        slots,
    })
}

fn column_int(field: &str, value: u32) -> Result<i32, ResponseRejection> {
    i32::try_from(value)
        .map_err(|_| ResponseRejection::Invalid(vec![format!("{} {} is out of range", field, value)]))
}

fn slot_for(day_index: u32, meal: &GeneratedMeal) -> Result<NewMealSlot, ResponseRejection> {
    Ok(NewMealSlot {
        day_index: column_int("day_index", day_index)?,
        meal_type: meal.meal_type,
        title: meal.title.clone(),
        summary: meal.summary.clone(),
        recipe: NewRecipe {
            ingredients: meal.ingredients.clone(),
            instructions: meal.instructions.clone(),
            prep_time_minutes: column_int("prep_time_minutes", meal.prep_time_minutes)?,
            texture_notes: meal.texture_notes.clone(),
            choking_hazard_notes: meal.new_food().map(|food| format!("New food: {}", food)),
            batch_info: meal.batch_info.clone(),
            family_version: meal.family_version.clone(),
            nutrition: meal.nutrition.clone(),
        },
    })
}
