use std::fmt::Write;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ApiError, FieldError};
use crate::llm::{complete_within, strip_code_fences, CompletionRequest};
use crate::models::Ingredient;
use crate::plans::response::ResponseRejection;
use crate::plans::uuid_field;
use crate::state::AppState;
use crate::store::{GroceryItem, GroceryList};

pub const GROCERY_OPERATION: &str = "generate-grocery-list";
pub const GROCERY_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that consolidates grocery lists. Always respond with valid JSON only.";
pub const GROCERY_TEMPERATURE: f32 = 0.3;
const GROCERY_FAILED: &str = "Failed to generate grocery list";

pub fn validate_grocery_request(body: &Value) -> Result<Uuid, Vec<FieldError>> {
    let Some(obj) = body.as_object() else {
        return Err(vec![FieldError::new("body", "Expected a JSON object")]);
    };
    let mut errors = Vec::new();
    uuid_field(obj, "planId", None, &mut errors).ok_or(errors)
}

pub fn build_grocery_prompt(ingredients: &[Ingredient]) -> CompletionRequest {
    let listed = serde_json::to_string_pretty(ingredients).unwrap_or_else(|_| "[]".into());
    let mut p = String::new();
    let _ = writeln!(p, "Consolidate this list of baby food ingredients into a shopping list.");
    let _ = writeln!(
        p,
        "Combine duplicates, round up quantities, and organize by grocery store section."
    );
    let _ = writeln!(p);
    let _ = writeln!(p, "Ingredients:");
    let _ = writeln!(p, "{}", listed);
    let _ = writeln!(p);
    let _ = writeln!(p, "## Output Format (JSON only)");
    let _ = writeln!(p, "{{");
    let _ = writeln!(p, "  \"items\": [");
    let _ = writeln!(
        p,
        "    {{\"name\": \"ingredient\", \"quantity\": \"combined quantity\", \"unit\": \"unit\", \"category\": \"category\", \"checked\": false}}"
    );
    let _ = writeln!(p, "  ]");
    let _ = writeln!(p, "}}");
    let _ = writeln!(p);
    let _ = write!(
        p,
        "Group by category and combine any duplicate ingredients. Use standard grocery quantities (e.g., \"1 bunch\" for herbs, \"1 lb\" for meats)."
    );
    CompletionRequest {
        system: GROCERY_SYSTEM_PROMPT.to_string(),
        user: p,
        temperature: GROCERY_TEMPERATURE,
    }
}

#[derive(Deserialize)]
struct GroceryEnvelope {
    items: Vec<GroceryItem>,
}

pub fn validate_items(raw: &str) -> Result<Vec<GroceryItem>, ResponseRejection> {
    let envelope: GroceryEnvelope = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| ResponseRejection::Malformed(e.to_string()))?;
    let mut violations: Vec<String> = envelope
        .items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.name.trim().is_empty())
        .map(|(i, _)| format!("items.{}.name is empty", i))
        .collect();
    if envelope.items.is_empty() {
        violations.push("items is empty".into());
    }
    if violations.is_empty() {
        Ok(envelope.items)
    } else {
        Err(ResponseRejection::Invalid(violations))
    }
}

#[instrument(skip(state, body))]
pub async fn generate_grocery_list(
    state: &AppState,
    user_id: Uuid,
    body: &Value,
) -> Result<GroceryList, ApiError> {
    state.limiter.enforce(
        user_id,
        GROCERY_OPERATION,
        state.config.limits.ai_rate_limit(),
        "Please wait before generating another grocery list",
    )?;
    let plan_id = validate_grocery_request(body).map_err(ApiError::Validation)?;

    let ingredients = state
        .store
        .plan_ingredients(user_id, plan_id)
        .await?
        .ok_or(ApiError::NotFound("Plan not found"))?;
    if state.store.get_grocery_list(user_id, plan_id).await?.is_some() {
        return Err(ApiError::Conflict("Grocery list already exists".into()));
    }
    if ingredients.is_empty() {
        return Err(ApiError::NotFound("No meals found"));
    }

    let prompt = build_grocery_prompt(&ingredients);
    let raw = complete_within(state.llm.as_ref(), prompt, state.config.openai.timeout())
        .await
        .map_err(|e| {
            error!(error = %e, "grocery consolidation failed");
            ApiError::Upstream(GROCERY_FAILED)
        })?;
    let items = validate_items(&raw).map_err(|rejection| {
        warn!(violations = ?rejection.violations(), "grocery list rejected");
        debug!(raw = %raw, "rejected model output");
        ApiError::Upstream(GROCERY_FAILED)
    })?;

    let list = state.store.save_grocery_list(plan_id, items).await?;
    info!(%plan_id, items = list.items.len(), "grocery list created");
    Ok(list)
}
