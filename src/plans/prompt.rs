use std::fmt::Write;

use super::context::GenerationContext;
use super::dto::GenerateRequest;
use super::schema::{self, GenerationFeatures};
use crate::llm::CompletionRequest;
use crate::models::MealType;

pub const PLAN_SYSTEM_PROMPT: &str =
    "You are a baby nutrition expert. Always respond with valid JSON only, no markdown or explanation.";
pub const PLAN_TEMPERATURE: f32 = 0.7;

pub(crate) fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}

fn meal_list(meals: &[MealType]) -> String {
    meals
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Builds the system and user messages for one plan generation.
pub fn build_plan_prompt(ctx: &GenerationContext, req: &GenerateRequest) -> CompletionRequest {
    let features: GenerationFeatures = req.features();
    let meals = meal_list(&req.meals_per_day);
    let mut p = String::new();

    // writes into a String cannot fail
    let _ = writeln!(
        p,
        "You are a baby nutrition expert creating a {}-day meal plan for a {}-month-old baby named {}.",
        req.days, ctx.age_months, ctx.name
    );
    let _ = writeln!(p);
    let _ = writeln!(p, "## Context");
    let _ = writeln!(p, "- Baby's age: {} months", ctx.age_months);
    let _ = writeln!(p, "- Feeding goal: {}", req.goal.description());
    let _ = writeln!(
        p,
        "- Texture guideline for this age ({} months): {}",
        ctx.age_range.label(),
        ctx.age_range.texture_guideline()
    );
    let _ = writeln!(p, "- Known allergies: {}", join_or(&ctx.allergies, "none known"));
    let _ = writeln!(p, "- Foods already tried: {}", join_or(&ctx.tried_foods, "none yet"));
    let _ = writeln!(
        p,
        "- Foods the baby dislikes: {}",
        join_or(&ctx.disliked_foods, "none recorded")
    );
    let _ = writeln!(
        p,
        "- Meals the baby loved: {}",
        join_or(&ctx.loved_meals, "none recorded")
    );
    let _ = writeln!(
        p,
        "- Meals the baby disliked: {}",
        join_or(&ctx.disliked_meals, "none recorded")
    );
    let _ = writeln!(
        p,
        "- Include new food introductions: {}",
        if req.include_new_foods { "Yes" } else { "No" }
    );
    let _ = writeln!(p, "- Meals per day: {}", meals);
    let _ = writeln!(
        p,
        "- Batch cooking mode: {}",
        if features.batch_cooking { "ENABLED" } else { "Disabled" }
    );

    for ext in schema::active(features) {
        let _ = writeln!(p);
        let _ = writeln!(p, "{}", ext.prompt_section());
    }

    let _ = writeln!(p);
    let _ = writeln!(p, "## Important Guidelines");
    let mut rules = vec![
        "All meals must be age-appropriate and safe".to_string(),
        "Focus on nutrient-dense, whole foods".to_string(),
        "Portions should be baby-sized (1-4 tablespoons per food item)".to_string(),
        "Introduce only ONE new food per day maximum (if including new foods)".to_string(),
        "Avoid honey for babies under 12 months".to_string(),
        "Avoid added salt and sugar".to_string(),
        "Include variety across food groups".to_string(),
        "Textures must match the age guideline above".to_string(),
    ];
    if !ctx.allergies.is_empty() {
        rules.push(format!(
            "Never use these allergens or foods containing them: {}",
            ctx.allergies.join(", ")
        ));
    }
    if !req.include_new_foods {
        rules.push(
            "Only use foods the baby has already tried and set \"new_food_introduced\" to null"
                .to_string(),
        );
    }
    if !ctx.loved_meals.is_empty() || !ctx.disliked_meals.is_empty() {
        rules.push(
            "Lean towards meals similar to the loved ones and avoid ones similar to the disliked ones"
                .to_string(),
        );
    }
    for (i, rule) in rules.iter().enumerate() {
        let _ = writeln!(p, "{}. {}", i + 1, rule);
    }

    let example = schema::example_plan(&req.meals_per_day, features);
    let example = serde_json::to_string_pretty(&example).unwrap_or_else(|_| example.to_string());
    let _ = writeln!(p);
    let _ = writeln!(p, "## Required Output Format");
    let _ = writeln!(p, "Return ONLY valid JSON in this exact structure:");
    let _ = writeln!(p, "{}", example);
    let _ = writeln!(p);
    let _ = writeln!(
        p,
        "Every meal must include: {}.",
        schema::required_meal_keys(features).join(", ")
    );
    let _ = writeln!(
        p,
        "Generate {} days of meals with day_index 0 to {}. Each day must have exactly these meal types: {}.",
        req.days,
        req.days.saturating_sub(1),
        meals
    );
    let _ = write!(
        p,
        "Include practical, simple recipes that busy parents can prepare quickly."
    );

    CompletionRequest {
        system: PLAN_SYSTEM_PROMPT.to_string(),
        user: p,
        temperature: PLAN_TEMPERATURE,
    }
}
