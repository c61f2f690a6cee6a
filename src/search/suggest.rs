//! Model-written recipe ideas for the ingredients on hand.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::llm::{strip_code_fences, CompletionRequest};
use crate::plans::response::ResponseRejection;
use crate::plans::{AgeRange, MAX_PREP_TIME_MINUTES};

use super::matching::mentions_allergen;

pub const IDEAS_SYSTEM_PROMPT: &str =
    "You are a baby nutrition expert. Always respond with valid JSON only.";
pub const IDEAS_TEMPERATURE: f32 = 0.7;
pub const IDEA_COUNT: usize = 2;
/// Ideas are only worth asking for with at least this many ingredients.
pub const MIN_IDEA_INGREDIENTS: usize = 2;

pub fn build_ideas_prompt(
    age_months: u32,
    ingredients: &[String],
    allergies: &[String],
) -> CompletionRequest {
    let range = AgeRange::from_months(age_months);

    let mut p = String::new();
    let _ = writeln!(
        p,
        "Generate {} simple, healthy baby food recipes for a {}-month-old baby.",
        IDEA_COUNT, age_months
    );
    let _ = writeln!(p);
    let _ = writeln!(p, "Available ingredients: {}", ingredients.join(", "));
    let _ = writeln!(p);
    let _ = writeln!(p, "Requirements:");
    let _ = writeln!(p, "- Only use the available ingredients listed above");
    let _ = writeln!(p, "- Texture: {}", range.texture_guideline());
    let _ = writeln!(
        p,
        "- Safe for babies (avoid honey, salt, added sugar, whole nuts)"
    );
    if !allergies.is_empty() {
        let _ = writeln!(p, "- AVOID these allergens: {}", allergies.join(", "));
    }
    let _ = writeln!(p);
    let _ = writeln!(p, "Return JSON only:");
    let _ = write!(p, "{}", IDEAS_EXAMPLE);

    CompletionRequest {
        system: IDEAS_SYSTEM_PROMPT.to_string(),
        user: p,
        temperature: IDEAS_TEMPERATURE,
    }
}

const IDEAS_EXAMPLE: &str = r#"{
  "recipes": [
    {
      "title": "Recipe name",
      "summary": "Brief description",
      "ingredients": ["ingredient 1", "ingredient 2"],
      "instructions": ["Step 1", "Step 2"],
      "prep_time_minutes": 15,
      "texture_notes": "e.g., Soft mash, Finger food"
    }
  ]
}"#;

fn default_prep_time() -> u32 {
    15
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct RecipeIdea {
    pub title: String,
    pub summary: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    #[serde(default = "default_prep_time")]
    pub prep_time_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture_notes: Option<String>,
}

#[derive(Deserialize)]
struct IdeasEnvelope {
    recipes: Vec<RecipeIdea>,
}

/// Keeps at most two ideas. One incomplete or unsafe idea rejects the lot.
pub fn validate_ideas(
    raw: &str,
    allergies: &[String],
) -> Result<Vec<RecipeIdea>, ResponseRejection> {
    let envelope: IdeasEnvelope = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| ResponseRejection::Malformed(e.to_string()))?;

    let mut violations = Vec::new();
    if envelope.recipes.is_empty() {
        violations.push("recipes is empty".to_string());
    }
    for (i, idea) in envelope.recipes.iter().enumerate() {
        if idea.title.trim().is_empty() {
            violations.push(format!("recipes.{}.title is empty", i));
        }
        if idea.ingredients.is_empty() {
            violations.push(format!("recipes.{}.ingredients is empty", i));
        }
        if idea.instructions.is_empty() {
            violations.push(format!("recipes.{}.instructions is empty", i));
        }
        if idea.prep_time_minutes > MAX_PREP_TIME_MINUTES {
            violations.push(format!(
                "recipes.{}.prep_time_minutes {} is out of range",
                i, idea.prep_time_minutes
            ));
        }
        for name in idea
            .ingredients
            .iter()
            .filter(|n| mentions_allergen(n, allergies))
        {
            violations.push(format!("recipes.{} uses allergen {}", i, name));
        }
    }
    if !violations.is_empty() {
        return Err(ResponseRejection::Invalid(violations));
    }

    let mut ideas = envelope.recipes;
    ideas.truncate(IDEA_COUNT);
    Ok(ideas)
}
