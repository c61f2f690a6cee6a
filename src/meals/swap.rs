//! Swap suggestions: three alternatives for one planned meal.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::llm::{strip_code_fences, CompletionRequest};
use crate::models::{Ingredient, SwapReason};
use crate::plans::response::ResponseRejection;
use crate::plans::{join_or, AgeRange};

pub const SWAP_SYSTEM_PROMPT: &str =
    "You are a baby nutrition expert. Always respond with valid JSON only, no markdown or explanation.";
/// Higher than plan generation, for variety between alternatives.
pub const SWAP_TEMPERATURE: f32 = 0.8;
pub const SUGGESTION_COUNT: usize = 3;

pub fn reason_label(reason: SwapReason) -> &'static str {
    match reason {
        SwapReason::MissingIngredient => "Missing some ingredients",
        SwapReason::DontLike => "Baby didn't like similar meals",
        SwapReason::WantVariety => "Want more variety",
        SwapReason::Dietary => "Dietary restrictions",
        SwapReason::Other => "Other reason",
    }
}

fn reason_hint(reason: SwapReason) -> Option<&'static str> {
    match reason {
        SwapReason::MissingIngredient => {
            Some("Use common pantry ingredients, different from the original")
        }
        SwapReason::DontLike => Some("Try different flavor profiles and textures"),
        SwapReason::WantVariety => Some("Explore different cuisines or ingredient combinations"),
        SwapReason::Dietary => Some("Focus on alternative ingredients that meet dietary needs"),
        SwapReason::Other => None,
    }
}

/// What the prompt needs to know about the meal being replaced.
#[derive(Debug, Clone)]
pub struct SwapInput<'a> {
    pub title: &'a str,
    pub summary: &'a str,
    pub meal_type: &'a str,
    pub ingredients: &'a [Ingredient],
    pub age_months: u32,
    pub allergies: &'a [String],
    pub reason: Option<SwapReason>,
    pub custom_reason: Option<&'a str>,
    pub disliked_meals: &'a [String],
}

pub fn build_swap_prompt(input: &SwapInput<'_>) -> CompletionRequest {
    let range = AgeRange::from_months(input.age_months);
    let ingredients: Vec<String> = input.ingredients.iter().map(|i| i.name.clone()).collect();
    let reason = match input.reason {
        Some(r) => match input.custom_reason {
            Some(custom) => format!("Swap reason: {} - {}", reason_label(r), custom),
            None => format!("Swap reason: {}", reason_label(r)),
        },
        None => "User wants alternative options".to_string(),
    };

    let mut p = String::new();
    let _ = writeln!(
        p,
        "You are a baby nutrition expert. Generate {} alternative meal suggestions to swap with the following meal.",
        SUGGESTION_COUNT
    );
    let _ = writeln!(p);
    let _ = writeln!(p, "## ORIGINAL MEAL TO REPLACE");
    let _ = writeln!(p, "- Title: {}", input.title);
    let _ = writeln!(p, "- Summary: {}", input.summary);
    let _ = writeln!(p, "- Meal type: {}", input.meal_type);
    let _ = writeln!(p, "- Ingredients: {}", ingredients.join(", "));
    let _ = writeln!(p);
    let _ = writeln!(p, "## CONTEXT");
    let _ = writeln!(p, "- Baby's age: {} months", input.age_months);
    let _ = writeln!(p, "- Texture guideline for this age: {}", range.texture_guideline());
    let _ = writeln!(p, "- Known allergies: {}", join_or(input.allergies, "none known"));
    let _ = writeln!(p, "- {}", reason);

    if !input.disliked_meals.is_empty() {
        let _ = writeln!(p);
        let _ = writeln!(p, "## AVOID THESE PATTERNS");
        let _ = writeln!(
            p,
            "Based on past feedback, avoid meals similar to: {}",
            input.disliked_meals.join(", ")
        );
    }

    let _ = writeln!(p);
    let _ = writeln!(p, "## REQUIREMENTS FOR ALTERNATIVES");
    let _ = writeln!(p, "1. Must maintain similar nutritional value to the original");
    let _ = writeln!(
        p,
        "2. Must be appropriate for the same meal type ({})",
        input.meal_type
    );
    let _ = writeln!(
        p,
        "3. Must follow texture guidelines for {}-month-old",
        input.age_months
    );
    let _ = writeln!(p, "4. Must avoid known allergens");
    let _ = writeln!(p, "5. Should address the swap reason");
    if let Some(hint) = input.reason.and_then(reason_hint) {
        let _ = writeln!(p, "   - {}", hint);
    }
    let _ = writeln!(p, "6. Each alternative should be distinctly different from the others");
    let _ = writeln!(p);
    let _ = writeln!(p, "## OUTPUT FORMAT (JSON only)");
    let _ = writeln!(p, "{}", SWAP_EXAMPLE);
    let _ = writeln!(p);
    let _ = write!(
        p,
        "Generate exactly {} alternatives. Each should be practical, simple, and quick to prepare.",
        SUGGESTION_COUNT
    );

    CompletionRequest {
        system: SWAP_SYSTEM_PROMPT.to_string(),
        user: p,
        temperature: SWAP_TEMPERATURE,
    }
}

const SWAP_EXAMPLE: &str = r#"{
  "suggestions": [
    {
      "title": "Alternative meal name",
      "summary": "Brief description of why this is a good swap",
      "ingredients": [
        {"name": "ingredient", "quantity": "2", "unit": "tablespoons", "category": "fruits"}
      ],
      "instructions": ["Step 1", "Step 2", "Step 3"],
      "prep_time_minutes": 10,
      "texture_notes": "Age-appropriate texture description",
      "swap_reason": "Why this is a good alternative for the user's situation",
      "nutritional_comparison": "How nutrition compares to original"
    }
  ]
}"#;

fn default_prep_time() -> u32 {
    15
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapSuggestion {
    pub title: String,
    pub summary: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    #[serde(default = "default_prep_time")]
    pub prep_time_minutes: u32,
    #[serde(default)]
    pub texture_notes: Option<String>,
    pub swap_reason: String,
    pub nutritional_comparison: String,
}

#[derive(Deserialize)]
struct SwapEnvelope {
    suggestions: Vec<SwapSuggestion>,
}

/// Parses the model output; anything but exactly three complete
/// suggestions is rejected.
pub fn validate_suggestions(raw: &str) -> Result<Vec<SwapSuggestion>, ResponseRejection> {
    let envelope: SwapEnvelope = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| ResponseRejection::Malformed(e.to_string()))?;

    let mut violations = Vec::new();
    if envelope.suggestions.len() != SUGGESTION_COUNT {
        violations.push(format!(
            "expected {} suggestions, got {}",
            SUGGESTION_COUNT,
            envelope.suggestions.len()
        ));
    }
    for (i, s) in envelope.suggestions.iter().enumerate() {
        if s.title.trim().is_empty() {
            violations.push(format!("suggestions.{}.title is empty", i));
        }
        if s.ingredients.is_empty() {
            violations.push(format!("suggestions.{}.ingredients is empty", i));
        }
        if s.instructions.is_empty() {
            violations.push(format!("suggestions.{}.instructions is empty", i));
        }
    }
    if violations.is_empty() {
        Ok(envelope.suggestions)
    } else {
        Err(ResponseRejection::Invalid(violations))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::{json, Value};

    pub(crate) fn suggestions_json(n: usize) -> Value {
        let items: Vec<Value> = (0..n)
            .map(|i| {
                json!({
                    "title": format!("Alternative {}", i),
                    "summary": "Soft and mild",
                    "ingredients": [{ "name": "pear", "quantity": "1", "unit": "whole" }],
                    "instructions": ["Steam", "Mash"],
                    "swap_reason": "Uses pantry staples",
                    "nutritional_comparison": "Similar fiber",
                })
            })
            .collect();
        json!({ "suggestions": items })
    }

    fn input<'a>(
        ingredients: &'a [Ingredient],
        allergies: &'a [String],
        disliked: &'a [String],
        reason: Option<SwapReason>,
    ) -> SwapInput<'a> {
        SwapInput {
            title: "Sweet potato mash",
            summary: "Smooth orange puree",
            meal_type: "lunch",
            ingredients,
            age_months: 9,
            allergies,
            reason,
            custom_reason: Some("out of sweet potatoes"),
            disliked_meals: disliked,
        }
    }

    #[test]
    fn prompt_carries_meal_reason_and_avoid_list() {
        let ingredients = vec![Ingredient {
            name: "sweet potato".into(),
            quantity: "1".into(),
            unit: "whole".into(),
            category: None,
        }];
        let allergies = vec!["egg".to_string()];
        let disliked = vec!["Spinach puree".to_string()];
        let req = build_swap_prompt(&input(
            &ingredients,
            &allergies,
            &disliked,
            Some(SwapReason::MissingIngredient),
        ));

        assert_eq!(req.temperature, SWAP_TEMPERATURE);
        assert!(req.user.contains("- Ingredients: sweet potato"));
        assert!(req.user.contains("Thicker purees, soft lumps"));
        assert!(req.user.contains("- Known allergies: egg"));
        assert!(req
            .user
            .contains("Swap reason: Missing some ingredients - out of sweet potatoes"));
        assert!(req.user.contains("Use common pantry ingredients"));
        assert!(req.user.contains("avoid meals similar to: Spinach puree"));
    }

    #[test]
    fn prompt_without_reason_or_history() {
        let req = build_swap_prompt(&input(&[], &[], &[], None));
        assert!(req.user.contains("User wants alternative options"));
        assert!(req.user.contains("- Known allergies: none known"));
        assert!(!req.user.contains("AVOID THESE PATTERNS"));
    }

    #[test]
    fn accepts_exactly_three_suggestions() {
        let got = validate_suggestions(&suggestions_json(3).to_string()).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].prep_time_minutes, 15);
    }

    #[test]
    fn rejects_wrong_count_and_empty_steps() {
        assert!(validate_suggestions(&suggestions_json(2).to_string()).is_err());

        let mut raw = suggestions_json(3);
        raw["suggestions"][1]["instructions"] = json!([]);
        let err = validate_suggestions(&raw.to_string()).unwrap_err();
        assert_eq!(
            err.violations(),
            vec!["suggestions.1.instructions is empty".to_string()]
        );

        assert!(matches!(
            validate_suggestions("no thanks"),
            Err(ResponseRejection::Malformed(_))
        ));
    }
}
