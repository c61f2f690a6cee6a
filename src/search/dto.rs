use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldError;

use super::suggest::RecipeIdea;

pub const MAX_INGREDIENTS: usize = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickSearchRequest {
    #[serde(alias = "babyId")]
    pub subject_id: Option<Uuid>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub include_ai_suggestions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSearch {
    pub subject_id: Uuid,
    /// Trimmed, without blanks or case-insensitive repeats.
    pub ingredients: Vec<String>,
    pub include_ai: bool,
}

impl QuickSearchRequest {
    pub fn validate(self) -> Result<ValidSearch, Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.subject_id.is_none() {
            errors.push(FieldError::new("subjectId", "Required"));
        }

        let mut ingredients: Vec<String> = Vec::new();
        for name in self.ingredients.iter().map(|i| i.trim()) {
            if !name.is_empty() && !ingredients.iter().any(|i| i.eq_ignore_ascii_case(name)) {
                ingredients.push(name.to_string());
            }
        }
        if self.ingredients.len() > MAX_INGREDIENTS {
            errors.push(FieldError::new(
                "ingredients",
                format!("Must contain at most {} items", MAX_INGREDIENTS),
            ));
        } else if ingredients.is_empty() {
            errors.push(FieldError::new("ingredients", "At least one ingredient is required"));
        }

        match self.subject_id {
            Some(subject_id) if errors.is_empty() => Ok(ValidSearch {
                subject_id,
                ingredients,
                include_ai: self.include_ai_suggestions,
            }),
            _ => Err(errors),
        }
    }
}

/// A stored recipe that shares enough ingredients with the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeMatch {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub prep_time_minutes: i32,
    pub ingredients: Vec<String>,
    /// Lower-cased names found in the request.
    pub matched_ingredients: Vec<String>,
    pub match_score: f64,
    pub meal_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickSearchResponse {
    pub existing_recipes: Vec<RecipeMatch>,
    pub ai_suggestions: Vec<RecipeIdea>,
    pub ingredient_count: usize,
}
