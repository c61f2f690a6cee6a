//! Validation of generated plan text.
//!
//! The model's output is untrusted. It must parse, match the JSON Schema
//! compiled from [`super::schema`], and cover exactly the requested days and
//! meal types. Anything less rejects the whole response.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::dto::GenerateRequest;
use super::schema::{self, Extension, GenerationFeatures};
use crate::llm::strip_code_fences;
use crate::models::{Ingredient, MealType};

/// Key the batch-cooking fields are grouped under once validated.
const BATCH_INFO_KEY: &str = "batch_info";

#[derive(Debug, Error)]
pub enum ResponseRejection {
    #[error("response is not valid JSON: {0}")]
    Malformed(String),

    #[error("response failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ResponseRejection {
    pub fn violations(&self) -> Vec<String> {
        match self {
            ResponseRejection::Malformed(e) => vec![e.clone()],
            ResponseRejection::Invalid(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: f64,
    pub protein_grams: f64,
    pub carbs_grams: f64,
    pub fat_grams: f64,
    pub fiber_grams: f64,
    pub iron_mg: f64,
    pub calcium_mg: f64,
    pub vitamin_a_mcg: f64,
    pub vitamin_c_mg: f64,
    pub vitamin_d_mcg: f64,
    pub serving_size: String,
    #[serde(default)]
    pub age_appropriate_notes: Option<String>,
}

fn default_portion_multiplier() -> f64 {
    3.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyVersion {
    pub title: String,
    pub modifications: String,
    pub seasonings: Vec<String>,
    #[serde(default)]
    pub additional_ingredients: Vec<String>,
    #[serde(default = "default_portion_multiplier")]
    pub portion_multiplier: f64,
    #[serde(default)]
    pub cooking_adjustments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub make_ahead_notes: String,
    pub storage_instructions: String,
    pub freezable: bool,
    pub reheat_instructions: String,
    pub prep_day_tasks: Vec<String>,
}

fn default_prep_time() -> u32 {
    15
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMeal {
    pub meal_type: MealType,
    pub title: String,
    pub summary: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    #[serde(default = "default_prep_time")]
    pub prep_time_minutes: u32,
    #[serde(default)]
    pub texture_notes: Option<String>,
    #[serde(default)]
    pub new_food_introduced: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<Nutrition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_info: Option<BatchInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_version: Option<FamilyVersion>,
}

impl GeneratedMeal {
    /// The newly introduced food, ignoring placeholder values.
    pub fn new_food(&self) -> Option<&str> {
        let food = self.new_food_introduced.as_deref()?.trim();
        if food.is_empty() || food.eq_ignore_ascii_case("null") || food.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(food)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDay {
    pub day_index: u32,
    pub meals: Vec<GeneratedMeal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPlan {
    pub days: Vec<GeneratedDay>,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

pub fn validate_plan(raw: &str, req: &GenerateRequest) -> Result<GeneratedPlan, ResponseRejection> {
    let features = req.features();
    let mut value: Value = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| ResponseRejection::Malformed(e.to_string()))?;

    for_each_meal(&mut value, |meal| {
        for key in schema::disabled_keys(features) {
            meal.remove(key);
        }
    });

    let validator = jsonschema::validator_for(&schema::plan_schema(features))
        .map_err(|e| ResponseRejection::Invalid(vec![format!("schema: {}", e)]))?;
    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ResponseRejection::Invalid(errors));
    }

    if Extension::BatchCooking.enabled(features) {
        for_each_meal(&mut value, group_batch_fields);
    }

    let mut plan: GeneratedPlan = serde_json::from_value(value)
        .map_err(|e| ResponseRejection::Invalid(vec![e.to_string()]))?;

    let violations = coverage_violations(&plan, req);
    if !violations.is_empty() {
        return Err(ResponseRejection::Invalid(violations));
    }

    plan.days.sort_by_key(|d| d.day_index);
    for day in &mut plan.days {
        day.meals.sort_by_key(|m| {
            req.meals_per_day
                .iter()
                .position(|t| *t == m.meal_type)
                .unwrap_or(usize::MAX)
        });
    }
    Ok(plan)
}

fn for_each_meal(value: &mut Value, mut f: impl FnMut(&mut Map<String, Value>)) {
    let Some(days) = value.get_mut("days").and_then(Value::as_array_mut) else {
        return;
    };
    for day in days {
        let Some(meals) = day.get_mut("meals").and_then(Value::as_array_mut) else {
            continue;
        };
        for meal in meals.iter_mut().filter_map(Value::as_object_mut) {
            f(meal);
        }
    }
}

fn group_batch_fields(meal: &mut Map<String, Value>) {
    let mut batch = Map::new();
    for key in Extension::BatchCooking.keys() {
        if let Some(v) = meal.remove(*key) {
            batch.insert((*key).to_string(), v);
        }
    }
    meal.insert(BATCH_INFO_KEY.to_string(), Value::Object(batch));
}

/// Day indices must be exactly `0..days` and every day must hold exactly the
/// requested meal types once each.
fn coverage_violations(plan: &GeneratedPlan, req: &GenerateRequest) -> Vec<String> {
    let mut violations = Vec::new();
    let days = req.days as u32;
    let wanted: BTreeSet<MealType> = req.meals_per_day.iter().copied().collect();

    let mut seen_days = BTreeSet::new();
    for day in &plan.days {
        if day.day_index >= days {
            violations.push(format!(
                "day_index {} is outside 0..{}",
                day.day_index,
                days
            ));
        }
        if !seen_days.insert(day.day_index) {
            violations.push(format!("day_index {} appears more than once", day.day_index));
        }

        let mut seen_meals = BTreeSet::new();
        for meal in &day.meals {
            if !wanted.contains(&meal.meal_type) {
                violations.push(format!(
                    "day {}: unexpected meal type {}",
                    day.day_index, meal.meal_type
                ));
            } else if !seen_meals.insert(meal.meal_type) {
                violations.push(format!(
                    "day {}: duplicate meal type {}",
                    day.day_index, meal.meal_type
                ));
            }
        }
        for missing in wanted.difference(&seen_meals) {
            violations.push(format!("day {}: missing meal type {}", day.day_index, missing));
        }
    }

    for missing in (0..days).filter(|d| !seen_days.contains(d)) {
        violations.push(format!("day_index {} is missing", missing));
    }
    violations
}
