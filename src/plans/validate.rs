//! Request validation for plan generation.
//!
//! Works on the raw JSON value so that every failing field is reported at
//! once instead of stopping at the first serde error.

use serde_json::{Map, Value};
use uuid::Uuid;

use super::dto::GenerateRequest;
use crate::error::FieldError;
use crate::models::{FeedingGoal, MealType};

pub const MIN_DAYS: u8 = 1;
pub const MAX_DAYS: u8 = 14;

pub fn validate_generate(body: &Value) -> Result<GenerateRequest, Vec<FieldError>> {
    let Some(obj) = body.as_object() else {
        return Err(vec![FieldError::new("body", "Expected a JSON object")]);
    };
    let mut errors = Vec::new();

    let subject_id = subject_id(obj, &mut errors);
    let days = days(obj, &mut errors);
    let meals_per_day = meals_per_day(obj, &mut errors);
    let goal = goal(obj, &mut errors);
    let include_new_foods = flag(obj, "includeNewFoods", true, &mut errors);
    let batch_cooking = flag(obj, "batchCookingMode", false, &mut errors);
    let family_version = flag(obj, "includeFamilyVersion", false, &mut errors);

    match (subject_id, days, meals_per_day, goal) {
        (Some(subject_id), Some(days), Some(meals_per_day), Some(goal)) if errors.is_empty() => {
            Ok(GenerateRequest {
                subject_id,
                days,
                meals_per_day,
                goal,
                include_new_foods,
                batch_cooking,
                family_version,
            })
        }
        _ => Err(errors),
    }
}

/// Parses a UUID field, accepting `alias` as an alternative key.
pub(crate) fn uuid_field(
    obj: &Map<String, Value>,
    key: &str,
    alias: Option<&str>,
    errors: &mut Vec<FieldError>,
) -> Option<Uuid> {
    let value = obj
        .get(key)
        .or_else(|| alias.and_then(|a| obj.get(a)))
        .filter(|v| !v.is_null());
    match value {
        None => {
            errors.push(FieldError::new(key, "Required"));
            None
        }
        Some(Value::String(s)) => match Uuid::parse_str(s) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.push(FieldError::new(key, "Invalid UUID"));
                None
            }
        },
        Some(_) => {
            errors.push(FieldError::new(key, "Expected a UUID string"));
            None
        }
    }
}

fn subject_id(obj: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<Uuid> {
    uuid_field(obj, "subjectId", Some("babyId"), errors)
}

fn days(obj: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<u8> {
    let Some(value) = obj.get("days").filter(|v| !v.is_null()) else {
        errors.push(FieldError::new("days", "Required"));
        return None;
    };
    let Some(n) = value.as_i64() else {
        errors.push(FieldError::new("days", "Expected an integer"));
        return None;
    };
    if n < MIN_DAYS as i64 || n > MAX_DAYS as i64 {
        errors.push(FieldError::new(
            "days",
            format!("Must be between {} and {}", MIN_DAYS, MAX_DAYS),
        ));
        return None;
    }
    Some(n as u8)
}

fn meals_per_day(obj: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<Vec<MealType>> {
    let Some(value) = obj.get("mealsPerDay").filter(|v| !v.is_null()) else {
        errors.push(FieldError::new("mealsPerDay", "Required"));
        return None;
    };
    let Some(items) = value.as_array() else {
        errors.push(FieldError::new("mealsPerDay", "Expected an array"));
        return None;
    };
    if items.is_empty() {
        errors.push(FieldError::new(
            "mealsPerDay",
            "Select at least one meal type",
        ));
        return None;
    }

    let before = errors.len();
    let mut meals: Vec<MealType> = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let field = format!("mealsPerDay.{}", i);
        match item.as_str().map(str::parse::<MealType>) {
            Some(Ok(meal)) if meals.contains(&meal) => {
                errors.push(FieldError::new(field, "Duplicate meal type"));
            }
            Some(Ok(meal)) => meals.push(meal),
            Some(Err(_)) | None => {
                errors.push(FieldError::new(
                    field,
                    "Expected one of breakfast, lunch, dinner, snack",
                ));
            }
        }
    }
    (errors.len() == before).then_some(meals)
}

fn goal(obj: &Map<String, Value>, errors: &mut Vec<FieldError>) -> Option<FeedingGoal> {
    let Some(value) = obj.get("goal").filter(|v| !v.is_null()) else {
        errors.push(FieldError::new("goal", "Required"));
        return None;
    };
    match value.as_str().map(str::parse::<FeedingGoal>) {
        Some(Ok(goal)) => Some(goal),
        _ => {
            errors.push(FieldError::new(
                "goal",
                "Expected one of balanced_nutrition, weight_gain, food_variety, picky_eater",
            ));
            None
        }
    }
}

fn flag(
    obj: &Map<String, Value>,
    key: &str,
    default: bool,
    errors: &mut Vec<FieldError>,
) -> bool {
    match obj.get(key) {
        None | Some(Value::Null) => default,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            errors.push(FieldError::new(key, "Expected a boolean"));
            default
        }
    }
}
