//! Output contract for generated plans.
//!
//! Optional meal sections are described once, in [`Extension`]. The prompt
//! builder renders their instructions and example values from here and the
//! response validator compiles its JSON Schema from the same table.

use serde_json::{json, Map, Value};

use super::validate::MAX_DAYS;
use crate::models::MealType;

/// Optional output sections a caller can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationFeatures {
    pub batch_cooking: bool,
    pub family_version: bool,
}

/// Longest prep time a generated meal may claim.
pub const MAX_PREP_TIME_MINUTES: u32 = 24 * 60;

/// Meal-level fields every generated meal must carry.
pub const BASE_MEAL_FIELDS: &[&str] = &["meal_type", "title", "summary", "ingredients", "instructions"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Nutrition,
    BatchCooking,
    FamilyVersion,
}

impl Extension {
    pub const ALL: [Extension; 3] = [
        Extension::Nutrition,
        Extension::BatchCooking,
        Extension::FamilyVersion,
    ];

    pub fn enabled(&self, features: GenerationFeatures) -> bool {
        match self {
            Extension::Nutrition => true,
            Extension::BatchCooking => features.batch_cooking,
            Extension::FamilyVersion => features.family_version,
        }
    }

    /// Meal-level keys this section contributes.
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Extension::Nutrition => &["nutrition"],
            Extension::BatchCooking => &[
                "make_ahead_notes",
                "storage_instructions",
                "freezable",
                "reheat_instructions",
                "prep_day_tasks",
            ],
            Extension::FamilyVersion => &["family_version"],
        }
    }

    fn field_schemas(&self) -> Vec<(&'static str, Value)> {
        match self {
            Extension::Nutrition => {
                let mut props = Map::new();
                for key in NUTRIENTS {
                    props.insert(key.to_string(), json!({ "type": "number", "minimum": 0 }));
                }
                props.insert("serving_size".into(), json!({ "type": "string", "minLength": 1 }));
                props.insert(
                    "age_appropriate_notes".into(),
                    json!({ "type": ["string", "null"] }),
                );
                let mut required: Vec<&str> = NUTRIENTS.to_vec();
                required.push("serving_size");
                vec![(
                    "nutrition",
                    json!({ "type": "object", "required": required, "properties": props }),
                )]
            }
            Extension::BatchCooking => vec![
                ("make_ahead_notes", json!({ "type": "string" })),
                ("storage_instructions", json!({ "type": "string" })),
                ("freezable", json!({ "type": "boolean" })),
                ("reheat_instructions", json!({ "type": "string" })),
                ("prep_day_tasks", string_array(0)),
            ],
            Extension::FamilyVersion => vec![(
                "family_version",
                json!({
                    "type": "object",
                    "required": ["title", "modifications", "seasonings"],
                    "properties": {
                        "title": { "type": "string", "minLength": 1 },
                        "modifications": { "type": "string" },
                        "seasonings": string_array(0),
                        "additional_ingredients": string_array(0),
                        "portion_multiplier": { "type": "number", "exclusiveMinimum": 0 },
                        "cooking_adjustments": { "type": ["string", "null"] },
                    },
                }),
            )],
        }
    }

    fn example_fields(&self) -> Vec<(&'static str, Value)> {
        match self {
            Extension::Nutrition => vec![(
                "nutrition",
                json!({
                    "calories": 120,
                    "protein_grams": 3.5,
                    "carbs_grams": 18,
                    "fat_grams": 4,
                    "fiber_grams": 2.5,
                    "iron_mg": 1.2,
                    "calcium_mg": 60,
                    "vitamin_a_mcg": 150,
                    "vitamin_c_mg": 8,
                    "vitamin_d_mcg": 0.5,
                    "serving_size": "1/2 cup",
                    "age_appropriate_notes": "Good source of iron for this age",
                }),
            )],
            Extension::BatchCooking => vec![
                ("make_ahead_notes", json!("Can be made ahead and stored")),
                ("storage_instructions", json!("Fridge: 3 days, Freezer: 2 weeks")),
                ("freezable", json!(true)),
                ("reheat_instructions", json!("Warm gently, stir, check temperature")),
                (
                    "prep_day_tasks",
                    json!(["Cook base ingredient", "Portion into containers"]),
                ),
            ],
            Extension::FamilyVersion => vec![(
                "family_version",
                json!({
                    "title": "Family meal name",
                    "modifications": "How the adult version differs",
                    "seasonings": ["salt", "black pepper"],
                    "additional_ingredients": ["garlic"],
                    "portion_multiplier": 3,
                    "cooking_adjustments": "Cook the family portion a few minutes longer",
                }),
            )],
        }
    }

    pub fn prompt_section(&self) -> &'static str {
        match self {
            Extension::Nutrition => NUTRITION_SECTION,
            Extension::BatchCooking => BATCH_COOKING_SECTION,
            Extension::FamilyVersion => FAMILY_VERSION_SECTION,
        }
    }
}

const NUTRIENTS: [&str; 10] = [
    "calories",
    "protein_grams",
    "carbs_grams",
    "fat_grams",
    "fiber_grams",
    "iron_mg",
    "calcium_mg",
    "vitamin_a_mcg",
    "vitamin_c_mg",
    "vitamin_d_mcg",
];

const NUTRITION_SECTION: &str = "## NUTRITION
Estimate nutrition for the baby's portion of every meal:
- Use non-negative numbers for calories and every nutrient
- Give the serving size as text (e.g. \"1/2 cup\")
- Add age_appropriate_notes when a nutrient matters at this age, otherwise null";

const BATCH_COOKING_SECTION: &str = "## BATCH COOKING MODE ENABLED
Design recipes optimized for meal prep:
- Create recipes that share base ingredients (e.g., same vegetable puree can be used in multiple meals)
- Include make-ahead steps that can be done on a \"prep day\" (weekend)
- Specify storage instructions (e.g., \"Fridge: 3 days\" or \"Freezer: 2 weeks\")
- Mark which recipes are freezable
- Include reheating instructions for each meal
- Group prep tasks by type (chopping, cooking, blending)";

const FAMILY_VERSION_SECTION: &str = "## FAMILY VERSION ENABLED
Adapt every meal so the whole family can eat it:
- Keep the baby's portion plain and set it aside before seasoning
- List the seasonings and extra ingredients added for adults
- Give a portion multiplier for scaling the recipe to the family
- Mention any cooking adjustments for the adult portion";

fn string_array(min_items: u64) -> Value {
    json!({
        "type": "array",
        "minItems": min_items,
        "items": { "type": "string", "minLength": 1 },
    })
}

pub fn active(features: GenerationFeatures) -> impl Iterator<Item = Extension> {
    Extension::ALL.into_iter().filter(move |e| e.enabled(features))
}

/// Keys that must not survive validation because their section is off.
pub fn disabled_keys(features: GenerationFeatures) -> Vec<&'static str> {
    Extension::ALL
        .into_iter()
        .filter(|e| !e.enabled(features))
        .flat_map(|e| e.keys().iter().copied())
        .collect()
}

/// Every key a meal must carry for these features, in prompt order.
pub fn required_meal_keys(features: GenerationFeatures) -> Vec<&'static str> {
    let mut keys = BASE_MEAL_FIELDS.to_vec();
    keys.extend(active(features).flat_map(|e| e.keys().iter().copied()));
    keys
}

pub fn meal_schema(features: GenerationFeatures) -> Value {
    let meal_types: Vec<&str> = MealType::ALL.iter().map(|m| m.as_str()).collect();
    let mut props = Map::new();
    props.insert("meal_type".into(), json!({ "type": "string", "enum": meal_types }));
    props.insert("title".into(), json!({ "type": "string", "minLength": 1 }));
    props.insert("summary".into(), json!({ "type": "string", "minLength": 1 }));
    props.insert(
        "ingredients".into(),
        json!({
            "type": "array",
            "minItems": 1,
            "items": {
                "type": "object",
                "required": ["name", "quantity", "unit"],
                "properties": {
                    "name": { "type": "string", "minLength": 1 },
                    "quantity": { "type": "string" },
                    "unit": { "type": "string" },
                    "category": { "type": "string" },
                },
            },
        }),
    );
    props.insert("instructions".into(), string_array(1));
    props.insert(
        "prep_time_minutes".into(),
        json!({ "type": "integer", "minimum": 0, "maximum": MAX_PREP_TIME_MINUTES }),
    );
    props.insert("texture_notes".into(), json!({ "type": ["string", "null"] }));
    props.insert(
        "new_food_introduced".into(),
        json!({ "type": ["string", "null"] }),
    );

    for ext in active(features) {
        for (key, schema) in ext.field_schemas() {
            props.insert(key.into(), schema);
        }
    }

    json!({
        "type": "object",
        "required": required_meal_keys(features),
        "properties": props,
    })
}

pub fn plan_schema(features: GenerationFeatures) -> Value {
    json!({
        "type": "object",
        "required": ["days"],
        "properties": {
            "days": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["day_index", "meals"],
                    "properties": {
                        "day_index": { "type": "integer", "minimum": 0, "maximum": MAX_DAYS - 1 },
                        "meals": {
                            "type": "array",
                            "minItems": 1,
                            "items": meal_schema(features),
                        },
                    },
                },
            },
            "tips": { "type": "array", "items": { "type": "string" } },
            "notes": { "type": "string" },
        },
    })
}

pub fn example_meal(meal_type: MealType, features: GenerationFeatures) -> Value {
    let mut meal = json!({
        "meal_type": meal_type.as_str(),
        "title": "Meal name",
        "summary": "Brief description of the meal",
        "ingredients": [
            { "name": "ingredient", "quantity": "2", "unit": "tablespoons", "category": "fruits" }
        ],
        "instructions": ["Step 1", "Step 2"],
        "prep_time_minutes": 10,
        "texture_notes": "Texture description for this meal",
        "new_food_introduced": null,
    });
    if let Some(obj) = meal.as_object_mut() {
        for ext in active(features) {
            for (key, value) in ext.example_fields() {
                obj.insert(key.into(), value);
            }
        }
    }
    meal
}

/// One example day covering every requested meal type.
pub fn example_plan(meals: &[MealType], features: GenerationFeatures) -> Value {
    let meals: Vec<Value> = meals.iter().map(|m| example_meal(*m, features)).collect();
    json!({
        "days": [{ "day_index": 0, "meals": meals }],
        "tips": ["Optional feeding tip"],
    })
}
