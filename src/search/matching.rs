//! Scores stored recipes against the ingredients on hand.

use crate::store::StoredRecipe;

use super::dto::RecipeMatch;

/// Share of a recipe's ingredients that must be on hand.
pub const MIN_MATCH_SCORE: f64 = 0.3;
pub const MAX_MATCHES: usize = 10;

/// Whether `ingredient` names one of the allergens, e.g. "peanut butter"
/// for "Peanut".
pub fn mentions_allergen(ingredient: &str, allergies: &[String]) -> bool {
    let ingredient = ingredient.to_lowercase();
    allergies
        .iter()
        .map(|a| a.trim().to_lowercase())
        .any(|a| !a.is_empty() && ingredient.contains(&a))
}

fn score(recipe: &StoredRecipe, available: &[String]) -> (Vec<String>, f64) {
    let matched: Vec<String> = recipe
        .ingredients
        .iter()
        .map(|i| i.name.trim().to_lowercase())
        .filter(|name| available.iter().any(|a| a.eq_ignore_ascii_case(name)))
        .collect();
    let score = if recipe.ingredients.is_empty() {
        0.0
    } else {
        matched.len() as f64 / recipe.ingredients.len() as f64
    };
    (matched, score)
}

/// Best matches first. Recipes touching an allergen never match, and ties
/// keep the store's newest-first order.
pub fn rank_recipes(
    recipes: Vec<StoredRecipe>,
    available: &[String],
    allergies: &[String],
) -> Vec<RecipeMatch> {
    let mut matches: Vec<RecipeMatch> = recipes
        .into_iter()
        .filter(|r| !r.ingredients.iter().any(|i| mentions_allergen(&i.name, allergies)))
        .filter_map(|r| {
            let (matched, score) = score(&r, available);
            (score > MIN_MATCH_SCORE).then(|| RecipeMatch {
                id: r.id,
                title: r.title,
                summary: r.summary,
                prep_time_minutes: r.prep_time_minutes,
                ingredients: r.ingredients.into_iter().map(|i| i.name).collect(),
                matched_ingredients: matched,
                match_score: score,
                meal_type: r.meal_type,
            })
        })
        .collect();
    matches.sort_by(|a, b| b.match_score.total_cmp(&a.match_score));
    matches.truncate(MAX_MATCHES);
    matches
}
