use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::response::GeneratedPlan;
use super::schema::GenerationFeatures;
use crate::models::{FeedingGoal, MealType};

/// A generation request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub subject_id: Uuid,
    pub days: u8,
    pub meals_per_day: Vec<MealType>,
    pub goal: FeedingGoal,
    pub include_new_foods: bool,
    pub batch_cooking: bool,
    pub family_version: bool,
}

impl GenerateRequest {
    pub fn features(&self) -> GenerationFeatures {
        GenerationFeatures {
            batch_cooking: self.batch_cooking,
            family_version: self.family_version,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub plan_id: Uuid,
    pub data: GeneratedPlan,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPlansQuery {
    #[serde(alias = "babyId")]
    pub subject_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}
