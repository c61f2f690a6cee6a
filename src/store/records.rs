use serde::{Deserialize, Serialize, Serializer};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::billing::BillingAction;
use crate::models::{FeedingGoal, Ingredient, MealType, Profile, TasteFeedback};
use crate::plans::response::{BatchInfo, FamilyVersion, Nutrition};

pub(crate) fn serialize_date<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(date)
}

// ---- writes ----

#[derive(Debug, Clone, PartialEq)]
pub struct NewRecipe {
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    pub prep_time_minutes: i32,
    pub texture_notes: Option<String>,
    pub choking_hazard_notes: Option<String>,
    pub batch_info: Option<BatchInfo>,
    pub family_version: Option<FamilyVersion>,
    pub nutrition: Option<Nutrition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMealSlot {
    pub day_index: i32,
    pub meal_type: MealType,
    pub title: String,
    pub summary: String,
    pub recipe: NewRecipe,
}

/// A validated plan ready to be written as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlan {
    pub subject_id: Uuid,
    pub start_date: Date,
    pub end_date: Date,
    pub goal: FeedingGoal,
    pub days: i32,
    pub slots: Vec<NewMealSlot>,
}

/// Free-tier usage to charge inside the plan transaction.
#[derive(Debug, Clone, Copy)]
pub struct QuotaCharge {
    pub user_id: Uuid,
    pub limit: u32,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub meal_id: Uuid,
    pub subject_id: Uuid,
    pub user_id: Uuid,
    pub rating: Option<u8>,
    pub taste_feedback: Option<TasteFeedback>,
    pub would_make_again: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BillingEvent {
    pub id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub action: BillingAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied { accounts_updated: u64 },
    Duplicate,
}

// ---- reads ----

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub id: Uuid,
    pub subject_id: Uuid,
    #[serde(serialize_with = "serialize_date")]
    pub start_date: Date,
    #[serde(serialize_with = "serialize_date")]
    pub end_date: Date,
    pub goal: String,
    pub days: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetails {
    pub ingredients: serde_json::Value,
    pub instructions: serde_json::Value,
    pub prep_time_minutes: i32,
    pub texture_notes: Option<String>,
    pub choking_hazard_notes: Option<String>,
    pub batch_info: Option<serde_json::Value>,
    pub family_version: Option<serde_json::Value>,
    pub nutrition: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealDetails {
    pub id: Uuid,
    pub day_index: i32,
    pub meal_type: String,
    pub title: String,
    pub summary: String,
    pub recipe: Option<RecipeDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanDetails {
    #[serde(flatten)]
    pub plan: PlanSummary,
    pub meals: Vec<MealDetails>,
}

/// A meal together with the subject it was planned for.
#[derive(Debug, Clone)]
pub struct OwnedMeal {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub meal_type: String,
    pub title: String,
    pub summary: String,
    pub ingredients: Vec<Ingredient>,
    pub subject: Profile,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealRating {
    pub id: Uuid,
    pub meal_id: Uuid,
    pub subject_id: Uuid,
    pub rating: Option<i32>,
    pub taste_feedback: Option<String>,
    pub would_make_again: Option<bool>,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroceryItem {
    pub name: String,
    pub quantity: String,
    pub unit: String,
    pub category: String,
    #[serde(default)]
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroceryList {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub items: Vec<GroceryItem>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A planned recipe as quick search sees it.
#[derive(Debug, Clone)]
pub struct StoredRecipe {
    pub id: Uuid,
    pub meal_type: String,
    pub title: String,
    pub summary: String,
    pub prep_time_minutes: i32,
    pub ingredients: Vec<Ingredient>,
}

// ---- share links ----

#[derive(Debug, Clone)]
pub struct NewShare {
    pub plan_id: Uuid,
    pub created_by: Uuid,
    pub token: String,
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanShare {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub share_token: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    pub view_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PlanShare {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

#[derive(Debug, Clone)]
pub struct SavedShare {
    pub share: PlanShare,
    /// False when an existing link was refreshed.
    pub created: bool,
}

/// A plan read through a share link, with the few subject details it shows.
#[derive(Debug, Clone)]
pub struct SharedPlan {
    pub plan: PlanDetails,
    pub subject_name: String,
    pub birthdate: Date,
}
