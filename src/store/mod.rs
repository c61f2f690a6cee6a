//! Storage collaborator for the pipeline.
//!
//! `PgStore` is the production backend. Writes that must be all-or-nothing
//! (a plan with its slots, recipes and quota charge; a webhook marker with
//! its account mutation) are single methods so each backend can run them as
//! one transaction.

#[cfg(test)]
pub mod memory;
mod postgres;
pub mod records;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, FoodHistoryEntry, Ingredient, Profile, RatedMeal, UnknownVariant};

pub use postgres::PgStore;
pub use records::*;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The conditional quota update matched no row.
    #[error("weekly plan limit reached")]
    QuotaExceeded,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid stored value: {0}")]
    InvalidValue(#[from] UnknownVariant),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_account(&self, user_id: Uuid) -> Result<Option<Account>, StoreError>;

    /// The subject, only if it belongs to `user_id`.
    async fn get_profile(&self, user_id: Uuid, subject_id: Uuid)
        -> Result<Option<Profile>, StoreError>;

    async fn food_history(&self, subject_id: Uuid) -> Result<Vec<FoodHistoryEntry>, StoreError>;

    /// Most recently rated meals first.
    async fn rated_meals(&self, subject_id: Uuid) -> Result<Vec<RatedMeal>, StoreError>;

    /// Writes plan, slots, recipes and (when given) the quota charge atomically.
    ///
    /// Returns `StoreError::QuotaExceeded` without writing anything when the
    /// charge does not fit the account's window.
    async fn commit_plan(
        &self,
        plan: NewPlan,
        charge: Option<QuotaCharge>,
    ) -> Result<Uuid, StoreError>;

    async fn list_plans(
        &self,
        user_id: Uuid,
        subject_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PlanSummary>, StoreError>;

    async fn get_plan(&self, user_id: Uuid, plan_id: Uuid)
        -> Result<Option<PlanDetails>, StoreError>;

    async fn get_meal(&self, user_id: Uuid, meal_id: Uuid) -> Result<Option<OwnedMeal>, StoreError>;

    async fn upsert_rating(&self, rating: NewRating) -> Result<MealRating, StoreError>;

    async fn get_rating(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        subject_id: Uuid,
    ) -> Result<Option<MealRating>, StoreError>;

    /// Every recipe ingredient of an owned plan, `None` when not owned.
    async fn plan_ingredients(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<Vec<Ingredient>>, StoreError>;

    async fn get_grocery_list(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<GroceryList>, StoreError>;

    /// `StoreError::Conflict` when the plan already has a list.
    async fn save_grocery_list(
        &self,
        plan_id: Uuid,
        items: Vec<GroceryItem>,
    ) -> Result<GroceryList, StoreError>;

    /// Records the event id and applies its action in one unit; a repeated id
    /// yields `EventOutcome::Duplicate` and changes nothing.
    async fn apply_billing_event(&self, event: &BillingEvent) -> Result<EventOutcome, StoreError>;

    /// Every recipe planned for the subject, newest plan first.
    async fn subject_recipes(&self, subject_id: Uuid) -> Result<Vec<StoredRecipe>, StoreError>;

    /// Creates the caller's link for a plan, or refreshes the expiry of the
    /// existing one and keeps its token.
    async fn save_share(&self, share: NewShare) -> Result<SavedShare, StoreError>;

    async fn find_share(&self, token: &str) -> Result<Option<PlanShare>, StoreError>;

    /// Counts one view and returns the new total.
    async fn record_share_view(&self, share_id: Uuid) -> Result<i32, StoreError>;

    /// The plan behind a share link. No ownership check.
    async fn shared_plan(&self, plan_id: Uuid) -> Result<Option<SharedPlan>, StoreError>;
}
