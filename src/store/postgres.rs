use async_trait::async_trait;
use sqlx::{types::Json, FromRow, PgPool, Postgres, Transaction};
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    BillingEvent, EventOutcome, GroceryItem, GroceryList, MealDetails, MealRating, NewMealSlot,
    NewPlan, NewRating, NewShare, OwnedMeal, PlanDetails, PlanShare, PlanSummary, QuotaCharge,
    RecipeDetails, SavedShare, SharedPlan, Store, StoreError, StoredRecipe,
};
use crate::billing::BillingAction;
use crate::models::{
    Account, FoodHistoryEntry, Ingredient, Profile, RatedMeal, SubscriptionPlan,
    SubscriptionStatus, TasteFeedback, UsageWindow,
};
use crate::plans::quota::WINDOW;

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Meals of a plan with their recipes, by day then meal order.
    async fn plan_meals(&self, plan_id: Uuid) -> Result<Vec<MealDetails>, StoreError> {
        let meals = sqlx::query_as::<_, MealRow>(
            r#"
            SELECT m.id, m.day_index, m.meal_type, m.title, m.summary,
                   r.ingredients, r.instructions, r.prep_time_minutes, r.texture_notes,
                   r.choking_hazard_notes, r.batch_info, r.family_version, r.nutrition
              FROM meals m
              LEFT JOIN recipes r ON r.meal_id = m.id
             WHERE m.plan_id = $1
             ORDER BY m.day_index ASC,
                      CASE m.meal_type
                          WHEN 'breakfast' THEN 0
                          WHEN 'lunch' THEN 1
                          WHEN 'dinner' THEN 2
                          ELSE 3
                      END ASC
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.db)
        .await?;
        Ok(meals.into_iter().map(MealDetails::from).collect())
    }
}

// ---- row types ----

#[derive(FromRow)]
struct AccountRow {
    id: Uuid,
    subscription_plan: String,
    subscription_status: Option<String>,
    plans_generated_this_week: i32,
    week_reset_date: OffsetDateTime,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            plan: row.subscription_plan.parse()?,
            status: row
                .subscription_status
                .as_deref()
                .map(str::parse::<SubscriptionStatus>)
                .transpose()?,
            usage: UsageWindow {
                used: row.plans_generated_this_week.max(0) as u32,
                reset_at: row.week_reset_date,
            },
        })
    }
}

#[derive(FromRow)]
struct ProfileRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    birthdate: Date,
    allergies: Vec<String>,
    feeding_goal: String,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        Ok(Profile {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            birthdate: row.birthdate,
            allergies: row.allergies,
            feeding_goal: row.feeding_goal.parse()?,
        })
    }
}

#[derive(FromRow)]
struct PlanRow {
    id: Uuid,
    baby_id: Uuid,
    start_date: Date,
    end_date: Date,
    goal: String,
    days: i32,
    created_at: OffsetDateTime,
}

impl From<PlanRow> for PlanSummary {
    fn from(row: PlanRow) -> Self {
        PlanSummary {
            id: row.id,
            subject_id: row.baby_id,
            start_date: row.start_date,
            end_date: row.end_date,
            goal: row.goal,
            days: row.days,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct MealRow {
    id: Uuid,
    day_index: i32,
    meal_type: String,
    title: String,
    summary: String,
    ingredients: Option<serde_json::Value>,
    instructions: Option<serde_json::Value>,
    prep_time_minutes: Option<i32>,
    texture_notes: Option<String>,
    choking_hazard_notes: Option<String>,
    batch_info: Option<serde_json::Value>,
    family_version: Option<serde_json::Value>,
    nutrition: Option<serde_json::Value>,
}

impl From<MealRow> for MealDetails {
    fn from(row: MealRow) -> Self {
        let recipe = match (row.ingredients, row.instructions) {
            (Some(ingredients), Some(instructions)) => Some(RecipeDetails {
                ingredients,
                instructions,
                prep_time_minutes: row.prep_time_minutes.unwrap_or(15),
                texture_notes: row.texture_notes,
                choking_hazard_notes: row.choking_hazard_notes,
                batch_info: row.batch_info,
                family_version: row.family_version,
                nutrition: row.nutrition,
            }),
            _ => None,
        };
        MealDetails {
            id: row.id,
            day_index: row.day_index,
            meal_type: row.meal_type,
            title: row.title,
            summary: row.summary,
            recipe,
        }
    }
}

#[derive(FromRow)]
struct OwnedMealRow {
    id: Uuid,
    plan_id: Uuid,
    meal_type: String,
    title: String,
    summary: String,
    ingredients: Option<Json<Vec<Ingredient>>>,
    baby_id: Uuid,
    user_id: Uuid,
    name: String,
    birthdate: Date,
    allergies: Vec<String>,
    feeding_goal: String,
}

#[derive(FromRow)]
struct RatingRow {
    id: Uuid,
    meal_id: Uuid,
    baby_id: Uuid,
    rating: Option<i32>,
    taste_feedback: Option<String>,
    would_make_again: Option<bool>,
    notes: Option<String>,
    updated_at: OffsetDateTime,
}

impl From<RatingRow> for MealRating {
    fn from(row: RatingRow) -> Self {
        MealRating {
            id: row.id,
            meal_id: row.meal_id,
            subject_id: row.baby_id,
            rating: row.rating,
            taste_feedback: row.taste_feedback,
            would_make_again: row.would_make_again,
            notes: row.notes,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct GroceryRow {
    id: Uuid,
    plan_id: Uuid,
    items: Json<Vec<GroceryItem>>,
    created_at: OffsetDateTime,
}

impl From<GroceryRow> for GroceryList {
    fn from(row: GroceryRow) -> Self {
        GroceryList {
            id: row.id,
            plan_id: row.plan_id,
            items: row.items.0,
            created_at: row.created_at,
        }
    }
}

/// Unknown feedback is dropped from the row rather than failing every later
/// generation for the subject.
fn rated_meal(title: String, rating: Option<i32>, feedback: Option<String>) -> RatedMeal {
    let taste_feedback = feedback.as_deref().and_then(|f| match f.parse::<TasteFeedback>() {
        Ok(t) => Some(t),
        Err(e) => {
            warn!(error = %e, meal = %title, "ignoring stored taste feedback");
            None
        }
    });
    RatedMeal {
        rating: rating.and_then(|r| u8::try_from(r).ok()),
        taste_feedback,
        title,
    }
}

#[derive(FromRow)]
struct RecipeRow {
    id: Uuid,
    meal_type: String,
    title: String,
    summary: String,
    prep_time_minutes: i32,
    ingredients: Json<Vec<Ingredient>>,
}

impl From<RecipeRow> for StoredRecipe {
    fn from(row: RecipeRow) -> Self {
        StoredRecipe {
            id: row.id,
            meal_type: row.meal_type,
            title: row.title,
            summary: row.summary,
            prep_time_minutes: row.prep_time_minutes,
            ingredients: row.ingredients.0,
        }
    }
}

#[derive(FromRow)]
struct ShareRow {
    id: Uuid,
    plan_id: Uuid,
    share_token: String,
    expires_at: Option<OffsetDateTime>,
    view_count: i32,
    created_at: OffsetDateTime,
}

impl From<ShareRow> for PlanShare {
    fn from(row: ShareRow) -> Self {
        PlanShare {
            id: row.id,
            plan_id: row.plan_id,
            share_token: row.share_token,
            expires_at: row.expires_at,
            view_count: row.view_count,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct SavedShareRow {
    #[sqlx(flatten)]
    share: ShareRow,
    created: bool,
}

#[derive(FromRow)]
struct SharedPlanRow {
    #[sqlx(flatten)]
    plan: PlanRow,
    name: String,
    birthdate: Date,
}

// ---- transactional helpers ----

/// Conditional increment: only matches while the window still has room, or
/// when it has lapsed (then it restarts at 1 anchored at `now`).
async fn charge_quota_tx(
    tx: &mut Transaction<'_, Postgres>,
    charge: &QuotaCharge,
) -> Result<bool, StoreError> {
    let lapsed_before = charge.now - WINDOW;
    let res = sqlx::query(
        r#"
        UPDATE users
           SET plans_generated_this_week = CASE
                   WHEN week_reset_date <= $2 THEN 1
                   ELSE plans_generated_this_week + 1
               END,
               week_reset_date = CASE
                   WHEN week_reset_date <= $2 THEN $3
                   ELSE week_reset_date
               END
         WHERE id = $1
           AND (week_reset_date <= $2 OR plans_generated_this_week < $4)
        "#,
    )
    .bind(charge.user_id)
    .bind(lapsed_before)
    .bind(charge.now)
    .bind(charge.limit as i32)
    .execute(&mut **tx)
    .await?;
    Ok(res.rows_affected() == 1)
}

async fn insert_slot_tx(
    tx: &mut Transaction<'_, Postgres>,
    plan_id: Uuid,
    slot: &NewMealSlot,
) -> Result<(), StoreError> {
    let meal_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO meals (plan_id, day_index, meal_type, title, summary)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(plan_id)
    .bind(slot.day_index)
    .bind(slot.meal_type.as_str())
    .bind(&slot.title)
    .bind(&slot.summary)
    .fetch_one(&mut **tx)
    .await?;

    let recipe = &slot.recipe;
    sqlx::query(
        r#"
        INSERT INTO recipes (meal_id, ingredients, instructions, prep_time_minutes,
                             texture_notes, choking_hazard_notes, batch_info,
                             family_version, nutrition)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(meal_id)
    .bind(Json(&recipe.ingredients))
    .bind(Json(&recipe.instructions))
    .bind(recipe.prep_time_minutes)
    .bind(recipe.texture_notes.as_deref())
    .bind(recipe.choking_hazard_notes.as_deref())
    .bind(recipe.batch_info.as_ref().map(Json))
    .bind(recipe.family_version.as_ref().map(Json))
    .bind(recipe.nutrition.as_ref().map(Json))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn apply_action_tx(
    tx: &mut Transaction<'_, Postgres>,
    action: &BillingAction,
) -> Result<u64, StoreError> {
    let res = match action {
        BillingAction::Activate {
            user_id,
            plan,
            customer_id,
        } => {
            sqlx::query(
                r#"
                UPDATE users
                   SET subscription_plan = $2,
                       subscription_status = $3,
                       stripe_customer_id = COALESCE($4, stripe_customer_id)
                 WHERE id = $1
                "#,
            )
            .bind(user_id)
            .bind(plan.as_str())
            .bind(SubscriptionStatus::Active.as_str())
            .bind(customer_id.as_deref())
            .execute(&mut **tx)
            .await?
        }
        BillingAction::SyncStatus {
            customer_id,
            status,
        } => {
            sqlx::query("UPDATE users SET subscription_status = $2 WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .bind(status.as_str())
                .execute(&mut **tx)
                .await?
        }
        BillingAction::Downgrade { customer_id } => {
            sqlx::query(
                r#"
                UPDATE users
                   SET subscription_plan = $2,
                       subscription_status = NULL
                 WHERE stripe_customer_id = $1
                "#,
            )
            .bind(customer_id)
            .bind(SubscriptionPlan::Free.as_str())
            .execute(&mut **tx)
            .await?
        }
        BillingAction::FlagPastDue { customer_id } => {
            sqlx::query("UPDATE users SET subscription_status = $2 WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .bind(SubscriptionStatus::PastDue.as_str())
                .execute(&mut **tx)
                .await?
        }
        BillingAction::Ignore => return Ok(0),
    };
    Ok(res.rows_affected())
}

#[async_trait]
impl Store for PgStore {
    async fn get_account(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, subscription_plan, subscription_status,
                   plans_generated_this_week, week_reset_date
              FROM users
             WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Account::try_from).transpose()
    }

    async fn get_profile(
        &self,
        user_id: Uuid,
        subject_id: Uuid,
    ) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT id, user_id, name, birthdate, allergies, feeding_goal
              FROM babies
             WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(subject_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Profile::try_from).transpose()
    }

    async fn food_history(&self, subject_id: Uuid) -> Result<Vec<FoodHistoryEntry>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT f.name, bf.status
              FROM baby_foods bf
              JOIN foods f ON f.id = bf.food_id
             WHERE bf.baby_id = $1
             ORDER BY bf.date_introduced ASC, f.name ASC
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(food, status)| {
                Ok::<_, StoreError>(FoodHistoryEntry {
                    food,
                    outcome: status.parse()?,
                })
            })
            .collect()
    }

    async fn rated_meals(&self, subject_id: Uuid) -> Result<Vec<RatedMeal>, StoreError> {
        let rows = sqlx::query_as::<_, (String, Option<i32>, Option<String>)>(
            r#"
            SELECT m.title, r.rating, r.taste_feedback
              FROM meal_ratings r
              JOIN meals m ON m.id = r.meal_id
             WHERE r.baby_id = $1
             ORDER BY r.updated_at DESC
             LIMIT 50
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(title, rating, feedback)| rated_meal(title, rating, feedback))
            .collect())
    }

    async fn commit_plan(
        &self,
        plan: NewPlan,
        charge: Option<QuotaCharge>,
    ) -> Result<Uuid, StoreError> {
        let mut tx = self.db.begin().await?;

        // Charge first: the row lock serializes concurrent generations for the
        // same account until this transaction ends.
        if let Some(charge) = &charge {
            if !charge_quota_tx(&mut tx, charge).await? {
                tx.rollback().await?;
                return Err(StoreError::QuotaExceeded);
            }
        }

        let plan_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO meal_plans (baby_id, start_date, end_date, goal, days)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(plan.subject_id)
        .bind(plan.start_date)
        .bind(plan.end_date)
        .bind(plan.goal.as_str())
        .bind(plan.days)
        .fetch_one(&mut *tx)
        .await?;

        for slot in &plan.slots {
            insert_slot_tx(&mut tx, plan_id, slot).await?;
        }

        tx.commit().await?;
        debug!(%plan_id, slots = plan.slots.len(), charged = charge.is_some(), "plan committed");
        Ok(plan_id)
    }

    async fn list_plans(
        &self,
        user_id: Uuid,
        subject_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PlanSummary>, StoreError> {
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT p.id, p.baby_id, p.start_date, p.end_date, p.goal, p.days, p.created_at
              FROM meal_plans p
              JOIN babies b ON b.id = p.baby_id
             WHERE b.user_id = $1
               AND ($2::uuid IS NULL OR p.baby_id = $2)
             ORDER BY p.created_at DESC
             LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(subject_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(PlanSummary::from).collect())
    }

    async fn get_plan(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<PlanDetails>, StoreError> {
        let Some(plan) = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT p.id, p.baby_id, p.start_date, p.end_date, p.goal, p.days, p.created_at
              FROM meal_plans p
              JOIN babies b ON b.id = p.baby_id
             WHERE p.id = $1 AND b.user_id = $2
            "#,
        )
        .bind(plan_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(PlanDetails {
            plan: plan.into(),
            meals: self.plan_meals(plan_id).await?,
        }))
    }

    async fn get_meal(&self, user_id: Uuid, meal_id: Uuid) -> Result<Option<OwnedMeal>, StoreError> {
        let row = sqlx::query_as::<_, OwnedMealRow>(
            r#"
            SELECT m.id, m.plan_id, m.meal_type, m.title, m.summary, r.ingredients,
                   b.id AS baby_id, b.user_id, b.name, b.birthdate, b.allergies, b.feeding_goal
              FROM meals m
              JOIN meal_plans p ON p.id = m.plan_id
              JOIN babies b ON b.id = p.baby_id
              LEFT JOIN recipes r ON r.meal_id = m.id
             WHERE m.id = $1 AND b.user_id = $2
            "#,
        )
        .bind(meal_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| {
            let subject = ProfileRow {
                id: row.baby_id,
                user_id: row.user_id,
                name: row.name,
                birthdate: row.birthdate,
                allergies: row.allergies,
                feeding_goal: row.feeding_goal,
            };
            Ok::<_, StoreError>(OwnedMeal {
                id: row.id,
                plan_id: row.plan_id,
                meal_type: row.meal_type,
                title: row.title,
                summary: row.summary,
                ingredients: row.ingredients.map(|j| j.0).unwrap_or_default(),
                subject: subject.try_into()?,
            })
        })
        .transpose()
    }

    async fn upsert_rating(&self, rating: NewRating) -> Result<MealRating, StoreError> {
        let row = sqlx::query_as::<_, RatingRow>(
            r#"
            INSERT INTO meal_ratings (meal_id, baby_id, user_id, rating, taste_feedback,
                                      would_make_again, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (meal_id, baby_id) DO UPDATE
               SET rating = EXCLUDED.rating,
                   taste_feedback = EXCLUDED.taste_feedback,
                   would_make_again = EXCLUDED.would_make_again,
                   notes = EXCLUDED.notes,
                   updated_at = now()
            RETURNING id, meal_id, baby_id, rating, taste_feedback, would_make_again,
                      notes, updated_at
            "#,
        )
        .bind(rating.meal_id)
        .bind(rating.subject_id)
        .bind(rating.user_id)
        .bind(rating.rating.map(i32::from))
        .bind(rating.taste_feedback.map(|t| t.as_str()))
        .bind(rating.would_make_again)
        .bind(rating.notes.as_deref())
        .fetch_one(&self.db)
        .await?;
        Ok(row.into())
    }

    async fn get_rating(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        subject_id: Uuid,
    ) -> Result<Option<MealRating>, StoreError> {
        let row = sqlx::query_as::<_, RatingRow>(
            r#"
            SELECT id, meal_id, baby_id, rating, taste_feedback, would_make_again,
                   notes, updated_at
              FROM meal_ratings
             WHERE meal_id = $1 AND baby_id = $2 AND user_id = $3
            "#,
        )
        .bind(meal_id)
        .bind(subject_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(MealRating::from))
    }

    async fn plan_ingredients(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<Vec<Ingredient>>, StoreError> {
        let owned: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT p.id
              FROM meal_plans p
              JOIN babies b ON b.id = p.baby_id
             WHERE p.id = $1 AND b.user_id = $2
            "#,
        )
        .bind(plan_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        if owned.is_none() {
            return Ok(None);
        }

        let rows: Vec<Json<Vec<Ingredient>>> = sqlx::query_scalar(
            r#"
            SELECT r.ingredients
              FROM recipes r
              JOIN meals m ON m.id = r.meal_id
             WHERE m.plan_id = $1
             ORDER BY m.day_index ASC
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.db)
        .await?;
        Ok(Some(rows.into_iter().flat_map(|j| j.0).collect()))
    }

    async fn get_grocery_list(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<GroceryList>, StoreError> {
        let row = sqlx::query_as::<_, GroceryRow>(
            r#"
            SELECT g.id, g.plan_id, g.items, g.created_at
              FROM grocery_lists g
              JOIN meal_plans p ON p.id = g.plan_id
              JOIN babies b ON b.id = p.baby_id
             WHERE g.plan_id = $1 AND b.user_id = $2
            "#,
        )
        .bind(plan_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(GroceryList::from))
    }

    async fn save_grocery_list(
        &self,
        plan_id: Uuid,
        items: Vec<GroceryItem>,
    ) -> Result<GroceryList, StoreError> {
        let row = sqlx::query_as::<_, GroceryRow>(
            r#"
            INSERT INTO grocery_lists (plan_id, items)
            VALUES ($1, $2)
            ON CONFLICT (plan_id) DO NOTHING
            RETURNING id, plan_id, items, created_at
            "#,
        )
        .bind(plan_id)
        .bind(Json(&items))
        .fetch_optional(&self.db)
        .await?;
        row.map(GroceryList::from)
            .ok_or_else(|| StoreError::Conflict("Grocery list already exists for this plan".into()))
    }

    async fn apply_billing_event(&self, event: &BillingEvent) -> Result<EventOutcome, StoreError> {
        let mut tx = self.db.begin().await?;

        // A concurrent delivery of the same id blocks here on the unique index
        // until the first transaction finishes.
        let inserted = sqlx::query(
            r#"
            INSERT INTO stripe_events (event_id, event_type, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.id)
        .bind(&event.event_type)
        .bind(Json(&event.payload))
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(EventOutcome::Duplicate);
        }

        let accounts_updated = apply_action_tx(&mut tx, &event.action).await?;
        tx.commit().await?;
        Ok(EventOutcome::Applied { accounts_updated })
    }

    async fn subject_recipes(&self, subject_id: Uuid) -> Result<Vec<StoredRecipe>, StoreError> {
        let rows = sqlx::query_as::<_, RecipeRow>(
            r#"
            SELECT r.id, m.meal_type, m.title, m.summary, r.prep_time_minutes, r.ingredients
              FROM recipes r
              JOIN meals m ON m.id = r.meal_id
              JOIN meal_plans p ON p.id = m.plan_id
             WHERE p.baby_id = $1
             ORDER BY p.created_at DESC, m.day_index ASC
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(StoredRecipe::from).collect())
    }

    async fn save_share(&self, share: NewShare) -> Result<SavedShare, StoreError> {
        // xmax is zero only on a freshly inserted row version
        let row = sqlx::query_as::<_, SavedShareRow>(
            r#"
            INSERT INTO shared_meal_plans (plan_id, created_by, share_token, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (plan_id, created_by) DO UPDATE
               SET expires_at = EXCLUDED.expires_at
            RETURNING id, plan_id, share_token, expires_at, view_count, created_at,
                      (xmax = 0) AS created
            "#,
        )
        .bind(share.plan_id)
        .bind(share.created_by)
        .bind(&share.token)
        .bind(share.expires_at)
        .fetch_one(&self.db)
        .await?;
        Ok(SavedShare {
            share: row.share.into(),
            created: row.created,
        })
    }

    async fn find_share(&self, token: &str) -> Result<Option<PlanShare>, StoreError> {
        let row = sqlx::query_as::<_, ShareRow>(
            r#"
            SELECT id, plan_id, share_token, expires_at, view_count, created_at
              FROM shared_meal_plans
             WHERE share_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(PlanShare::from))
    }

    async fn record_share_view(&self, share_id: Uuid) -> Result<i32, StoreError> {
        let count: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE shared_meal_plans
               SET view_count = view_count + 1
             WHERE id = $1
            RETURNING view_count
            "#,
        )
        .bind(share_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(count.unwrap_or_default())
    }

    async fn shared_plan(&self, plan_id: Uuid) -> Result<Option<SharedPlan>, StoreError> {
        let Some(row) = sqlx::query_as::<_, SharedPlanRow>(
            r#"
            SELECT p.id, p.baby_id, p.start_date, p.end_date, p.goal, p.days, p.created_at,
                   b.name, b.birthdate
              FROM meal_plans p
              JOIN babies b ON b.id = p.baby_id
             WHERE p.id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.db)
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(SharedPlan {
            plan: PlanDetails {
                plan: row.plan.into(),
                meals: self.plan_meals(plan_id).await?,
            },
            subject_name: row.name,
            birthdate: row.birthdate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedingGoal, MealType};
    use crate::plans::quota::apply_charge;
    use crate::store::NewRecipe;
    use sqlx::postgres::PgPoolOptions;
    use time::Duration;

    /// Database tests run only against a live Postgres named by DATABASE_URL.
    async fn test_store() -> Option<PgStore> {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping database test: DATABASE_URL not set");
                return None;
            }
        };
        let db = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .expect("connect to test database");
        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .expect("run migrations");
        Some(PgStore::new(db))
    }

    /// A fresh account with one subject, its window set to `used` plans
    /// since `reset_at`.
    async fn seed(store: &PgStore, used: i32, reset_at: OffsetDateTime) -> (Uuid, Uuid) {
        let user_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (email, plans_generated_this_week, week_reset_date)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(format!("{}@babybites.test", Uuid::new_v4()))
        .bind(used)
        .bind(reset_at)
        .fetch_one(&store.db)
        .await
        .unwrap();
        let subject_id: Uuid = sqlx::query_scalar(
            "INSERT INTO babies (user_id, name, birthdate) VALUES ($1, 'Mila', '2025-03-01') RETURNING id",
        )
        .bind(user_id)
        .fetch_one(&store.db)
        .await
        .unwrap();
        (user_id, subject_id)
    }

    fn plan(subject_id: Uuid, slots: &[MealType]) -> NewPlan {
        let today = OffsetDateTime::now_utc().date();
        NewPlan {
            subject_id,
            start_date: today,
            end_date: today,
            goal: FeedingGoal::BalancedNutrition,
            days: 1,
            slots: slots
                .iter()
                .map(|meal_type| NewMealSlot {
                    day_index: 0,
                    meal_type: *meal_type,
                    title: "Pear mash".into(),
                    summary: "Smooth".into(),
                    recipe: NewRecipe {
                        ingredients: vec![Ingredient {
                            name: "pear".into(),
                            quantity: "1".into(),
                            unit: "whole".into(),
                            category: None,
                        }],
                        instructions: vec!["Steam".into(), "Mash".into()],
                        prep_time_minutes: 10,
                        texture_notes: None,
                        choking_hazard_notes: None,
                        batch_info: None,
                        family_version: None,
                        nutrition: None,
                    },
                })
                .collect(),
        }
    }

    async fn plan_rows(store: &PgStore, subject_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM meal_plans WHERE baby_id = $1")
            .bind(subject_id)
            .fetch_one(&store.db)
            .await
            .unwrap()
    }

    fn token() -> String {
        Uuid::new_v4().simple().to_string()[..12].to_string()
    }

    async fn used(store: &PgStore, user_id: Uuid) -> u32 {
        store.get_account(user_id).await.unwrap().unwrap().usage.used
    }

    #[test]
    fn unreadable_taste_feedback_is_skipped() {
        let meal = rated_meal("Pear mash".into(), Some(4), Some("meh".into()));
        assert_eq!(meal.taste_feedback, None);
        assert_eq!(meal.rating, Some(4));

        let meal = rated_meal("Pear mash".into(), Some(-1), Some("loved".into()));
        assert_eq!(meal.taste_feedback, Some(TasteFeedback::Loved));
        assert_eq!(meal.rating, None);
    }

    #[tokio::test]
    async fn charge_at_the_limit_writes_nothing() {
        let Some(store) = test_store().await else { return };
        let now = OffsetDateTime::now_utc();
        let (user_id, subject_id) = seed(&store, 1, now - Duration::days(1)).await;

        let err = store
            .commit_plan(
                plan(subject_id, &[MealType::Lunch]),
                Some(QuotaCharge { user_id, limit: 1, now }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded));
        assert_eq!(plan_rows(&store, subject_id).await, 0);
        assert_eq!(used(&store, user_id).await, 1);
    }

    #[tokio::test]
    async fn lapsed_window_restarts_at_one() {
        let Some(store) = test_store().await else { return };
        let now = OffsetDateTime::now_utc();
        let (user_id, subject_id) = seed(&store, 1, now - Duration::days(8)).await;

        store
            .commit_plan(
                plan(subject_id, &[MealType::Lunch]),
                Some(QuotaCharge { user_id, limit: 1, now }),
            )
            .await
            .unwrap();
        let account = store.get_account(user_id).await.unwrap().unwrap();
        assert_eq!(account.usage.used, 1);
        assert_eq!(account.usage.reset_at.unix_timestamp(), now.unix_timestamp());
        assert_eq!(plan_rows(&store, subject_id).await, 1);
    }

    #[tokio::test]
    async fn conditional_update_agrees_with_window_rule() {
        let Some(store) = test_store().await else { return };
        // whole seconds, so the stored timestamps compare exactly
        let now = OffsetDateTime::now_utc().replace_nanosecond(0).unwrap();
        let cases = [
            (0, 1, 1),
            (1, 1, 1),
            (2, 1, 3),
            (3, 1, 3),
            (5, 7, 1),
            (5, 6, 1),
            (0, 30, 2),
        ];
        for (used_before, days_ago, limit) in cases {
            let reset_at = now - Duration::days(days_ago);
            let (user_id, subject_id) = seed(&store, used_before, reset_at).await;
            let expected = apply_charge(
                crate::models::UsageWindow {
                    used: used_before as u32,
                    reset_at,
                },
                limit,
                now,
            );

            let result = store
                .commit_plan(
                    plan(subject_id, &[MealType::Dinner]),
                    Some(QuotaCharge { user_id, limit, now }),
                )
                .await;
            match expected {
                Some(window) => {
                    assert!(result.is_ok(), "case {:?}", (used_before, days_ago, limit));
                    assert_eq!(used(&store, user_id).await, window.used);
                }
                None => {
                    assert!(matches!(result, Err(StoreError::QuotaExceeded)));
                    assert_eq!(used(&store, user_id).await, used_before as u32);
                }
            }
        }
    }

    #[tokio::test]
    async fn failed_slot_insert_undoes_the_charge() {
        let Some(store) = test_store().await else { return };
        let now = OffsetDateTime::now_utc();
        let (user_id, subject_id) = seed(&store, 0, now).await;

        // two slots for the same day and meal break the unique index
        let result = store
            .commit_plan(
                plan(subject_id, &[MealType::Lunch, MealType::Lunch]),
                Some(QuotaCharge { user_id, limit: 1, now }),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Database(_))));
        assert_eq!(plan_rows(&store, subject_id).await, 0);
        assert_eq!(used(&store, user_id).await, 0);
    }

    #[tokio::test]
    async fn concurrent_commits_admit_one() {
        let Some(store) = test_store().await else { return };
        let now = OffsetDateTime::now_utc();
        let (user_id, subject_id) = seed(&store, 0, now).await;
        let charge = QuotaCharge { user_id, limit: 1, now };

        let (first, second) = (
            store.commit_plan(plan(subject_id, &[MealType::Lunch]), Some(charge)),
            store.commit_plan(plan(subject_id, &[MealType::Dinner]), Some(charge)),
        );
        let (a, b) = tokio::join!(first, second);
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(plan_rows(&store, subject_id).await, 1);
        assert_eq!(used(&store, user_id).await, 1);
    }

    #[tokio::test]
    async fn redelivered_event_is_not_applied_twice() {
        let Some(store) = test_store().await else { return };
        let (user_id, _) = seed(&store, 0, OffsetDateTime::now_utc()).await;
        let event = BillingEvent {
            id: format!("evt_{}", Uuid::new_v4().simple()),
            event_type: "checkout.session.completed".into(),
            payload: serde_json::json!({}),
            action: BillingAction::Activate {
                user_id,
                plan: SubscriptionPlan::ProMonthly,
                customer_id: Some(format!("cus_{}", Uuid::new_v4().simple())),
            },
        };

        let first = store.apply_billing_event(&event).await.unwrap();
        assert_eq!(first, EventOutcome::Applied { accounts_updated: 1 });

        sqlx::query("UPDATE users SET subscription_plan = 'free' WHERE id = $1")
            .bind(user_id)
            .execute(&store.db)
            .await
            .unwrap();

        let again = store.apply_billing_event(&event).await.unwrap();
        assert_eq!(again, EventOutcome::Duplicate);
        let account = store.get_account(user_id).await.unwrap().unwrap();
        assert_eq!(account.plan, SubscriptionPlan::Free);

        let markers: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM stripe_events WHERE event_id = $1")
                .bind(&event.id)
                .fetch_one(&store.db)
                .await
                .unwrap();
        assert_eq!(markers, 1);
    }

    #[tokio::test]
    async fn share_upsert_keeps_token_and_counts_views() {
        let Some(store) = test_store().await else { return };
        let (user_id, subject_id) = seed(&store, 0, OffsetDateTime::now_utc()).await;
        let plan_id = store
            .commit_plan(plan(subject_id, &[MealType::Lunch]), None)
            .await
            .unwrap();
        let first_token = token();

        let created = store
            .save_share(NewShare {
                plan_id,
                created_by: user_id,
                token: first_token.clone(),
                expires_at: None,
            })
            .await
            .unwrap();
        assert!(created.created);
        let refreshed = store
            .save_share(NewShare {
                plan_id,
                created_by: user_id,
                token: token(),
                expires_at: Some(OffsetDateTime::now_utc() + Duration::days(1)),
            })
            .await
            .unwrap();
        assert!(!refreshed.created);
        assert_eq!(refreshed.share.share_token, first_token);
        assert!(refreshed.share.expires_at.is_some());

        assert_eq!(store.record_share_view(created.share.id).await.unwrap(), 1);
        assert_eq!(store.record_share_view(created.share.id).await.unwrap(), 2);
        let shared = store.shared_plan(plan_id).await.unwrap().unwrap();
        assert_eq!(shared.subject_name, "Mila");
        assert_eq!(shared.plan.meals.len(), 1);
        assert_eq!(store.subject_recipes(subject_id).await.unwrap().len(), 1);
    }
}
