//! In-memory `Store` for tests. Every write method mutates under one lock
//! and only after all of its checks passed, so a failed write leaves no trace.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::{
    BillingEvent, EventOutcome, GroceryItem, GroceryList, MealDetails, MealRating, NewMealSlot,
    NewPlan, NewRating, NewRecipe, NewShare, OwnedMeal, PlanDetails, PlanShare, PlanSummary,
    QuotaCharge, RecipeDetails, SavedShare, SharedPlan, Store, StoreError, StoredRecipe,
};
use crate::billing::BillingAction;
use crate::models::{
    Account, FeedingGoal, FoodHistoryEntry, FoodOutcome, Ingredient, MealType, Profile,
    RatedMeal, SubscriptionPlan, SubscriptionStatus, UsageWindow,
};
use crate::plans::quota;

struct StoredAccount {
    account: Account,
    customer_id: Option<String>,
}

struct StoredPlan {
    summary: PlanSummary,
    slots: Vec<(Uuid, NewMealSlot)>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, StoredAccount>,
    profiles: HashMap<Uuid, Profile>,
    history: HashMap<Uuid, Vec<FoodHistoryEntry>>,
    plans: Vec<StoredPlan>,
    ratings: Vec<(Uuid, MealRating)>,
    grocery: HashMap<Uuid, GroceryList>,
    events: HashSet<String>,
    shares: Vec<(Uuid, PlanShare)>,
}

impl Inner {
    fn owns_subject(&self, user_id: Uuid, subject_id: Uuid) -> bool {
        self.profiles
            .get(&subject_id)
            .is_some_and(|p| p.user_id == user_id)
    }

    fn owned_plan(&self, user_id: Uuid, plan_id: Uuid) -> Option<&StoredPlan> {
        self.plans
            .iter()
            .find(|p| p.summary.id == plan_id && self.owns_subject(user_id, p.summary.subject_id))
    }

    fn find_slot(&self, meal_id: Uuid) -> Option<(&StoredPlan, &NewMealSlot)> {
        self.plans.iter().find_map(|p| {
            p.slots
                .iter()
                .find(|(id, _)| *id == meal_id)
                .map(|(_, slot)| (p, slot))
        })
    }

    fn accounts_by_customer(&mut self, customer_id: &str) -> Vec<&mut StoredAccount> {
        self.accounts
            .values_mut()
            .filter(|a| a.customer_id.as_deref() == Some(customer_id))
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn add_account(&self, plan: SubscriptionPlan) -> Uuid {
        let id = Uuid::new_v4();
        let account = Account {
            id,
            plan,
            status: None,
            usage: UsageWindow {
                used: 0,
                reset_at: OffsetDateTime::now_utc(),
            },
        };
        self.inner.lock().unwrap().accounts.insert(
            id,
            StoredAccount {
                account,
                customer_id: None,
            },
        );
        id
    }

    pub fn account(&self, user_id: Uuid) -> Account {
        self.inner.lock().unwrap().accounts[&user_id].account.clone()
    }

    pub fn set_usage(&self, user_id: Uuid, usage: UsageWindow) {
        if let Some(a) = self.inner.lock().unwrap().accounts.get_mut(&user_id) {
            a.account.usage = usage;
        }
    }

    pub fn add_profile(&self, user_id: Uuid, birthdate: Date, allergies: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.lock().unwrap().profiles.insert(
            id,
            Profile {
                id,
                user_id,
                name: "Mila".into(),
                birthdate,
                allergies: allergies.iter().map(|s| s.to_string()).collect(),
                feeding_goal: FeedingGoal::BalancedNutrition,
            },
        );
        id
    }

    pub fn add_food(&self, subject_id: Uuid, food: &str, outcome: FoodOutcome) {
        self.inner
            .lock()
            .unwrap()
            .history
            .entry(subject_id)
            .or_default()
            .push(FoodHistoryEntry {
                food: food.to_string(),
                outcome,
            });
    }

    /// Makes every subsequent write fail as a database error would.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn plan_count(&self) -> usize {
        self.inner.lock().unwrap().plans.len()
    }

    /// Slots and recipes are written together, so this counts both.
    pub fn slot_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .plans
            .iter()
            .map(|p| p.slots.len())
            .sum()
    }

    pub fn meal_ids(&self, plan_id: Uuid) -> Vec<Uuid> {
        self.inner
            .lock()
            .unwrap()
            .plans
            .iter()
            .filter(|p| p.summary.id == plan_id)
            .flat_map(|p| p.slots.iter().map(|(id, _)| *id))
            .collect()
    }

    /// Stores a one-day plan for today. Each entry is a title and its
    /// comma-separated ingredient names, assigned to meal types in order.
    pub fn add_plan(&self, subject_id: Uuid, meals: &[(&str, &str)]) -> Uuid {
        let today = OffsetDateTime::now_utc().date();
        let id = Uuid::new_v4();
        let slots = meals
            .iter()
            .zip(MealType::ALL.iter().cycle())
            .map(|((title, ingredients), meal_type)| {
                let slot = NewMealSlot {
                    day_index: 0,
                    meal_type: *meal_type,
                    title: title.to_string(),
                    summary: format!("{} for the family", title),
                    recipe: NewRecipe {
                        ingredients: ingredients
                            .split(',')
                            .map(|name| Ingredient {
                                name: name.trim().to_string(),
                                quantity: "1".into(),
                                unit: "cup".into(),
                                category: None,
                            })
                            .collect(),
                        instructions: vec!["Cook until soft.".into()],
                        prep_time_minutes: 20,
                        texture_notes: None,
                        choking_hazard_notes: None,
                        batch_info: None,
                        family_version: None,
                        nutrition: None,
                    },
                };
                (Uuid::new_v4(), slot)
            })
            .collect();
        self.inner.lock().unwrap().plans.push(StoredPlan {
            summary: PlanSummary {
                id,
                subject_id,
                start_date: today,
                end_date: today,
                goal: FeedingGoal::BalancedNutrition.as_str().to_string(),
                days: 1,
                created_at: OffsetDateTime::now_utc(),
            },
            slots,
        });
        id
    }

    pub fn share_count(&self) -> usize {
        self.inner.lock().unwrap().shares.len()
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated write failure".into()));
        }
        Ok(())
    }
}

fn recipe_details(slot: &NewMealSlot) -> RecipeDetails {
    let r = &slot.recipe;
    RecipeDetails {
        ingredients: serde_json::to_value(&r.ingredients).unwrap_or_default(),
        instructions: serde_json::to_value(&r.instructions).unwrap_or_default(),
        prep_time_minutes: r.prep_time_minutes,
        texture_notes: r.texture_notes.clone(),
        choking_hazard_notes: r.choking_hazard_notes.clone(),
        batch_info: r.batch_info.as_ref().and_then(|b| serde_json::to_value(b).ok()),
        family_version: r
            .family_version
            .as_ref()
            .and_then(|f| serde_json::to_value(f).ok()),
        nutrition: r.nutrition.as_ref().and_then(|n| serde_json::to_value(n).ok()),
    }
}

fn plan_details(plan: &StoredPlan) -> PlanDetails {
    let mut meals: Vec<MealDetails> = plan
        .slots
        .iter()
        .map(|(id, slot)| MealDetails {
            id: *id,
            day_index: slot.day_index,
            meal_type: slot.meal_type.as_str().to_string(),
            title: slot.title.clone(),
            summary: slot.summary.clone(),
            recipe: Some(recipe_details(slot)),
        })
        .collect();
    meals.sort_by_key(|m| (m.day_index, m.meal_type.parse::<MealType>().ok()));
    PlanDetails {
        plan: plan.summary.clone(),
        meals,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_account(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.accounts.get(&user_id).map(|a| a.account.clone()))
    }

    async fn get_profile(
        &self,
        user_id: Uuid,
        subject_id: Uuid,
    ) -> Result<Option<Profile>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .profiles
            .get(&subject_id)
            .filter(|p| p.user_id == user_id)
            .cloned())
    }

    async fn food_history(&self, subject_id: Uuid) -> Result<Vec<FoodHistoryEntry>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.history.get(&subject_id).cloned().unwrap_or_default())
    }

    async fn rated_meals(&self, subject_id: Uuid) -> Result<Vec<RatedMeal>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut ratings: Vec<&MealRating> = inner
            .ratings
            .iter()
            .map(|(_, r)| r)
            .filter(|r| r.subject_id == subject_id)
            .collect();
        ratings.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(ratings
            .into_iter()
            .filter_map(|r| {
                let (_, slot) = inner.find_slot(r.meal_id)?;
                Some(RatedMeal {
                    title: slot.title.clone(),
                    rating: r.rating.and_then(|v| u8::try_from(v).ok()),
                    taste_feedback: r.taste_feedback.as_deref().and_then(|t| t.parse().ok()),
                })
            })
            .collect())
    }

    async fn commit_plan(
        &self,
        plan: NewPlan,
        charge: Option<QuotaCharge>,
    ) -> Result<Uuid, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();

        let charged = match &charge {
            Some(charge) => {
                let account = inner
                    .accounts
                    .get(&charge.user_id)
                    .ok_or(StoreError::QuotaExceeded)?;
                let usage = quota::apply_charge(account.account.usage, charge.limit, charge.now)
                    .ok_or(StoreError::QuotaExceeded)?;
                Some((charge.user_id, usage))
            }
            None => None,
        };

        let mut seen = HashSet::new();
        for slot in &plan.slots {
            if !seen.insert((slot.day_index, slot.meal_type)) {
                return Err(StoreError::Backend("duplicate meal slot".into()));
            }
        }

        let plan_id = Uuid::new_v4();
        let summary = PlanSummary {
            id: plan_id,
            subject_id: plan.subject_id,
            start_date: plan.start_date,
            end_date: plan.end_date,
            goal: plan.goal.as_str().to_string(),
            days: plan.days,
            created_at: OffsetDateTime::now_utc(),
        };
        let slots = plan
            .slots
            .into_iter()
            .map(|s| (Uuid::new_v4(), s))
            .collect();

        if let Some((user_id, usage)) = charged {
            if let Some(a) = inner.accounts.get_mut(&user_id) {
                a.account.usage = usage;
            }
        }
        inner.plans.push(StoredPlan { summary, slots });
        Ok(plan_id)
    }

    async fn list_plans(
        &self,
        user_id: Uuid,
        subject_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PlanSummary>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut plans: Vec<PlanSummary> = inner
            .plans
            .iter()
            .filter(|p| inner.owns_subject(user_id, p.summary.subject_id))
            .filter(|p| subject_id.map_or(true, |s| p.summary.subject_id == s))
            .map(|p| p.summary.clone())
            .collect();
        plans.reverse();
        Ok(plans
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn get_plan(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<PlanDetails>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.owned_plan(user_id, plan_id).map(plan_details))
    }

    async fn get_meal(&self, user_id: Uuid, meal_id: Uuid) -> Result<Option<OwnedMeal>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some((plan, slot)) = inner.find_slot(meal_id) else {
            return Ok(None);
        };
        let Some(subject) = inner
            .profiles
            .get(&plan.summary.subject_id)
            .filter(|p| p.user_id == user_id)
        else {
            return Ok(None);
        };
        Ok(Some(OwnedMeal {
            id: meal_id,
            plan_id: plan.summary.id,
            meal_type: slot.meal_type.as_str().to_string(),
            title: slot.title.clone(),
            summary: slot.summary.clone(),
            ingredients: slot.recipe.ingredients.clone(),
            subject: subject.clone(),
        }))
    }

    async fn upsert_rating(&self, rating: NewRating) -> Result<MealRating, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        let now = OffsetDateTime::now_utc();
        let existing = inner
            .ratings
            .iter_mut()
            .find(|(_, r)| r.meal_id == rating.meal_id && r.subject_id == rating.subject_id);

        let row = MealRating {
            id: existing
                .as_ref()
                .map(|(_, r)| r.id)
                .unwrap_or_else(Uuid::new_v4),
            meal_id: rating.meal_id,
            subject_id: rating.subject_id,
            rating: rating.rating.map(i32::from),
            taste_feedback: rating.taste_feedback.map(|t| t.as_str().to_string()),
            would_make_again: rating.would_make_again,
            notes: rating.notes,
            updated_at: now,
        };
        match existing {
            Some(slot) => *slot = (rating.user_id, row.clone()),
            None => inner.ratings.push((rating.user_id, row.clone())),
        }
        Ok(row)
    }

    async fn get_rating(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
        subject_id: Uuid,
    ) -> Result<Option<MealRating>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ratings
            .iter()
            .find(|(owner, r)| *owner == user_id && r.meal_id == meal_id && r.subject_id == subject_id)
            .map(|(_, r)| r.clone()))
    }

    async fn plan_ingredients(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<Vec<Ingredient>>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.owned_plan(user_id, plan_id).map(|p| {
            p.slots
                .iter()
                .flat_map(|(_, s)| s.recipe.ingredients.iter().cloned())
                .collect()
        }))
    }

    async fn get_grocery_list(
        &self,
        user_id: Uuid,
        plan_id: Uuid,
    ) -> Result<Option<GroceryList>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if inner.owned_plan(user_id, plan_id).is_none() {
            return Ok(None);
        }
        Ok(inner.grocery.get(&plan_id).cloned())
    }

    async fn save_grocery_list(
        &self,
        plan_id: Uuid,
        items: Vec<GroceryItem>,
    ) -> Result<GroceryList, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        if inner.grocery.contains_key(&plan_id) {
            return Err(StoreError::Conflict(
                "Grocery list already exists for this plan".into(),
            ));
        }
        let list = GroceryList {
            id: Uuid::new_v4(),
            plan_id,
            items,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.grocery.insert(plan_id, list.clone());
        Ok(list)
    }

    async fn apply_billing_event(&self, event: &BillingEvent) -> Result<EventOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.events.contains(&event.id) {
            return Ok(EventOutcome::Duplicate);
        }
        self.check_writable()?;

        let accounts_updated = match &event.action {
            BillingAction::Activate {
                user_id,
                plan,
                customer_id,
            } => match inner.accounts.get_mut(user_id) {
                Some(a) => {
                    a.account.plan = *plan;
                    a.account.status = Some(SubscriptionStatus::Active);
                    if customer_id.is_some() {
                        a.customer_id = customer_id.clone();
                    }
                    1
                }
                None => 0,
            },
            BillingAction::SyncStatus {
                customer_id,
                status,
            } => {
                let accounts = inner.accounts_by_customer(customer_id);
                let n = accounts.len() as u64;
                for a in accounts {
                    a.account.status = Some(*status);
                }
                n
            }
            BillingAction::Downgrade { customer_id } => {
                let accounts = inner.accounts_by_customer(customer_id);
                let n = accounts.len() as u64;
                for a in accounts {
                    a.account.plan = SubscriptionPlan::Free;
                    a.account.status = None;
                }
                n
            }
            BillingAction::FlagPastDue { customer_id } => {
                let accounts = inner.accounts_by_customer(customer_id);
                let n = accounts.len() as u64;
                for a in accounts {
                    a.account.status = Some(SubscriptionStatus::PastDue);
                }
                n
            }
            BillingAction::Ignore => 0,
        };

        inner.events.insert(event.id.clone());
        Ok(EventOutcome::Applied { accounts_updated })
    }

    async fn subject_recipes(&self, subject_id: Uuid) -> Result<Vec<StoredRecipe>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .plans
            .iter()
            .rev()
            .filter(|p| p.summary.subject_id == subject_id)
            .flat_map(|p| p.slots.iter())
            .map(|(id, slot)| StoredRecipe {
                id: *id,
                meal_type: slot.meal_type.as_str().to_string(),
                title: slot.title.clone(),
                summary: slot.summary.clone(),
                prep_time_minutes: slot.recipe.prep_time_minutes,
                ingredients: slot.recipe.ingredients.clone(),
            })
            .collect())
    }

    async fn save_share(&self, share: NewShare) -> Result<SavedShare, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some((_, existing)) = inner
            .shares
            .iter_mut()
            .find(|(owner, s)| *owner == share.created_by && s.plan_id == share.plan_id)
        {
            existing.expires_at = share.expires_at;
            return Ok(SavedShare {
                share: existing.clone(),
                created: false,
            });
        }
        if inner.shares.iter().any(|(_, s)| s.share_token == share.token) {
            return Err(StoreError::Conflict("share token already taken".into()));
        }
        let row = PlanShare {
            id: Uuid::new_v4(),
            plan_id: share.plan_id,
            share_token: share.token,
            expires_at: share.expires_at,
            view_count: 0,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.shares.push((share.created_by, row.clone()));
        Ok(SavedShare {
            share: row,
            created: true,
        })
    }

    async fn find_share(&self, token: &str) -> Result<Option<PlanShare>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .shares
            .iter()
            .find(|(_, s)| s.share_token == token)
            .map(|(_, s)| s.clone()))
    }

    async fn record_share_view(&self, share_id: Uuid) -> Result<i32, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .shares
            .iter_mut()
            .find(|(_, s)| s.id == share_id)
            .map(|(_, s)| {
                s.view_count += 1;
                s.view_count
            })
            .unwrap_or_default())
    }

    async fn shared_plan(&self, plan_id: Uuid) -> Result<Option<SharedPlan>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let Some(plan) = inner.plans.iter().find(|p| p.summary.id == plan_id) else {
            return Ok(None);
        };
        let Some(subject) = inner.profiles.get(&plan.summary.subject_id) else {
            return Ok(None);
        };
        Ok(Some(SharedPlan {
            plan: plan_details(plan),
            subject_name: subject.name.clone(),
            birthdate: subject.birthdate,
        }))
    }
}
