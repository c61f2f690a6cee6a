use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Text-backed enums: serde, `as_str`, `FromStr` and `Display` share one table.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($kind:literal) {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum! {
    /// Meal slot kind within a day.
    pub enum MealType ("meal type") {
        Breakfast => "breakfast",
        Lunch => "lunch",
        Dinner => "dinner",
        Snack => "snack",
    }
}

text_enum! {
    pub enum FeedingGoal ("feeding goal") {
        BalancedNutrition => "balanced_nutrition",
        WeightGain => "weight_gain",
        FoodVariety => "food_variety",
        PickyEater => "picky_eater",
    }
}

impl FeedingGoal {
    pub fn description(&self) -> &'static str {
        match self {
            FeedingGoal::BalancedNutrition => "Well-rounded meals with variety",
            FeedingGoal::WeightGain => "Calorie-dense, nutritious meals",
            FeedingGoal::FoodVariety => "Focus on trying new foods safely",
            FeedingGoal::PickyEater => "Gentle food exposure strategies",
        }
    }
}

text_enum! {
    pub enum SubscriptionPlan ("subscription plan") {
        Free => "free",
        ProMonthly => "pro_monthly",
        ProAnnual => "pro_annual",
        Lifetime => "lifetime",
    }
}

text_enum! {
    pub enum SubscriptionStatus ("subscription status") {
        Active => "active",
        PastDue => "past_due",
        Canceled => "canceled",
    }
}

text_enum! {
    /// Outcome recorded by the food tracker for one food.
    pub enum FoodOutcome ("food outcome") {
        Tried => "tried",
        Liked => "liked",
        Disliked => "disliked",
        Allergic => "allergic",
    }
}

text_enum! {
    pub enum TasteFeedback ("taste feedback") {
        Loved => "loved",
        Liked => "liked",
        Neutral => "neutral",
        Disliked => "disliked",
        Rejected => "rejected",
    }
}

text_enum! {
    pub enum SwapReason ("swap reason") {
        MissingIngredient => "missing_ingredient",
        DontLike => "dont_like",
        WantVariety => "want_variety",
        Dietary => "dietary",
        Other => "other",
    }
}

/// Usage counter of the rolling weekly window, anchored at `reset_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub used: u32,
    pub reset_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    pub plan: SubscriptionPlan,
    pub status: Option<SubscriptionStatus>,
    pub usage: UsageWindow,
}

/// The baby a plan is generated for.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub birthdate: Date,
    pub allergies: Vec<String>,
    pub feeding_goal: FeedingGoal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoodHistoryEntry {
    pub food: String,
    pub outcome: FoodOutcome,
}

/// A meal the subject has rated, as seen by the context builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatedMeal {
    pub title: String,
    pub rating: Option<u8>,
    pub taste_feedback: Option<TasteFeedback>,
}

impl RatedMeal {
    pub fn is_loved(&self) -> bool {
        self.taste_feedback == Some(TasteFeedback::Loved) || self.rating.is_some_and(|r| r >= 4)
    }

    pub fn is_disliked(&self) -> bool {
        matches!(
            self.taste_feedback,
            Some(TasteFeedback::Disliked) | Some(TasteFeedback::Rejected)
        ) || self.rating.is_some_and(|r| r <= 2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}
