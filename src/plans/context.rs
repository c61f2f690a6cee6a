use time::Date;

use crate::models::{FoodHistoryEntry, FoodOutcome, Profile, RatedMeal};

/// Loved and disliked meal titles passed to the prompt are capped at this.
pub const MEAL_PREFERENCE_CAP: usize = 10;

/// Whole calendar months between `birthdate` and `today`; a month counts once
/// its day-of-month has been reached.
pub fn age_in_months(birthdate: Date, today: Date) -> u32 {
    let mut months = (today.year() - birthdate.year()) * 12
        + (u8::from(today.month()) as i32 - u8::from(birthdate.month()) as i32);
    if today.day() < birthdate.day() {
        months -= 1;
    }
    months.max(0) as u32
}

/// Texture bands used for age guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeRange {
    SixToSeven,
    EightToNine,
    TenToTwelve,
    TwelveToEighteen,
    EighteenToTwentyFour,
}

impl AgeRange {
    /// Anything under 8 months, including under 6, uses the youngest band.
    pub fn from_months(months: u32) -> Self {
        match months {
            0..=7 => AgeRange::SixToSeven,
            8..=9 => AgeRange::EightToNine,
            10..=11 => AgeRange::TenToTwelve,
            12..=17 => AgeRange::TwelveToEighteen,
            _ => AgeRange::EighteenToTwentyFour,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeRange::SixToSeven => "6-7",
            AgeRange::EightToNine => "8-9",
            AgeRange::TenToTwelve => "10-12",
            AgeRange::TwelveToEighteen => "12-18",
            AgeRange::EighteenToTwentyFour => "18-24",
        }
    }

    pub fn texture_guideline(&self) -> &'static str {
        match self {
            AgeRange::SixToSeven => "Smooth purees, very soft mashed foods",
            AgeRange::EightToNine => "Thicker purees, soft lumps, finger foods that dissolve",
            AgeRange::TenToTwelve => "Soft, small pieces, more texture variety",
            AgeRange::TwelveToEighteen => "Soft table foods, small pieces, wider variety",
            AgeRange::EighteenToTwentyFour => "Modified family foods, small pieces, most textures",
        }
    }
}

/// Everything known about the subject that shapes a prompt.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub name: String,
    pub age_months: u32,
    pub age_range: AgeRange,
    pub allergies: Vec<String>,
    pub tried_foods: Vec<String>,
    pub disliked_foods: Vec<String>,
    pub loved_meals: Vec<String>,
    pub disliked_meals: Vec<String>,
}

pub fn build_context(
    profile: &Profile,
    history: &[FoodHistoryEntry],
    rated: &[RatedMeal],
    today: Date,
) -> GenerationContext {
    let age_months = age_in_months(profile.birthdate, today);

    let mut allergies: Vec<String> = Vec::new();
    let allergic = history
        .iter()
        .filter(|e| e.outcome == FoodOutcome::Allergic)
        .map(|e| &e.food);
    for name in profile.allergies.iter().chain(allergic) {
        push_unique(&mut allergies, name);
    }

    let mut tried_foods = Vec::new();
    let mut disliked_foods = Vec::new();
    for entry in history {
        match entry.outcome {
            FoodOutcome::Tried | FoodOutcome::Liked => push_unique(&mut tried_foods, &entry.food),
            FoodOutcome::Disliked => push_unique(&mut disliked_foods, &entry.food),
            FoodOutcome::Allergic => {}
        }
    }

    let mut loved_meals = Vec::new();
    let mut disliked_meals = Vec::new();
    for meal in rated {
        if meal.is_loved() {
            if loved_meals.len() < MEAL_PREFERENCE_CAP {
                push_unique(&mut loved_meals, &meal.title);
            }
        } else if meal.is_disliked() && disliked_meals.len() < MEAL_PREFERENCE_CAP {
            push_unique(&mut disliked_meals, &meal.title);
        }
    }

    GenerationContext {
        name: profile.name.clone(),
        age_months,
        age_range: AgeRange::from_months(age_months),
        allergies,
        tried_foods,
        disliked_foods,
        loved_meals,
        disliked_meals,
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    if value.is_empty() || list.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        return;
    }
    list.push(value.to_string());
}
