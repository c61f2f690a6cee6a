use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FieldError;
use crate::models::{SwapReason, TasteFeedback};
use crate::store::MealRating;

use super::swap::SwapSuggestion;

pub const MAX_NOTES_LEN: usize = 500;
pub const MAX_CUSTOM_REASON_LEN: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateMealRequest {
    #[serde(alias = "babyId")]
    pub subject_id: Option<Uuid>,
    pub rating: Option<i64>,
    pub taste_feedback: Option<String>,
    pub would_make_again: Option<bool>,
    pub notes: Option<String>,
}

/// A rating request whose fields passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRating {
    pub subject_id: Uuid,
    pub rating: Option<u8>,
    pub taste_feedback: Option<TasteFeedback>,
    pub would_make_again: Option<bool>,
    pub notes: Option<String>,
}

impl RateMealRequest {
    pub fn validate(self) -> Result<ValidRating, Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.subject_id.is_none() {
            errors.push(FieldError::new("subjectId", "Required"));
        }
        let rating = match self.rating {
            Some(r @ 1..=5) => Some(r as u8),
            Some(_) => {
                errors.push(FieldError::new("rating", "Must be between 1 and 5"));
                None
            }
            None => None,
        };
        let taste_feedback = match self.taste_feedback.as_deref().map(str::parse::<TasteFeedback>) {
            Some(Ok(t)) => Some(t),
            Some(Err(_)) => {
                errors.push(FieldError::new(
                    "tasteFeedback",
                    "Expected one of loved, liked, neutral, disliked, rejected",
                ));
                None
            }
            None => None,
        };
        if self
            .notes
            .as_ref()
            .is_some_and(|n| n.chars().count() > MAX_NOTES_LEN)
        {
            errors.push(FieldError::new(
                "notes",
                format!("Must be at most {} characters", MAX_NOTES_LEN),
            ));
        }

        match self.subject_id {
            Some(subject_id) if errors.is_empty() => Ok(ValidRating {
                subject_id,
                rating,
                taste_feedback,
                would_make_again: self.would_make_again,
                notes: self.notes,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingQuery {
    #[serde(alias = "babyId")]
    pub subject_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RatingResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub rating: Option<MealRating>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub reason: Option<String>,
    pub custom_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSwap {
    pub reason: Option<SwapReason>,
    pub custom_reason: Option<String>,
}

impl SwapRequest {
    pub fn validate(self) -> Result<ValidSwap, Vec<FieldError>> {
        let mut errors = Vec::new();
        let reason = match self.reason.as_deref().map(str::parse::<SwapReason>) {
            Some(Ok(r)) => Some(r),
            Some(Err(_)) => {
                errors.push(FieldError::new(
                    "reason",
                    "Expected one of missing_ingredient, dont_like, want_variety, dietary, other",
                ));
                None
            }
            None => None,
        };
        if self
            .custom_reason
            .as_ref()
            .is_some_and(|r| r.chars().count() > MAX_CUSTOM_REASON_LEN)
        {
            errors.push(FieldError::new(
                "customReason",
                format!("Must be at most {} characters", MAX_CUSTOM_REASON_LEN),
            ));
        }
        if errors.is_empty() {
            Ok(ValidSwap {
                reason,
                custom_reason: self.custom_reason.filter(|r| !r.trim().is_empty()),
            })
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OriginalMeal {
    pub id: Uuid,
    pub title: String,
    pub meal_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResponse {
    pub success: bool,
    pub original_meal: OriginalMeal,
    pub suggestions: Vec<SwapSuggestion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(subject: Option<Uuid>) -> RateMealRequest {
        RateMealRequest {
            subject_id: subject,
            rating: None,
            taste_feedback: None,
            would_make_again: None,
            notes: None,
        }
    }

    #[test]
    fn rating_bounds_and_notes_length() {
        let subject = Uuid::new_v4();
        for r in [1, 5] {
            let mut req = rating(Some(subject));
            req.rating = Some(r);
            assert_eq!(req.validate().unwrap().rating, Some(r as u8));
        }

        let mut req = rating(None);
        req.rating = Some(6);
        req.notes = Some("x".repeat(MAX_NOTES_LEN + 1));
        req.taste_feedback = Some("meh".into());
        let fields: Vec<String> = req
            .validate()
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert_eq!(fields, vec!["subjectId", "rating", "tasteFeedback", "notes"]);
    }

    #[test]
    fn swap_reason_is_optional_but_checked() {
        let ok = SwapRequest::default().validate().unwrap();
        assert_eq!(ok.reason, None);

        let req = SwapRequest {
            reason: Some("dont_like".into()),
            custom_reason: Some("   ".into()),
        };
        let valid = req.validate().unwrap();
        assert_eq!(valid.reason, Some(SwapReason::DontLike));
        assert_eq!(valid.custom_reason, None);

        let req = SwapRequest {
            reason: Some("bored".into()),
            custom_reason: Some("y".repeat(MAX_CUSTOM_REASON_LEN + 1)),
        };
        assert_eq!(req.validate().unwrap_err().len(), 2);
    }
}
