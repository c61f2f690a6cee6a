use serde::{Deserialize, Deserializer, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::FieldError;
use crate::store::records::serialize_date;
use crate::store::{PlanDetails, PlanShare};

pub const DEFAULT_EXPIRY_DAYS: i64 = 30;
pub const MAX_EXPIRY_DAYS: i64 = 365;
pub const TOKEN_LEN: usize = 12;

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(d).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareRequest {
    pub plan_id: Option<Uuid>,
    /// Absent: the default expiry. `null` or zero: never expires.
    #[serde(default, deserialize_with = "present")]
    pub expires_in_days: Option<Option<i64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidShare {
    pub plan_id: Uuid,
    pub expires_in_days: Option<i64>,
}

impl CreateShareRequest {
    pub fn validate(self) -> Result<ValidShare, Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.plan_id.is_none() {
            errors.push(FieldError::new("planId", "Plan ID is required"));
        }
        let expires_in_days = match self.expires_in_days {
            None => Some(DEFAULT_EXPIRY_DAYS),
            Some(None) | Some(Some(0)) => None,
            Some(Some(days @ 1..=MAX_EXPIRY_DAYS)) => Some(days),
            Some(Some(_)) => {
                errors.push(FieldError::new(
                    "expiresInDays",
                    format!("Must be between 0 and {}", MAX_EXPIRY_DAYS),
                ));
                None
            }
        };
        match self.plan_id {
            Some(plan_id) if errors.is_empty() => Ok(ValidShare {
                plan_id,
                expires_in_days,
            }),
            _ => Err(errors),
        }
    }
}

/// Tokens are issued as fixed-length alphanumerics; anything else cannot
/// match a stored link.
pub fn is_share_token(token: &str) -> bool {
    token.len() == TOKEN_LEN && token.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShareResponse {
    pub success: bool,
    pub share: PlanShare,
    pub share_url: String,
    pub is_new: bool,
}

/// What a link reveals about the subject: an initial and the birthdate.
#[derive(Debug, Serialize)]
pub struct SharedSubject {
    pub name: String,
    #[serde(serialize_with = "serialize_date")]
    pub birthdate: Date,
}

impl SharedSubject {
    pub fn new(name: &str, birthdate: Date) -> Self {
        let name = name
            .trim()
            .chars()
            .next()
            .map(|c| format!("{}.", c))
            .unwrap_or_else(|| "Baby".to_string());
        Self { name, birthdate }
    }
}

#[derive(Debug, Serialize)]
pub struct SharedPlanView {
    #[serde(flatten)]
    pub plan: PlanDetails,
    pub subject: SharedSubject,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareInfo {
    pub view_count: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPlanResponse {
    pub success: bool,
    pub plan: SharedPlanView,
    pub share_info: ShareInfo,
}
