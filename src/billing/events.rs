use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::{SubscriptionPlan, SubscriptionStatus};
use crate::store::BillingEvent;

/// The account mutation a payment event asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingAction {
    Activate {
        user_id: Uuid,
        plan: SubscriptionPlan,
        customer_id: Option<String>,
    },
    SyncStatus {
        customer_id: String,
        status: SubscriptionStatus,
    },
    Downgrade {
        customer_id: String,
    },
    FlagPastDue {
        customer_id: String,
    },
    Ignore,
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event payload: {0}")]
    Malformed(String),
}

pub fn parse_event(body: &[u8]) -> Result<BillingEvent, EventError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| EventError::Malformed(e.to_string()))?;
    let id = payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EventError::Malformed("missing event id".into()))?
        .to_string();
    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| EventError::Malformed("missing event type".into()))?
        .to_string();
    let object = payload.pointer("/data/object").unwrap_or(&Value::Null);
    let action = action_for(&event_type, object);

    Ok(BillingEvent {
        id,
        event_type,
        action,
        payload,
    })
}

fn str_at<'a>(object: &'a Value, pointer: &str) -> Option<&'a str> {
    object.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn action_for(event_type: &str, object: &Value) -> BillingAction {
    let customer = str_at(object, "/customer").map(str::to_string);
    match event_type {
        "checkout.session.completed" => {
            let user_id = str_at(object, "/metadata/user_id").and_then(|s| Uuid::parse_str(s).ok());
            let plan = str_at(object, "/metadata/plan").and_then(|s| s.parse().ok());
            match (user_id, plan) {
                (Some(user_id), Some(plan)) => BillingAction::Activate {
                    user_id,
                    plan,
                    customer_id: customer,
                },
                _ => {
                    warn!(event_type, "checkout session without usable metadata");
                    BillingAction::Ignore
                }
            }
        }
        "customer.subscription.updated" => match customer {
            Some(customer_id) => {
                let status = match str_at(object, "/status") {
                    Some("active") => SubscriptionStatus::Active,
                    Some("past_due") => SubscriptionStatus::PastDue,
                    _ => SubscriptionStatus::Canceled,
                };
                BillingAction::SyncStatus {
                    customer_id,
                    status,
                }
            }
            None => BillingAction::Ignore,
        },
        "customer.subscription.deleted" => customer
            .map(|customer_id| BillingAction::Downgrade { customer_id })
            .unwrap_or(BillingAction::Ignore),
        "invoice.payment_failed" => customer
            .map(|customer_id| BillingAction::FlagPastDue { customer_id })
            .unwrap_or(BillingAction::Ignore),
        _ => BillingAction::Ignore,
    }
}
