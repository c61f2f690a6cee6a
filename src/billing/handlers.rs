use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::events::{parse_event, BillingAction};
use super::signature;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::EventOutcome;

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/stripe", post(stripe_webhook))
}

/// POST /webhooks/stripe (raw body, `Stripe-Signature` header)
#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let secret = state
        .config
        .stripe
        .webhook_secret
        .as_deref()
        .ok_or(ApiError::NotConfigured("Stripe webhook"))?;

    let header = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidSignature)?;
    signature::verify(
        header,
        &body,
        secret,
        state.config.stripe.tolerance_secs,
        OffsetDateTime::now_utc().unix_timestamp(),
    )
    .map_err(|e| {
        warn!(error = %e, "webhook signature rejected");
        ApiError::InvalidSignature
    })?;

    let event = parse_event(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    match state.store.apply_billing_event(&event).await {
        Ok(EventOutcome::Duplicate) => {
            info!(event_id = %event.id, "event already processed, skipping");
            Ok(Json(json!({ "received": true, "skipped": true })))
        }
        Ok(EventOutcome::Applied { accounts_updated }) => {
            if accounts_updated == 0 && event.action != BillingAction::Ignore {
                warn!(event_id = %event.id, event_type = %event.event_type, "event matched no account");
            }
            info!(event_id = %event.id, event_type = %event.event_type, accounts_updated, "event processed");
            Ok(Json(json!({ "received": true })))
        }
        Err(e) => {
            // marker and effects rolled back together; the provider retries
            error!(event_id = %event.id, error = %e, "webhook handler failed");
            Err(ApiError::Internal(anyhow::anyhow!("Webhook handler failed")))
        }
    }
}
