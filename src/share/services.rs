use rand::{distributions::Alphanumeric, Rng};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{
    is_share_token, CreateShareRequest, CreateShareResponse, ShareInfo, SharedPlanResponse,
    SharedPlanView, SharedSubject, TOKEN_LEN,
};
use crate::error::ApiError;
use crate::ratelimit::RateLimitConfig;
use crate::state::AppState;
use crate::store::NewShare;

pub const SHARE_OPERATION: &str = "share-plan";
const SHARE_NOT_FOUND: &str = "Shared plan not found";

pub fn new_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Creates the caller's link for one of their plans. Sharing the same plan
/// again refreshes the expiry and keeps the token.
#[instrument(skip(state))]
pub async fn create_share(
    state: &AppState,
    user_id: Uuid,
    body: CreateShareRequest,
) -> Result<CreateShareResponse, ApiError> {
    state.limiter.enforce(
        user_id,
        SHARE_OPERATION,
        RateLimitConfig::API,
        "Please slow down",
    )?;
    let valid = body.validate().map_err(ApiError::Validation)?;

    if state.store.get_plan(user_id, valid.plan_id).await?.is_none() {
        return Err(ApiError::NotFound("Plan not found"));
    }

    let expires_at = valid
        .expires_in_days
        .map(|days| OffsetDateTime::now_utc() + Duration::days(days));
    let saved = state
        .store
        .save_share(NewShare {
            plan_id: valid.plan_id,
            created_by: user_id,
            token: new_token(),
            expires_at,
        })
        .await
        .map_err(|e| {
            error!(error = %e, plan_id = %valid.plan_id, "saving share link failed");
            ApiError::from(e)
        })?;

    info!(
        plan_id = %valid.plan_id,
        share_id = %saved.share.id,
        created = saved.created,
        "plan shared"
    );
    Ok(CreateShareResponse {
        success: true,
        share_url: format!(
            "{}/shared/{}",
            state.config.public_url, saved.share.share_token
        ),
        is_new: saved.created,
        share: saved.share,
    })
}

/// Resolves a link without authentication and counts the view.
#[instrument(skip(state))]
pub async fn open_share(state: &AppState, token: &str) -> Result<SharedPlanResponse, ApiError> {
    if !is_share_token(token) {
        return Err(ApiError::NotFound(SHARE_NOT_FOUND));
    }
    let share = state
        .store
        .find_share(token)
        .await?
        .ok_or(ApiError::NotFound(SHARE_NOT_FOUND))?;
    if share.is_expired(OffsetDateTime::now_utc()) {
        info!(share_id = %share.id, "expired share link opened");
        return Err(ApiError::Gone("This share link has expired"));
    }

    let shared = state
        .store
        .shared_plan(share.plan_id)
        .await?
        .ok_or(ApiError::NotFound("Meal plan not found"))?;

    // the count is informational; a failed update still serves the plan
    let view_count = match state.store.record_share_view(share.id).await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, share_id = %share.id, "view not counted");
            share.view_count + 1
        }
    };

    Ok(SharedPlanResponse {
        success: true,
        plan: SharedPlanView {
            plan: shared.plan,
            subject: SharedSubject::new(&shared.subject_name, shared.birthdate),
        },
        share_info: ShareInfo {
            view_count,
            created_at: share.created_at,
            expires_at: share.expires_at,
        },
    })
}
