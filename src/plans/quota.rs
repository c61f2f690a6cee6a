//! Weekly free-tier quota.
//!
//! The pre-check here is read-only. The authoritative check-and-increment is
//! the conditional update run by the store inside the plan transaction;
//! [`apply_charge`] is the same rule expressed over a [`UsageWindow`].

use time::{Duration, OffsetDateTime};

use crate::models::{Account, SubscriptionPlan, UsageWindow};
use crate::store::QuotaCharge;

/// Length of the rolling usage window.
pub const WINDOW: Duration = Duration::days(7);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Unlimited,
    Allowed { used: u32, limit: u32 },
    Exceeded { used: u32, limit: u32 },
}

pub fn is_metered(plan: SubscriptionPlan) -> bool {
    plan == SubscriptionPlan::Free
}

/// The window as it stands at `now`: a lapsed window counts as unused.
pub fn effective_window(usage: UsageWindow, now: OffsetDateTime) -> UsageWindow {
    if now >= usage.reset_at + WINDOW {
        UsageWindow {
            used: 0,
            reset_at: now,
        }
    } else {
        usage
    }
}

pub fn evaluate(account: &Account, limit: u32, now: OffsetDateTime) -> QuotaDecision {
    if !is_metered(account.plan) {
        return QuotaDecision::Unlimited;
    }
    let used = effective_window(account.usage, now).used;
    if used >= limit {
        QuotaDecision::Exceeded { used, limit }
    } else {
        QuotaDecision::Allowed { used, limit }
    }
}

/// One successful generation, or `None` when the window has no room left.
pub fn apply_charge(usage: UsageWindow, limit: u32, now: OffsetDateTime) -> Option<UsageWindow> {
    let current = effective_window(usage, now);
    if current.used >= limit {
        return None;
    }
    Some(UsageWindow {
        used: current.used + 1,
        reset_at: current.reset_at,
    })
}

/// The charge to commit with the plan; paid tiers are never charged.
pub fn charge_for(account: &Account, limit: u32, now: OffsetDateTime) -> Option<QuotaCharge> {
    is_metered(account.plan).then_some(QuotaCharge {
        user_id: account.id,
        limit,
        now,
    })
}
