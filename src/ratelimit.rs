//! In-process fixed-window rate limiting keyed by `account:operation`.
//!
//! Counters live in this process only; several instances each keep their own
//! windows, so this is a best-effort throttle and never a correctness gate.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;

/// Expired windows are swept at most this often.
const CLEANUP_INTERVAL_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window_secs: u32,
}

impl RateLimitConfig {
    /// AI generation endpoints: 10 requests per minute by default.
    pub const AI_GENERATION: RateLimitConfig = RateLimitConfig {
        limit: 10,
        window_secs: 60,
    };

    pub const API: RateLimitConfig = RateLimitConfig {
        limit: 100,
        window_secs: 60,
    };

    pub fn per_minute(limit: u32) -> Self {
        RateLimitConfig {
            limit,
            window_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix timestamp (seconds) at which the current window ends.
    pub reset: i64,
}

impl RateLimitResult {
    /// Whole seconds until the window resets, never below one.
    pub fn retry_after(&self, now: OffsetDateTime) -> u64 {
        (self.reset - now.unix_timestamp()).max(1) as u64
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: i64,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    last_cleanup: AtomicI64,
}

pub fn rate_limit_key(user_id: Uuid, operation: &str) -> String {
    format!("{}:{}", user_id, operation)
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_at(
        &self,
        key: &str,
        config: RateLimitConfig,
        now: OffsetDateTime,
    ) -> RateLimitResult {
        let now = now.unix_timestamp();
        self.cleanup(now);

        let fresh = Window {
            count: 1,
            reset_at: now + i64::from(config.window_secs),
        };
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: fresh.reset_at,
        });
        let window = entry.value_mut();

        if window.count == 0 || window.reset_at <= now {
            *window = fresh;
            return RateLimitResult {
                success: true,
                limit: config.limit,
                remaining: config.limit.saturating_sub(1),
                reset: window.reset_at,
            };
        }

        if window.count >= config.limit {
            debug!(key, "rate limit exceeded");
            return RateLimitResult {
                success: false,
                limit: config.limit,
                remaining: 0,
                reset: window.reset_at,
            };
        }

        window.count += 1;
        RateLimitResult {
            success: true,
            limit: config.limit,
            remaining: config.limit - window.count,
            reset: window.reset_at,
        }
    }

    /// Admits one request for `operation` or turns the rejection into a 429.
    pub fn enforce(
        &self,
        user_id: Uuid,
        operation: &str,
        config: RateLimitConfig,
        message: &'static str,
    ) -> Result<RateLimitResult, ApiError> {
        let now = OffsetDateTime::now_utc();
        let result = self.check_at(&rate_limit_key(user_id, operation), config, now);
        if result.success {
            Ok(result)
        } else {
            Err(ApiError::RateLimited {
                limit: result,
                retry_after: result.retry_after(now),
                message,
            })
        }
    }

    fn cleanup(&self, now: i64) {
        let last = self.last_cleanup.load(Ordering::Relaxed);
        if now - last < CLEANUP_INTERVAL_SECS {
            return;
        }
        if self
            .last_cleanup
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        self.windows.retain(|_, w| w.reset_at > now);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.windows.len()
    }
}
