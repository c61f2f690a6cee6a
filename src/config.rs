use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::ratelimit::RateLimitConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub webhook_secret: Option<String>,
    pub tolerance_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub free_plans_per_week: u32,
    pub ai_requests_per_minute: u32,
}

impl LimitsConfig {
    pub fn ai_rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::per_minute(self.ai_requests_per_minute)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Origin used to build share links, without a trailing slash.
    pub public_url: String,
    pub jwt: JwtConfig,
    pub openai: OpenAiConfig,
    pub stripe: StripeConfig,
    pub limits: LimitsConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let public_url = std::env::var("PUBLIC_APP_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "babybites".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".into()),
        };
        let openai = OpenAiConfig {
            api_key: std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            timeout_secs: parse_or("GENERATION_TIMEOUT_SECS", 60),
        };
        let stripe = StripeConfig {
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            tolerance_secs: parse_or("STRIPE_WEBHOOK_TOLERANCE_SECS", 300),
        };
        let limits = LimitsConfig {
            free_plans_per_week: parse_or("FREE_PLANS_PER_WEEK", 1),
            ai_requests_per_minute: parse_or(
                "RATE_LIMIT_AI_PER_MINUTE",
                RateLimitConfig::AI_GENERATION.limit,
            ),
        };
        if stripe.webhook_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set; payment webhooks are disabled");
        }
        Ok(Self {
            database_url,
            public_url,
            jwt,
            openai,
            stripe,
            limits,
        })
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
