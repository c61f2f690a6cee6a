//! Payment-provider webhooks.

mod events;
pub mod handlers;
mod signature;

use axum::Router;

use crate::state::AppState;

pub use events::BillingAction;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
