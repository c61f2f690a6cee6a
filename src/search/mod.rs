//! Quick search: "what can I cook with what I have" over the subject's
//! planned recipes, with optional model-written ideas.

mod dto;
pub mod handlers;
mod matching;
mod services;
mod suggest;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::routes()
}
