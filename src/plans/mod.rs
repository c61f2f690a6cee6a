mod context;
mod dto;
pub mod handlers;
mod prompt;
pub mod quota;
pub mod response;
mod schema;
mod services;
mod validate;

use crate::state::AppState;
use axum::Router;

pub(crate) use context::{age_in_months, build_context, AgeRange};
pub(crate) use prompt::join_or;
pub(crate) use schema::MAX_PREP_TIME_MINUTES;
pub(crate) use validate::uuid_field;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
