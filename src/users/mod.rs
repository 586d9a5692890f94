use std::sync::Arc;

use axum::Router;

use crate::{auth::jwt::JwtKeys, state::AppState};

pub mod dto;
pub mod events;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod service;

pub fn router(keys: Arc<JwtKeys>) -> Router<AppState> {
    handlers::user_routes(keys)
}
