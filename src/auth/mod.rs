use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod claims;
mod dto;
pub mod gate;
mod handlers;
pub mod jwt;
pub mod password;
pub mod repo;
pub mod repo_types;

pub fn router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(handlers::get_me))
        .route_layer(from_fn_with_state(state, gate::require_auth));

    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .merge(protected)
}
