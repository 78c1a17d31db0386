mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;

use axum::{middleware::from_fn_with_state, Router};

use crate::{auth::gate::require_auth, state::AppState};

/// Task routes. The gate wraps every route, outside the cache layers, so the
/// cache always sees the caller's identity.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes(&state))
        .merge(handlers::write_routes(&state))
        .route_layer(from_fn_with_state(state, require_auth))
}
