//! Relay service route modules.

pub mod health;
pub mod relay;

use axum::Router;

use crate::server::AppState;

/// Create the main router with all routes. The relay mount point comes from
/// configuration so it can match whatever base path the player is given.
pub fn create_router(state: AppState) -> Router {
    let base_path = state.config.base_path.clone();
    Router::new()
        .nest(&base_path, relay::router())
        .nest("/health", health::router())
        .with_state(state)
}
