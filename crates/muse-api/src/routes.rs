//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::middleware::require_access;
use crate::handlers::{auth, health, inference};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Session routes validate their own tokens
    let session_routes = Router::new()
        .route("/login", post(auth::login_handler))
        .route("/logout", post(auth::logout_handler))
        .route("/logout/access", post(auth::logout_access_handler))
        .route("/logout/refresh", post(auth::logout_refresh_handler))
        .route("/token/refresh", post(auth::refresh_handler));

    // Protected routes (access token required)
    let protected_routes = Router::new()
        .route("/tokenize", get(inference::tokenize_handler))
        .route("/embed", get(inference::embed_handler))
        .route_layer(middleware::from_fn_with_state(state, require_access));

    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check));

    Router::new()
        .merge(session_routes)
        .merge(protected_routes)
        .merge(health_routes)
}
