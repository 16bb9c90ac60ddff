//! MUSE API - authenticated tokenize/embed server
//!
//! Provides the HTTP surface and the session subsystem guarding it:
//! login issues an access/refresh token pair, protected endpoints require a
//! valid unrevoked access token, refresh mints new access tokens and logout
//! revokes tokens durably.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use crate::openapi::ApiDoc;
use crate::state::AppState;
use auth::AuthService;
use axum::Router;
use muse_core::Clock;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the application router with docs, tracing and security headers
pub fn create_router(state: Arc<AppState>) -> Router {
    let request_timeout = state.config.server.request_timeout_secs;

    let router = Router::new()
        .merge(routes::api_routes(state.clone()))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    with_request_timeout(router, request_timeout)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Answer `408 Request Timeout` for requests running longer than `secs`; 0 disables
fn with_request_timeout(router: Router, secs: u64) -> Router {
    if secs == 0 {
        return router;
    }
    router.layer(TimeoutLayer::new(Duration::from_secs(secs)))
}

/// Periodically delete revocation records of expired tokens
///
/// Records are only pruned once their token has expired, so membership
/// checks for live tokens are unaffected.
pub fn spawn_revocation_pruner(
    auth: Arc<AuthService>,
    clock: Arc<dyn Clock>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match auth.prune_revocations(clock.now()).await {
                Ok(removed) => tracing::debug!(removed, "Revocation pruning pass finished"),
                Err(e) => tracing::warn!(error = %e, "Revocation pruning failed"),
            }
        }
    })
}


/// Test utilities (requires `test-utils` feature)
#[cfg(feature = "test-utils")]
pub mod testing {
    use super::*;
    use crate::auth::password::PasswordConfig;
    use crate::auth::repository::{connect_in_memory, migrate};
    use crate::auth::UserRepository;
    use chrono::{TimeZone, Utc};
    use muse_core::{AppConfig, ManualClock};
    use muse_infer::local::LocalInferencer;

    pub const TEST_USERNAME: &str = "admin";
    pub const TEST_PASSWORD: &str = "admin";
    pub const TEST_SECRET: &str = "muse-test-signing-secret";

    /// Router plus the handles a test needs to steer it
    pub struct TestContext {
        pub router: Router,
        pub state: Arc<AppState>,
        pub clock: Arc<ManualClock>,
    }

    /// Config used by `create_router_for_testing`
    pub fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.auth.secret = Some(TEST_SECRET.to_string());
        config.inference.dimension = 16;
        config
    }

    /// Router over an in-memory database seeded with `admin`/`admin`
    pub async fn create_router_for_testing() -> TestContext {
        create_router_for_testing_with(test_config()).await
    }

    /// Same as `create_router_for_testing` with a custom config
    pub async fn create_router_for_testing_with(config: AppConfig) -> TestContext {
        let pool = connect_in_memory().await.expect("in-memory database");
        migrate(&pool).await.expect("migrations");

        UserRepository::new(pool.clone())
            .create_user(TEST_USERNAME, TEST_PASSWORD, &PasswordConfig::insecure_fast())
            .await
            .expect("seed user");

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid start time"),
        ));
        let inferencer = Arc::new(LocalInferencer::new(config.inference.dimension));
        let state = Arc::new(AppState::with_clock(
            config,
            pool,
            inferencer,
            clock.clone(),
        ));

        TestContext {
            router: create_router(state.clone()),
            state,
            clock,
        }
    }
}
