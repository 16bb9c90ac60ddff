//! Application state management
//!
//! Author: hephaex@gmail.com

use crate::auth::{AuthService, RevokedTokenRepository, TokenCodec, TokenConfig, UserRepository};
use chrono::{DateTime, Utc};
use muse_core::config::{AppConfig, TokenTransport};
use muse_core::{Clock, Inferencer, SystemClock};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    /// Session service
    pub auth: Arc<AuthService>,
    /// Tokenize/embed collaborator
    pub inferencer: Arc<dyn Inferencer>,
    /// Time source for every token check
    pub clock: Arc<dyn Clock>,
    /// Database pool (users and revoked tokens)
    pub db_pool: SqlitePool,
}

impl AppState {
    /// Create application state over an opened, migrated pool
    pub fn new(config: AppConfig, db_pool: SqlitePool, inferencer: Arc<dyn Inferencer>) -> Self {
        Self::with_clock(config, db_pool, inferencer, Arc::new(SystemClock))
    }

    /// Same as `new` with an explicit clock
    pub fn with_clock(
        config: AppConfig,
        db_pool: SqlitePool,
        inferencer: Arc<dyn Inferencer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let codec = TokenCodec::new(TokenConfig::from_auth_config(&config.auth));
        let auth = AuthService::new(
            Arc::new(UserRepository::new(db_pool.clone())),
            codec,
            Arc::new(RevokedTokenRepository::new(db_pool.clone())),
        );

        Self {
            config,
            start_time: Instant::now(),
            auth: Arc::new(auth),
            inferencer,
            clock,
            db_pool,
        }
    }

    /// Current time according to the configured clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Whether login/refresh should set credential cookies
    pub fn uses_cookies(&self) -> bool {
        self.config.auth.transport == TokenTransport::Cookies
    }

    /// Upper bound on a single inference call
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.config.inference.timeout_secs.max(1))
    }
}
