//! Authentication repository for SQLite operations
//!
//! This module provides the database access layer for authentication entities:
//! - User lookup and offline administration
//! - Revoked token set (the only shared mutable state of the service)
//!
//! Both stores are exposed as traits so the service can be assembled over
//! any backend; the SQLite implementations live here.

use super::models::{RevokedToken, User};
use super::password::{verify_password, PasswordConfig, PasswordError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muse_core::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Username already exists")]
    UsernameAlreadyExists,

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        RepositoryError::DatabaseError(err.to_string())
    }
}

/// Read access to user credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a user; `Err(UserNotFound)` when absent
    async fn find_by_username(&self, username: &str) -> Result<User, RepositoryError>;

    /// Check a plaintext password against a stored hash
    async fn verify_password(&self, plaintext: &str, hash: &str) -> Result<bool, RepositoryError>;
}

/// Durable set of revoked token ids
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Idempotent insert; concurrent calls for one id leave exactly one record
    async fn revoke(
        &self,
        token_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Membership check, never filtered by expiry
    async fn is_revoked(&self, token_id: &str) -> Result<bool, RepositoryError>;

    /// Delete records whose token expired at or before `now`
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

/// Open a connection pool for the configured database
///
/// File databases are created on first use.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, RepositoryError> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .connect_with(options)
        .await?;

    tracing::debug!(max_connections = config.max_connections, "Database pool opened");
    Ok(pool)
}

/// Single-connection in-memory database, kept alive for the pool's lifetime
pub async fn connect_in_memory() -> Result<SqlitePool, RepositoryError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Create the `users` and `revoked_tokens` tables if missing
pub async fn migrate(pool: &SqlitePool) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS revoked_tokens (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            token_id TEXT NOT NULL UNIQUE,
            revoked_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_revoked_tokens_expires_at ON revoked_tokens (expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with a freshly hashed password
    ///
    /// # Returns
    ///
    /// * `Ok(User)` - Created user with ID assigned
    /// * `Err(RepositoryError::UsernameAlreadyExists)` - If the name is taken
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        config: &PasswordConfig,
    ) -> Result<User, RepositoryError> {
        let plaintext = password.to_string();
        let config = config.clone();
        let password_hash =
            tokio::task::spawn_blocking(move || config.hash(&plaintext))
                .await
                .map_err(|e| RepositoryError::TaskFailed(e.to_string()))??;

        let result = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2) \
             RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RepositoryError::UsernameAlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a user by name
    pub async fn delete_user(&self, username: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE username = ?1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::UserNotFound);
        }
        Ok(())
    }

    /// List all usernames, sorted
    pub async fn list_usernames(&self) -> Result<Vec<String>, RepositoryError> {
        let names = sqlx::query_scalar::<_, String>("SELECT username FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }
}

#[async_trait]
impl CredentialStore for UserRepository {
    async fn find_by_username(&self, username: &str) -> Result<User, RepositoryError> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash FROM users WHERE username = ?1 LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::UserNotFound)
    }

    async fn verify_password(&self, plaintext: &str, hash: &str) -> Result<bool, RepositoryError> {
        // Argon2 is CPU-bound; keep it off the async workers
        let plaintext = plaintext.to_string();
        let hash = hash.to_string();
        let matched = tokio::task::spawn_blocking(move || verify_password(&plaintext, &hash))
            .await
            .map_err(|e| RepositoryError::TaskFailed(e.to_string()))??;
        Ok(matched)
    }
}

/// Revoked token repository
#[derive(Clone)]
pub struct RevokedTokenRepository {
    pool: SqlitePool,
}

impl RevokedTokenRepository {
    /// Create a new revoked token repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up the record for a token id
    pub async fn find(&self, token_id: &str) -> Result<Option<RevokedToken>, RepositoryError> {
        let record = sqlx::query_as::<_, RevokedToken>(
            "SELECT id, token_id, revoked_at, expires_at FROM revoked_tokens WHERE token_id = ?1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM revoked_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl RevocationStore for RevokedTokenRepository {
    async fn revoke(
        &self,
        token_id: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO revoked_tokens (token_id, revoked_at, expires_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(token_id) DO NOTHING",
        )
        .bind(token_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> Result<bool, RepositoryError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM revoked_tokens WHERE token_id = ?1",
        )
        .bind(token_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, "Pruned expired revocation records");
        }
        Ok(removed)
    }
}
