//! Database models for authentication
//!
//! - User: account with a hashed credential
//! - RevokedToken: token id that must no longer be honoured
//!
//! These map to the `users` and `revoked_tokens` tables created by
//! `repository::migrate`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User account model
///
/// Created out of band (see the `muse user add` command); the service only
/// reads it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Row id
    pub id: i64,

    /// Unique login name, also the token subject
    pub username: String,

    /// Hashed password (Argon2id PHC string)
    /// This field is never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// Revocation record
///
/// Never updated once written. `expires_at` is the natural expiry of the
/// revoked token and is only consulted by pruning.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RevokedToken {
    /// Row id
    pub id: i64,

    /// JWT ID (jti claim) of the revoked token
    pub token_id: String,

    /// When the token was revoked
    pub revoked_at: DateTime<Utc>,

    /// Expiry of the revoked token; the record may be pruned after it
    pub expires_at: DateTime<Utc>,
}
