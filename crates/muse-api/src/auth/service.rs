//! Authentication service layer
//!
//! Orchestrates login, logout, validation and refresh over a credential
//! store, the token codec and the revocation store. The service keeps no
//! per-session state: a session exists only as a set of issued tokens whose
//! ids are not in the revocation store.
//!
//! Every operation takes `now` explicitly so expiry can be simulated.

use super::jwt::{Claims, IssuedToken, TokenCodec, TokenError, TokenKind};
use super::repository::{CredentialStore, RepositoryError, RevocationStore};
use chrono::{DateTime, Utc};
use muse_core::ErrorCode;
use std::sync::Arc;
use thiserror::Error;

/// Classified authentication failure
///
/// Token variants map one-to-one onto wire error codes so a client can tell
/// an expired token (recoverable via refresh) from every other cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Missing token")]
    TokenMissing,

    #[error("Malformed token")]
    TokenMalformed,

    #[error("Token signature verification failed")]
    TokenBadSignature,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Wrong token type: expected {expected} token")]
    TokenWrongKind { expected: TokenKind },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AuthError::InvalidCredentials => ErrorCode::InvalidCredentials,
            AuthError::TokenMissing => ErrorCode::TokenMissing,
            AuthError::TokenMalformed => ErrorCode::TokenMalformed,
            AuthError::TokenBadSignature => ErrorCode::TokenBadSignature,
            AuthError::TokenExpired => ErrorCode::TokenExpired,
            AuthError::TokenRevoked => ErrorCode::TokenRevoked,
            AuthError::TokenWrongKind { .. } => ErrorCode::TokenWrongKind,
            AuthError::Storage(_) => ErrorCode::DatabaseError,
            AuthError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Client-side failure (401 class) as opposed to a server fault
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AuthError::Storage(_) | AuthError::Internal(_))
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => AuthError::TokenMalformed,
            TokenError::BadSignature => AuthError::TokenBadSignature,
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::EncodingError(e) => AuthError::Internal(e.to_string()),
            TokenError::InvalidLifetime => {
                AuthError::Internal("token lifetime misconfigured".to_string())
            }
        }
    }
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::UserNotFound => AuthError::InvalidCredentials,
            RepositoryError::Password(e) => AuthError::Internal(e.to_string()),
            RepositoryError::TaskFailed(e) => AuthError::Internal(e),
            other => AuthError::Storage(other.to_string()),
        }
    }
}

/// Access and refresh token issued together at login
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Access token minted from a refresh token
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub subject: String,
    pub refresh_token_id: String,
    pub access: IssuedToken,
}

/// A presented token that could not be revoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutFailure {
    pub kind: TokenKind,
    pub error: AuthError,
}

/// Result of a logout
///
/// Complete when every presented token was revoked, including the case where
/// none was presented.
#[derive(Debug, Clone, Default)]
pub struct LogoutOutcome {
    pub subject: Option<String>,
    pub revoked: Vec<(TokenKind, String)>,
    pub failures: Vec<LogoutFailure>,
}

impl LogoutOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn revoked_ids(&self) -> Vec<String> {
        self.revoked.iter().map(|(_, id)| id.clone()).collect()
    }
}

/// Authentication service
///
/// Constructed once at startup and shared through the application state.
#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    revocations: Arc<dyn RevocationStore>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        codec: TokenCodec,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        Self {
            credentials,
            codec,
            revocations,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Check credentials and issue a token pair
    ///
    /// Unknown users and wrong passwords both yield `InvalidCredentials`.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthError> {
        let user = self.credentials.find_by_username(username).await?;

        if !self
            .credentials
            .verify_password(password, &user.password_hash)
            .await?
        {
            return Err(AuthError::InvalidCredentials);
        }

        let access = self.codec.issue(&user.username, TokenKind::Access, now)?;
        let refresh = self.codec.issue(&user.username, TokenKind::Refresh, now)?;

        tracing::debug!(
            username = %user.username,
            access_token_id = %access.id,
            refresh_token_id = %refresh.id,
            "Issued token pair"
        );

        Ok(TokenPair { access, refresh })
    }

    /// Revoke whichever tokens were presented
    ///
    /// Tokens only need a valid signature here, so already-expired tokens can
    /// still be logged out. Tokens that fail to decode, or sit in the wrong
    /// slot, are reported as failures and left alone. Only storage faults
    /// abort the call.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LogoutOutcome, AuthError> {
        let mut outcome = LogoutOutcome::default();

        for (kind, token) in [
            (TokenKind::Access, access_token),
            (TokenKind::Refresh, refresh_token),
        ] {
            let Some(token) = token else { continue };

            match self.revoke_presented(token, kind, now).await {
                Ok(claims) => {
                    outcome.subject.get_or_insert(claims.sub);
                    outcome.revoked.push((kind, claims.jti));
                }
                Err(error @ (AuthError::Storage(_) | AuthError::Internal(_))) => return Err(error),
                Err(error) => outcome.failures.push(LogoutFailure { kind, error }),
            }
        }

        Ok(outcome)
    }

    async fn revoke_presented(
        &self,
        token: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, AuthError> {
        let claims = self.codec.decode_signed(token)?;
        if claims.kind != kind {
            return Err(AuthError::TokenWrongKind { expected: kind });
        }

        self.revocations
            .revoke(&claims.jti, claims.expires_at(), now)
            .await?;

        Ok(claims)
    }

    /// Full validation: signature, expiry, kind, then revocation
    pub async fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
        required: TokenKind,
    ) -> Result<Claims, AuthError> {
        let claims = self.codec.decode(token, now)?;

        if claims.kind != required {
            return Err(AuthError::TokenWrongKind { expected: required });
        }

        if self.revocations.is_revoked(&claims.jti).await? {
            return Err(AuthError::TokenRevoked);
        }

        Ok(claims)
    }

    /// Mint a new access token; the refresh token is neither rotated nor reissued
    pub async fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<RefreshedAccess, AuthError> {
        let claims = self.validate(refresh_token, now, TokenKind::Refresh).await?;
        let access = self.codec.issue(&claims.sub, TokenKind::Access, now)?;

        Ok(RefreshedAccess {
            subject: claims.sub,
            refresh_token_id: claims.jti,
            access,
        })
    }

    /// Drop revocation records for tokens that have expired by `now`
    pub async fn prune_revocations(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        Ok(self.revocations.prune_expired(now).await?)
    }
}
