//! JWT token generation and validation
//!
//! Implements the token codec with HMAC-SHA256 signing. Every token carries
//! its kind (`access` or `refresh`) and a fresh `jti` used as the revocation
//! key. Validation checks the signature first and only then compares `exp`
//! against the caller-supplied `now`.

use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use muse_core::AuthConfig;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Token kind, serialized in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - username
    pub sub: String,
    /// Token kind
    #[serde(rename = "type")]
    pub kind: TokenKind,
    /// JWT ID - unique token identifier for revocation
    pub jti: String,
    /// Issued at timestamp (Unix epoch seconds)
    pub iat: i64,
    /// Expiration timestamp (Unix epoch seconds)
    pub exp: i64,
}

impl Claims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }

    /// `exp` is exclusive: a token is no longer valid at its expiry second
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }
}

/// Token codec errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token lifetime is not positive or overflows the expiry time")]
    InvalidLifetime,
}

/// Token lifetimes, issuer and signing secret
#[derive(Clone)]
pub struct TokenConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Token issuer identifier
    pub issuer: String,
    /// Access token lifetime
    pub access_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: "development-secret-key-change-in-production".to_string(),
            issuer: "muse-as-service".to_string(),
            access_ttl: Duration::hours(24),
            refresh_ttl: Duration::days(30),
        }
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenConfig {
    /// Build from application config, generating a process-local secret if none is set
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        let secret = match &config.secret {
            Some(secret) if !secret.is_empty() => secret.clone(),
            _ => {
                tracing::warn!(
                    "JWT_SECRET_KEY not set; generated a random signing key, tokens will not survive a restart"
                );
                generate_secret()
            }
        };

        Self {
            secret,
            issuer: config.issuer.clone(),
            access_ttl: lifetime_from_secs(config.access_ttl_secs),
            refresh_ttl: lifetime_from_secs(config.refresh_ttl_secs),
        }
    }

    pub fn lifetime(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }
}

/// Unrepresentable lifetimes become zero and are refused at issue time
fn lifetime_from_secs(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(Duration::zero)
}

/// Generate a cryptographically secure signing secret
fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let secret_bytes: [u8; 32] = rng.gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(secret_bytes)
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Serialized JWT
    pub token: String,
    /// `jti` claim
    pub id: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies tokens with a process-wide key
#[derive(Clone)]
pub struct TokenCodec {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(config: TokenConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Expiry is checked against the caller's clock after the signature.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Sign a new token of `kind` for `subject`
    ///
    /// # Returns
    ///
    /// * `Ok(IssuedToken)` - Serialized token with its unique id and expiry
    /// * `Err(TokenError::InvalidLifetime)` - Lifetime is not positive or `now + lifetime` overflows
    /// * `Err(TokenError)` - If encoding fails
    pub fn issue(
        &self,
        subject: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let lifetime = self.config.lifetime(kind);
        if lifetime <= Duration::zero() {
            return Err(TokenError::InvalidLifetime);
        }
        let expires_at = now
            .checked_add_signed(lifetime)
            .ok_or(TokenError::InvalidLifetime)?;
        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            kind,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(IssuedToken {
            token,
            id: claims.jti,
            expires_at,
        })
    }

    /// Verify signature and shape only, ignoring expiry
    ///
    /// Used by logout, which must accept tokens that are already expired.
    pub fn decode_signed(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            },
        )?;

        Ok(token_data.claims)
    }

    /// Verify signature, then expiry against `now`
    ///
    /// # Returns
    ///
    /// * `Ok(Claims)` - Decoded, unexpired claims
    /// * `Err(TokenError::BadSignature)` - Signature mismatch, whatever the content
    /// * `Err(TokenError::Malformed)` - Not a token this codec could have issued
    /// * `Err(TokenError::Expired)` - Valid signature, `now` at or past `exp`
    pub fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let claims = self.decode_signed(token)?;
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}
