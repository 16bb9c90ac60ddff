//! MUSE Core - Shared configuration, error contract, and collaborator traits
//!
//! This crate defines the abstractions shared by the server, the client, and
//! the inference backends:
//! - Configuration management
//! - Core error types
//! - The wire error contract returned by the HTTP API
//! - The `Inferencer` trait for the tokenize/embed collaborator
//! - A `Clock` used for every token time check

pub mod clock;
pub mod config;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, InferenceBackend, InferenceConfig,
    LoggingConfig, ServerConfig, TokenTransport, MAX_TOKEN_TTL_SECS,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for MUSE operations
#[derive(Error, Debug)]
pub enum MuseError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, MuseError>;

// ============================================================================
// Wire Error Contract
// ============================================================================

/// Machine-readable error code carried in every failure body
///
/// Clients decide whether to refresh-and-retry from this code alone, so
/// each authentication failure has its own variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidCredentials,
    TokenMissing,
    TokenMalformed,
    TokenBadSignature,
    TokenExpired,
    TokenRevoked,
    TokenWrongKind,
    BadRequest,
    Timeout,
    InternalError,
    DatabaseError,
    /// Any code this build does not know about
    #[serde(other)]
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenMissing => "TOKEN_MISSING",
            Self::TokenMalformed => "TOKEN_MALFORMED",
            Self::TokenBadSignature => "TOKEN_BAD_SIGNATURE",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::TokenWrongKind => "TOKEN_WRONG_KIND",
            Self::BadRequest => "BAD_REQUEST",
            Self::Timeout => "TIMEOUT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// The only classification a client should recover from automatically
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::TokenExpired)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON body of every failed API response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Error code
    #[schema(value_type = String, example = "TOKEN_EXPIRED")]
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// HTTP status
    pub status: u16,
    /// Additional details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Tokenize/embed capability guarded by the API
///
/// The computation itself is opaque to the service; implementations live in
/// `muse-infer`.
#[async_trait::async_trait]
pub trait Inferencer: Send + Sync {
    /// Split each sentence into subword tokens
    async fn tokenize(&self, sentences: &[String]) -> Result<Vec<Vec<String>>>;

    /// Produce one embedding per sentence
    async fn embed(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embedding dimension
    fn dimension(&self) -> usize;

    /// Backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
