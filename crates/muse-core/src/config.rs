//! MUSE service configuration
//!
//! Handles configuration from an optional TOML file and environment
//! variables with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest accepted token lifetime (10 years)
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// User and revocation storage
    pub database: DatabaseConfig,

    /// Token issuance and transport
    pub auth: AuthConfig,

    /// Inference collaborator
    pub inference: InferenceConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()
    }

    /// Load the file named by `MUSE_CONFIG` (if any), then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("MUSE_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_env_override()
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(host) = lookup("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("API_PORT") {
            self.server.port = parse_value("API_PORT", port)?;
        }
        if let Some(secs) = lookup("API_REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = parse_value("API_REQUEST_TIMEOUT_SECS", secs)?;
        }

        // Database
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_value("DATABASE_MAX_CONNECTIONS", max)?;
        }

        // Auth
        if let Some(secret) = lookup("JWT_SECRET_KEY") {
            self.auth.secret = Some(secret);
        }
        if let Some(issuer) = lookup("JWT_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Some(ttl) = lookup("JWT_ACCESS_TOKEN_EXPIRES") {
            self.auth.access_ttl_secs = parse_value("JWT_ACCESS_TOKEN_EXPIRES", ttl)?;
        }
        if let Some(ttl) = lookup("JWT_REFRESH_TOKEN_EXPIRES") {
            self.auth.refresh_ttl_secs = parse_value("JWT_REFRESH_TOKEN_EXPIRES", ttl)?;
        }
        if let Some(location) = lookup("JWT_TOKEN_LOCATION") {
            self.auth.transport = location.parse()?;
        }
        if let Some(secure) = lookup("JWT_COOKIE_SECURE") {
            self.auth.cookie_secure = parse_value("JWT_COOKIE_SECURE", secure)?;
        }
        if let Some(secs) = lookup("REVOCATION_PRUNE_INTERVAL_SECS") {
            self.auth.prune_interval_secs = parse_value("REVOCATION_PRUNE_INTERVAL_SECS", secs)?;
        }

        // Inference
        if let Some(backend) = lookup("INFERENCE_BACKEND") {
            self.inference.backend = backend.parse()?;
        }
        if let Some(url) = lookup("INFERENCE_URL") {
            self.inference.remote_url = url;
        }
        if let Some(dim) = lookup("EMBEDDING_DIMENSION") {
            self.inference.dimension = parse_value("EMBEDDING_DIMENSION", dim)?;
        }
        if let Some(secs) = lookup("INFERENCE_TIMEOUT_SECS") {
            self.inference.timeout_secs = parse_value("INFERENCE_TIMEOUT_SECS", secs)?;
        }

        // Logging
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("LOG_JSON") {
            self.logging.json = parse_value("LOG_JSON", json)?;
        }

        self.validate()
    }

    /// Reject values that parse but cannot work
    pub fn validate(self) -> Result<Self, ConfigError> {
        check_ttl("JWT_ACCESS_TOKEN_EXPIRES", self.auth.access_ttl_secs)?;
        check_ttl("JWT_REFRESH_TOKEN_EXPIRES", self.auth.refresh_ttl_secs)?;
        Ok(self)
    }
}

fn check_ttl(key: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_TOKEN_TTL_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: secs.to_string(),
        });
    }
    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Whole-request timeout in seconds (408 when exceeded), 0 disables
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_secs: 60,
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,

    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://muse.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Where clients carry their credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTransport {
    /// `Authorization: Bearer <token>`
    #[default]
    Headers,
    /// `access_token_cookie` / `refresh_token_cookie`
    Cookies,
}

impl std::str::FromStr for TokenTransport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "headers" | "header" => Ok(Self::Headers),
            "cookies" | "cookie" => Ok(Self::Cookies),
            _ => Err(ConfigError::InvalidValue {
                key: "JWT_TOKEN_LOCATION".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Token configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC signing secret; a random one is generated at startup when unset
    pub secret: Option<String>,

    /// Token issuer identifier
    pub issuer: String,

    /// Access token lifetime in seconds
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds
    pub refresh_ttl_secs: u64,

    /// Credential transport used by this deployment
    pub transport: TokenTransport,

    /// Mark credential cookies `Secure`
    pub cookie_secure: bool,

    /// Interval between revocation pruning passes, 0 disables pruning
    pub prune_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: "muse-as-service".to_string(),
            access_ttl_secs: 24 * 60 * 60,
            refresh_ttl_secs: 30 * 24 * 60 * 60,
            transport: TokenTransport::Headers,
            cookie_secure: false,
            prune_interval_secs: 0,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("issuer", &self.issuer)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("transport", &self.transport)
            .field("cookie_secure", &self.cookie_secure)
            .field("prune_interval_secs", &self.prune_interval_secs)
            .finish()
    }
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceBackend {
    /// In-process subword tokenizer and hashing embedder
    #[default]
    Local,
    /// HTTP model server
    Remote,
}

impl std::str::FromStr for InferenceBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            _ => Err(ConfigError::InvalidValue {
                key: "INFERENCE_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Inference collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Backend to use
    pub backend: InferenceBackend,

    /// Model server base URL (remote backend only)
    pub remote_url: String,

    /// Embedding dimension
    pub dimension: usize,

    /// Upper bound for a single inference call in seconds
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: InferenceBackend::Local,
            remote_url: "http://localhost:8501".to_string(),
            dimension: 512,
            timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.access_ttl_secs, 86_400);
        assert_eq!(config.auth.refresh_ttl_secs, 2_592_000);
        assert_eq!(config.auth.transport, TokenTransport::Headers);
        assert_eq!(config.inference.dimension, 512);
        assert!(config.auth.secret.is_none());
    }

    #[test]
    fn test_overrides_applied() {
        let config = AppConfig::default()
            .with_overrides(lookup(&[
                ("API_PORT", "9000"),
                ("JWT_SECRET_KEY", "s3cret"),
                ("JWT_ACCESS_TOKEN_EXPIRES", "60"),
                ("JWT_TOKEN_LOCATION", "cookies"),
                ("INFERENCE_BACKEND", "remote"),
                ("LOG_JSON", "true"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.auth.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.access_ttl_secs, 60);
        assert_eq!(config.auth.transport, TokenTransport::Cookies);
        assert_eq!(config.inference.backend, InferenceBackend::Remote);
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let err = AppConfig::default()
            .with_overrides(lookup(&[("API_PORT", "not-a-port")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "API_PORT"));

        let err = AppConfig::default()
            .with_overrides(lookup(&[("JWT_TOKEN_LOCATION", "query")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_token_lifetime_bounds() {
        for bad in ["0", "18446744073709551615", "10000000000000"] {
            let err = AppConfig::default()
                .with_overrides(lookup(&[("JWT_REFRESH_TOKEN_EXPIRES", bad)]))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "JWT_REFRESH_TOKEN_EXPIRES"),
                "{bad} should be rejected"
            );
        }

        let max = MAX_TOKEN_TTL_SECS.to_string();
        let config = AppConfig::default()
            .with_overrides(lookup(&[("JWT_ACCESS_TOKEN_EXPIRES", "1"), ("JWT_REFRESH_TOKEN_EXPIRES", &max)]))
            .unwrap();
        assert_eq!(config.auth.access_ttl_secs, 1);
        assert_eq!(config.auth.refresh_ttl_secs, MAX_TOKEN_TTL_SECS);

        let over = (MAX_TOKEN_TTL_SECS + 1).to_string();
        assert!(AppConfig::default()
            .with_overrides(lookup(&[("JWT_ACCESS_TOKEN_EXPIRES", &over)]))
            .is_err());
    }

    #[test]
    fn test_token_lifetime_checked_for_files() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            access_ttl_secs = 0
            "#,
        )
        .unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "JWT_ACCESS_TOKEN_EXPIRES"));
    }

    #[test]
    fn test_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [auth]
            issuer = "test"
            transport = "cookies"
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.issuer, "test");
        assert_eq!(config.auth.transport, TokenTransport::Cookies);
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn test_secret_redacted_in_debug() {
        let mut config = AuthConfig::default();
        config.secret = Some("hunter2".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
