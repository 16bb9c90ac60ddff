//! Authentication and session module
//!
//! This module provides JWT-based sessions with the following components:
//! - Token codec (issue, decode, kind and expiry checks)
//! - Password hashing with Argon2
//! - Credential and revocation stores backed by SQLite
//! - Authentication service for login, logout and refresh
//! - Middleware for request authentication

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;

pub use jwt::{Claims, IssuedToken, TokenCodec, TokenConfig, TokenError, TokenKind};
pub use middleware::{authorize, extract_token, require_access, AuthenticatedUser};
pub use models::{RevokedToken, User};
pub use password::{hash_password, verify_password, PasswordConfig};
pub use repository::{
    CredentialStore, RepositoryError, RevocationStore, RevokedTokenRepository, UserRepository,
};
pub use service::{AuthError, AuthService, LogoutOutcome, RefreshedAccess, TokenPair};
