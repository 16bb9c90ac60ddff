/// Authentication middleware for protecting routes
///
/// Extracts a token from the request (Bearer header first, then the
/// kind-specific cookie), validates it through the `AuthService` and, on
/// success, adds the authenticated subject to request extensions.
use super::jwt::TokenKind;
use super::service::{AuthError, AuthService};
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use muse_core::ErrorBody;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Cookie carrying the access token in cookie transport
pub const ACCESS_COOKIE: &str = "access_token_cookie";

/// Cookie carrying the refresh token in cookie transport
pub const REFRESH_COOKIE: &str = "refresh_token_cookie";

/// Cookie name for a token kind
pub fn cookie_name(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Access => ACCESS_COOKIE,
        TokenKind::Refresh => REFRESH_COOKIE,
    }
}

/// Authenticated subject extracted from a validated access token
///
/// Added to request extensions by `require_access`; extract it in handlers
/// with `Extension<AuthenticatedUser>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Username the token was issued to
    pub subject: String,
    /// `jti` of the presented token
    pub token_id: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        if !self.is_client_error() {
            tracing::error!(error = %self, "Authentication backend failure");
        }

        let message = match &self {
            // Do not leak storage details to clients
            AuthError::Storage(_) => "Credential storage unavailable".to_string(),
            AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody {
            code: self.code(),
            message,
            status: status.as_u16(),
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

/// Read a cookie value from the `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Find the token for `kind`, if any was presented
///
/// Header first, then cookie. An `Authorization` header that is not a
/// well-formed Bearer credential is reported as malformed rather than
/// silently ignored.
pub fn extract_token(headers: &HeaderMap, kind: TokenKind) -> Result<Option<String>, AuthError> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().map_err(|_| AuthError::TokenMalformed)?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::TokenMalformed)?;
        return Ok(Some(token.to_string()));
    }

    Ok(read_cookie(headers, cookie_name(kind)))
}

/// Extract and validate the token required for `kind`
///
/// # Returns
///
/// * `Ok(AuthenticatedUser)` - Subject of a valid, unrevoked token of `kind`
/// * `Err(AuthError)` - `TokenMissing` when nothing was presented, otherwise
///   the classification from the service
pub async fn authorize(
    auth: &AuthService,
    headers: &HeaderMap,
    now: DateTime<Utc>,
    kind: TokenKind,
) -> Result<AuthenticatedUser, AuthError> {
    let token = extract_token(headers, kind)?.ok_or(AuthError::TokenMissing)?;
    let claims = auth.validate(&token, now, kind).await?;

    Ok(AuthenticatedUser {
        subject: claims.sub,
        token_id: claims.jti,
    })
}

/// Record a refused credential in the audit log
pub fn audit_rejection(headers: &HeaderMap, path: &str, error: &AuthError) {
    if !error.is_client_error() {
        return;
    }
    audit_log(&AuditEvent::TokenRejected {
        reason: error.code().to_string(),
        path: path.to_string(),
        ip_address: extract_ip_address(headers),
        user_agent: extract_user_agent(headers),
    });
}

/// Middleware that requires a valid access token
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
/// use muse_api::auth::middleware::require_access;
///
/// let protected = Router::new()
///     .route("/tokenize", get(tokenize))
///     .route_layer(middleware::from_fn_with_state(state.clone(), require_access));
/// ```
pub async fn require_access(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let now = state.now();

    match authorize(&state.auth, request.headers(), now, TokenKind::Access).await {
        Ok(user) => {
            tracing::debug!(subject = %user.subject, "Request authenticated");
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(e) => {
            audit_rejection(request.headers(), request.uri().path(), &e);
            Err(e)
        }
    }
}

/// `Set-Cookie` value storing `token`
pub fn token_cookie(kind: TokenKind, token: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        cookie_name(kind),
        token,
        max_age_secs.max(0)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value deleting the cookie for `kind`
pub fn clear_cookie(kind: TokenKind, secure: bool) -> String {
    token_cookie(kind, "", 0, secure)
}
