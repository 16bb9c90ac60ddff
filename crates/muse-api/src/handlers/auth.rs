//! Session API handlers
//!
//! Login, logout and access token refresh. In cookie transport the tokens
//! are also set as (and cleared from) HttpOnly cookies.
//!
//! Author: hephaex@gmail.com

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::middleware::{
    audit_rejection, clear_cookie, cookie_name, extract_token, read_cookie, token_cookie,
    REFRESH_COOKIE,
};
use crate::auth::service::LogoutFailure;
use crate::auth::{AuthError, IssuedToken, LogoutOutcome, TokenKind};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, HeaderName},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 150, message = "username must be 1-150 characters"))]
    pub username: String,
    #[validate(length(min = 1, max = 1024, message = "password must be 1-1024 characters"))]
    pub password: String,
}

/// Token pair returned by login
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
}

/// Access token returned by refresh
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Optional logout body for header transport
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// A presented token that was not revoked
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutFailureInfo {
    pub kind: TokenKind,
    pub code: String,
}

/// Logout response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutResponse {
    pub message: String,
    /// Number of tokens revoked by this call
    pub revoked: usize,
    pub failures: Vec<LogoutFailureInfo>,
}

fn seconds_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().max(0)
}

fn set_token_cookie(
    state: &AppState,
    kind: TokenKind,
    issued: &IssuedToken,
    now: DateTime<Utc>,
) -> (HeaderName, String) {
    (
        header::SET_COOKIE,
        token_cookie(
            kind,
            &issued.token,
            seconds_until(issued.expires_at, now),
            state.config.auth.cookie_secure,
        ),
    )
}

/// Login with username and password
///
/// # Responses
///
/// * `200 OK` - Returns an access and a refresh token
/// * `400 Bad Request` - Body is not a valid login request
/// * `401 Unauthorized` - Invalid credentials (unknown user or wrong password)
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Invalid request", body = muse_core::ErrorBody),
        (status = 401, description = "Invalid credentials", body = muse_core::ErrorBody),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    request.validate()?;

    let now = state.now();
    let pair = match state.auth.login(&request.username, &request.password, now).await {
        Ok(pair) => pair,
        Err(e) => {
            if e.is_client_error() {
                audit_log(&AuditEvent::LoginFailure {
                    username: request.username.clone(),
                    reason: e.code().to_string(),
                    ip_address: extract_ip_address(&headers),
                    user_agent: extract_user_agent(&headers),
                });
            }
            return Err(e.into());
        }
    };

    audit_log(&AuditEvent::LoginSuccess {
        username: request.username,
        access_token_id: pair.access.id.clone(),
        refresh_token_id: pair.refresh.id.clone(),
        ip_address: extract_ip_address(&headers),
        user_agent: extract_user_agent(&headers),
    });

    let cookies = if state.uses_cookies() {
        vec![
            set_token_cookie(&state, TokenKind::Access, &pair.access, now),
            set_token_cookie(&state, TokenKind::Refresh, &pair.refresh, now),
        ]
    } else {
        Vec::new()
    };

    let body = LoginResponse {
        expires_in: seconds_until(pair.access.expires_at, now),
        access_token: pair.access.token,
        refresh_token: pair.refresh.token,
        token_type: "Bearer".to_string(),
    };

    Ok((AppendHeaders(cookies), Json(body)).into_response())
}

/// Mint a new access token from a refresh token
///
/// The refresh token travels as `Authorization: Bearer` or in
/// `refresh_token_cookie`. It is not rotated.
#[utoipa::path(
    post,
    path = "/token/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "New access token", body = RefreshResponse),
        (status = 401, description = "Refresh token missing, expired, revoked or of the wrong kind", body = muse_core::ErrorBody),
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let now = state.now();

    let result = match extract_token(&headers, TokenKind::Refresh) {
        Ok(Some(token)) => state.auth.refresh(&token, now).await,
        Ok(None) => Err(AuthError::TokenMissing),
        Err(e) => Err(e),
    };

    let refreshed = match result {
        Ok(refreshed) => refreshed,
        Err(e) => {
            audit_rejection(&headers, "/token/refresh", &e);
            return Err(e.into());
        }
    };

    audit_log(&AuditEvent::TokenRefresh {
        subject: refreshed.subject.clone(),
        refresh_token_id: refreshed.refresh_token_id.clone(),
        access_token_id: refreshed.access.id.clone(),
        ip_address: extract_ip_address(&headers),
    });

    let cookies = if state.uses_cookies() {
        vec![set_token_cookie(&state, TokenKind::Access, &refreshed.access, now)]
    } else {
        Vec::new()
    };

    let body = RefreshResponse {
        expires_in: seconds_until(refreshed.access.expires_at, now),
        access_token: refreshed.access.token,
        token_type: "Bearer".to_string(),
    };

    Ok((AppendHeaders(cookies), Json(body)).into_response())
}

fn logout_response(
    state: &AppState,
    headers: &HeaderMap,
    outcome: LogoutOutcome,
    cleared: &[TokenKind],
) -> Response {
    audit_log(&AuditEvent::Logout {
        subject: outcome.subject.clone(),
        revoked_token_ids: outcome.revoked_ids(),
        failures: outcome.failures.len(),
        ip_address: extract_ip_address(headers),
    });

    let message = if outcome.revoked.is_empty() && outcome.failures.is_empty() {
        "No tokens presented".to_string()
    } else if outcome.is_complete() {
        "Successfully logged out".to_string()
    } else {
        "Logged out with errors".to_string()
    };

    let body = LogoutResponse {
        message,
        revoked: outcome.revoked.len(),
        failures: outcome
            .failures
            .iter()
            .map(|f| LogoutFailureInfo {
                kind: f.kind,
                code: f.error.code().to_string(),
            })
            .collect(),
    };

    let cookies: Vec<(HeaderName, String)> = if state.uses_cookies() {
        cleared
            .iter()
            .map(|kind| {
                (
                    header::SET_COOKIE,
                    clear_cookie(*kind, state.config.auth.cookie_secure),
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    (AppendHeaders(cookies), Json(body)).into_response()
}

/// Revoke the access and/or refresh token
///
/// Tolerant of missing tokens: logging out with nothing presented succeeds.
/// Tokens may come from the optional JSON body, the Bearer header (access)
/// or the cookies.
#[utoipa::path(
    post,
    path = "/logout",
    tag = "auth",
    request_body(content = LogoutRequest, description = "Optional; tokens to revoke when not sent as header or cookies"),
    responses(
        (status = 200, description = "Logout processed", body = LogoutResponse),
        (status = 500, description = "Revocation store unavailable", body = muse_core::ErrorBody),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<LogoutRequest>>,
) -> Result<Response, AppError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let (access, header_error) = match body.access_token {
        Some(token) => (Some(token), None),
        None => presented_token(&headers, TokenKind::Access),
    };
    let refresh = body
        .refresh_token
        .or_else(|| read_cookie(&headers, REFRESH_COOKIE));

    let mut outcome = state
        .auth
        .logout(access.as_deref(), refresh.as_deref(), state.now())
        .await?;
    record_unreadable(&mut outcome, TokenKind::Access, header_error);

    Ok(logout_response(
        &state,
        &headers,
        outcome,
        &[TokenKind::Access, TokenKind::Refresh],
    ))
}

/// Token of `kind` for logout, plus the error of an unreadable `Authorization` header
///
/// A malformed header does not hide the cookie.
fn presented_token(headers: &HeaderMap, kind: TokenKind) -> (Option<String>, Option<AuthError>) {
    match extract_token(headers, kind) {
        Ok(token) => (token, None),
        Err(e) => (read_cookie(headers, cookie_name(kind)), Some(e)),
    }
}

/// Report a malformed header as a failure unless a cookie stood in for it
fn record_unreadable(outcome: &mut LogoutOutcome, kind: TokenKind, error: Option<AuthError>) {
    let Some(error) = error else { return };
    let covered = outcome.revoked.iter().any(|(k, _)| *k == kind)
        || outcome.failures.iter().any(|f| f.kind == kind);
    if !covered {
        outcome.failures.push(LogoutFailure { kind, error });
    }
}

async fn logout_single(
    state: &AppState,
    headers: &HeaderMap,
    kind: TokenKind,
) -> Result<Response, AppError> {
    let (token, header_error) = presented_token(headers, kind);
    let now = state.now();

    let mut outcome = match kind {
        TokenKind::Access => state.auth.logout(token.as_deref(), None, now).await?,
        TokenKind::Refresh => state.auth.logout(None, token.as_deref(), now).await?,
    };
    record_unreadable(&mut outcome, kind, header_error);

    Ok(logout_response(state, headers, outcome, &[kind]))
}

/// Revoke only the access token
#[utoipa::path(
    post,
    path = "/logout/access",
    tag = "auth",
    responses(
        (status = 200, description = "Logout processed", body = LogoutResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_access_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    logout_single(&state, &headers, TokenKind::Access).await
}

/// Revoke only the refresh token
#[utoipa::path(
    post,
    path = "/logout/refresh",
    tag = "auth",
    responses(
        (status = 200, description = "Logout processed", body = LogoutResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    logout_single(&state, &headers, TokenKind::Refresh).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_login_request_validation() {
        let valid = LoginRequest {
            username: "admin".to_string(),
            password: "admin".to_string(),
        };
        assert!(valid.validate().is_ok());

        let empty = LoginRequest {
            username: String::new(),
            password: "admin".to_string(),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_seconds_until_never_negative() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(seconds_until(now + Duration::hours(24), now), 86_400);
        assert_eq!(seconds_until(now - Duration::seconds(5), now), 0);
    }

    #[test]
    fn test_malformed_header_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Token abc".parse().unwrap());

        let (token, error) = presented_token(&headers, TokenKind::Access);
        assert!(token.is_none());
        assert_eq!(error, Some(AuthError::TokenMalformed));

        headers.insert(header::COOKIE, "access_token_cookie=from-cookie".parse().unwrap());
        let (token, error) = presented_token(&headers, TokenKind::Access);
        assert_eq!(token.as_deref(), Some("from-cookie"));
        assert_eq!(error, Some(AuthError::TokenMalformed));
    }

    #[test]
    fn test_unreadable_header_reported_once() {
        let mut outcome = LogoutOutcome::default();
        record_unreadable(&mut outcome, TokenKind::Access, Some(AuthError::TokenMalformed));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].error.code(), muse_core::ErrorCode::TokenMalformed);

        // A cookie token already accounted for the slot
        let mut outcome = LogoutOutcome::default();
        outcome.revoked.push((TokenKind::Access, "jti".to_string()));
        record_unreadable(&mut outcome, TokenKind::Access, Some(AuthError::TokenMalformed));
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_logout_request_defaults_to_nothing() {
        let request: LogoutRequest = serde_json::from_str("{}").unwrap();
        assert!(request.access_token.is_none());
        assert!(request.refresh_token.is_none());
    }
}
