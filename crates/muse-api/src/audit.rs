//! Security audit logging for session events
//!
//! Provides structured audit logging for logins, logouts, access token
//! refreshes and rejected credentials.
//!
//! All audit events are logged at INFO level with the "audit" target,
//! making them easy to filter and route to security monitoring systems.
//! Events carry usernames and token ids only; passwords, hashes and raw
//! tokens never reach this module.
//!
//! # Example
//!
//! ```ignore
//! use muse_api::audit::{AuditEvent, audit_log};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     username: "admin".to_string(),
//!     access_token_id: issued.access.id.clone(),
//!     refresh_token_id: issued.refresh.id.clone(),
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: None,
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Successful login, a token pair was issued
    LoginSuccess {
        username: String,
        access_token_id: String,
        refresh_token_id: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Failed login attempt
    LoginFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// Tokens revoked through a logout endpoint
    Logout {
        subject: Option<String>,
        revoked_token_ids: Vec<String>,
        failures: usize,
        ip_address: Option<String>,
    },

    /// New access token minted from a refresh token
    TokenRefresh {
        subject: String,
        refresh_token_id: String,
        access_token_id: String,
        ip_address: Option<String>,
    },

    /// A presented credential was refused
    TokenRejected {
        reason: String,
        path: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },
}

/// Log a security audit event with structured fields
///
/// The event is also serialized to JSON for log aggregators, e.g.
///
/// ```json
/// {
///   "event_type": "token_rejected",
///   "reason": "TOKEN_EXPIRED",
///   "path": "/tokenize",
///   "ip_address": "192.168.1.1",
///   "user_agent": null
/// }
/// ```
pub fn audit_log(event: &AuditEvent) {
    let timestamp = Utc::now();

    let event_json = serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize audit event: {e}\"}}"));

    match event {
        AuditEvent::LoginSuccess {
            username,
            access_token_id,
            refresh_token_id,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                access_token_id = %access_token_id,
                refresh_token_id = %refresh_token_id,
                ip_address = ?ip_address,
                "Login successful"
            );
        }
        AuditEvent::LoginFailure {
            username,
            reason,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                username = %username,
                reason = %reason,
                ip_address = ?ip_address,
                "Login failed"
            );
        }
        AuditEvent::Logout {
            subject,
            revoked_token_ids,
            failures,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                subject = ?subject,
                revoked = revoked_token_ids.len(),
                failures = %failures,
                ip_address = ?ip_address,
                "Logout"
            );
        }
        AuditEvent::TokenRefresh {
            subject,
            refresh_token_id,
            access_token_id,
            ip_address,
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                subject = %subject,
                refresh_token_id = %refresh_token_id,
                access_token_id = %access_token_id,
                ip_address = ?ip_address,
                "Access token refreshed"
            );
        }
        AuditEvent::TokenRejected {
            reason,
            path,
            ip_address,
            ..
        } => {
            info!(
                target: "audit",
                timestamp = %timestamp,
                event = %event_json,
                reason = %reason,
                path = %path,
                ip_address = ?ip_address,
                "Token rejected"
            );
        }
    }
}

/// Extract the client IP from proxy headers
///
/// Checks X-Forwarded-For, then X-Real-IP. Connection info is not consulted.
pub fn extract_ip_address(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(first_ip) = headers
        .get("x-forwarded-for")
        .and_then(|xff| xff.to_str().ok())
        .and_then(|xff| xff.split(',').next())
    {
        return Some(first_ip.trim().to_string());
    }

    headers
        .get("x-real-ip")
        .and_then(|ip| ip.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}
