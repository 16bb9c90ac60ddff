//! OpenAPI document served under `/api-docs/openapi.json`
//!
//! Author: hephaex@gmail.com

use crate::auth::TokenKind;
use crate::handlers::{auth, health, inference};
use muse_core::ErrorBody;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MUSE as a Service",
        description = "Tokenize and embed sentences behind JWT sessions"
    ),
    paths(
        auth::login_handler,
        auth::logout_handler,
        auth::logout_access_handler,
        auth::logout_refresh_handler,
        auth::refresh_handler,
        inference::tokenize_handler,
        inference::embed_handler,
        health::health_check,
        health::readiness_check,
    ),
    components(schemas(
        auth::LoginRequest,
        auth::LoginResponse,
        auth::RefreshResponse,
        auth::LogoutRequest,
        auth::LogoutResponse,
        auth::LogoutFailureInfo,
        TokenKind,
        inference::TokenizeResponse,
        inference::EmbedResponse,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
        ErrorBody,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login, logout and token refresh"),
        (name = "inference", description = "Protected tokenize and embed endpoints"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
