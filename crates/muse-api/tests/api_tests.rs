//! API Integration Tests
//!
//! Drive the full router with `oneshot` over an in-memory database seeded
//! with `admin`/`admin`. Time is controlled through the context's
//! `ManualClock`.
//!
//! Author: hephaex@gmail.com

use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
};
use chrono::Duration;
use muse_api::auth::{RevokedTokenRepository, TokenCodec, TokenConfig, TokenKind};
use muse_api::spawn_revocation_pruner;
use muse_api::testing::{
    create_router_for_testing, create_router_for_testing_with, test_config, TestContext,
    TEST_PASSWORD, TEST_USERNAME,
};
use muse_core::{Clock, ErrorCode, TokenTransport};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashSet;
use tower::ServiceExt;

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl TestResponse {
    fn code(&self) -> ErrorCode {
        serde_json::from_value(self.body["code"].clone()).unwrap()
    }
}

async fn send(ctx: &TestContext, request: Request<Body>) -> TestResponse {
    let response = ctx.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Helper to create a JSON request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn bearer(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn login(ctx: &TestContext) -> (String, String) {
    let response = send(
        ctx,
        create_json_request(
            "POST",
            "/login",
            Some(json!({"username": TEST_USERNAME, "password": TEST_PASSWORD})),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);

    (
        response.body["access_token"].as_str().unwrap().to_string(),
        response.body["refresh_token"].as_str().unwrap().to_string(),
    )
}

async fn tokenize(ctx: &TestContext, token: &str) -> TestResponse {
    send(ctx, bearer("GET", "/tokenize?sentence=Hello.", token)).await
}

async fn refresh(ctx: &TestContext, refresh_token: &str) -> TestResponse {
    send(ctx, bearer("POST", "/token/refresh", refresh_token)).await
}

async fn revoked_count(ctx: &TestContext) -> i64 {
    RevokedTokenRepository::new(ctx.state.db_pool.clone())
        .count()
        .await
        .unwrap()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let ctx = create_router_for_testing().await;

    let response = send(
        &ctx,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
    assert!(response.body["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let ctx = create_router_for_testing().await;

    let response = send(
        &ctx,
        Request::builder().uri("/ready").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ready"], true);
    assert_eq!(response.body["checks"]["database"], true);
}

// =============================================================================
// Session Scenarios
// =============================================================================

#[tokio::test]
async fn test_login_then_tokenize() {
    let ctx = create_router_for_testing().await;
    let (access, refresh_token) = login(&ctx).await;
    assert_ne!(access, refresh_token);

    let response = tokenize(&ctx, &access).await;
    assert_eq!(response.status, StatusCode::OK);

    let tokens = response.body["tokens"].as_array().unwrap();
    assert_eq!(tokens.len(), 1);
    assert!(!tokens[0].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_password_issues_nothing() {
    let ctx = create_router_for_testing().await;

    let wrong_password = send(
        &ctx,
        create_json_request(
            "POST",
            "/login",
            Some(json!({"username": "admin", "password": "wrong"})),
        ),
    )
    .await;
    let unknown_user = send(
        &ctx,
        create_json_request(
            "POST",
            "/login",
            Some(json!({"username": "ghost", "password": "admin"})),
        ),
    )
    .await;

    for response in [&wrong_password, &unknown_user] {
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.code(), ErrorCode::InvalidCredentials);
        assert!(response.body.get("access_token").is_none());
    }
    // Same answer whether or not the user exists
    assert_eq!(wrong_password.body, unknown_user.body);
    assert_eq!(revoked_count(&ctx).await, 0);
}

#[tokio::test]
async fn test_logout_revokes_both_tokens() {
    let ctx = create_router_for_testing().await;
    let (access, refresh_token) = login(&ctx).await;

    let mut request = create_json_request(
        "POST",
        "/logout",
        Some(json!({"refresh_token": refresh_token})),
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {access}").parse().unwrap(),
    );
    let response = send(&ctx, request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["revoked"], 2);
    assert_eq!(revoked_count(&ctx).await, 2);

    let response = tokenize(&ctx, &access).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), ErrorCode::TokenRevoked);

    let response = refresh(&ctx, &refresh_token).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), ErrorCode::TokenRevoked);
}

#[tokio::test]
async fn test_expired_access_recovers_through_refresh() {
    let ctx = create_router_for_testing().await;
    let (access, refresh_token) = login(&ctx).await;

    ctx.clock.advance(Duration::hours(25));

    let response = tokenize(&ctx, &access).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), ErrorCode::TokenExpired);

    let response = refresh(&ctx, &refresh_token).await;
    assert_eq!(response.status, StatusCode::OK);
    let new_access = response.body["access_token"].as_str().unwrap().to_string();
    assert!(response.body.get("refresh_token").is_none());

    let response = tokenize(&ctx, &new_access).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_without_tokens_succeeds() {
    let ctx = create_router_for_testing().await;

    let response = send(&ctx, create_json_request("POST", "/logout", None)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["revoked"], 0);
    assert_eq!(revoked_count(&ctx).await, 0);

    for path in ["/logout/access", "/logout/refresh"] {
        let response = send(&ctx, create_json_request("POST", path, None)).await;
        assert_eq!(response.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let ctx = create_router_for_testing().await;
    let (access, _) = login(&ctx).await;

    for _ in 0..3 {
        let response = send(&ctx, bearer("POST", "/logout/access", &access)).await;
        assert_eq!(response.status, StatusCode::OK);
    }
    assert_eq!(revoked_count(&ctx).await, 1);
}

// =============================================================================
// Token Classification
// =============================================================================

#[tokio::test]
async fn test_kind_isolation() {
    let ctx = create_router_for_testing().await;
    let (access, refresh_token) = login(&ctx).await;

    let response = tokenize(&ctx, &refresh_token).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), ErrorCode::TokenWrongKind);

    let response = refresh(&ctx, &access).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), ErrorCode::TokenWrongKind);
}

#[tokio::test]
async fn test_expired_and_revoked_are_distinguished() {
    let ctx = create_router_for_testing().await;
    let (revoked_access, _) = login(&ctx).await;
    let (expired_access, _) = login(&ctx).await;

    send(&ctx, bearer("POST", "/logout/access", &revoked_access)).await;

    // Revoked but not expired
    assert_eq!(
        tokenize(&ctx, &revoked_access).await.code(),
        ErrorCode::TokenRevoked
    );

    ctx.clock.advance(Duration::hours(24));

    // Expired, never revoked
    assert_eq!(
        tokenize(&ctx, &expired_access).await.code(),
        ErrorCode::TokenExpired
    );
    // Expiry is reported before revocation
    assert_eq!(
        tokenize(&ctx, &revoked_access).await.code(),
        ErrorCode::TokenExpired
    );
}

#[tokio::test]
async fn test_refresh_does_not_rotate_refresh_token() {
    let ctx = create_router_for_testing().await;
    let (access, refresh_token) = login(&ctx).await;

    let a2 = refresh(&ctx, &refresh_token).await;
    let a3 = refresh(&ctx, &refresh_token).await;
    assert_eq!(a2.status, StatusCode::OK);
    assert_eq!(a3.status, StatusCode::OK);

    let a2 = a2.body["access_token"].as_str().unwrap().to_string();
    let a3 = a3.body["access_token"].as_str().unwrap().to_string();
    assert_ne!(a2, a3);
    assert_ne!(a2, access);

    for token in [&access, &a2, &a3] {
        assert_eq!(tokenize(&ctx, token).await.status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_refresh_token_expires() {
    let ctx = create_router_for_testing().await;
    let (_, refresh_token) = login(&ctx).await;

    ctx.clock.advance(Duration::days(30));

    let response = refresh(&ctx, &refresh_token).await;
    assert_eq!(response.code(), ErrorCode::TokenExpired);
}

#[tokio::test]
async fn test_missing_malformed_and_forged_tokens() {
    let ctx = create_router_for_testing().await;

    let response = send(
        &ctx,
        Request::builder()
            .uri("/tokenize?sentence=Hello.")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.code(), ErrorCode::TokenMissing);

    let response = tokenize(&ctx, "not.a.token").await;
    assert_eq!(response.code(), ErrorCode::TokenMalformed);

    let forger = TokenCodec::new(TokenConfig {
        secret: "someone-elses-secret".to_string(),
        ..TokenConfig::default()
    });
    let forged = forger
        .issue(TEST_USERNAME, TokenKind::Access, ctx.clock.now())
        .unwrap();
    let response = tokenize(&ctx, &forged.token).await;
    assert_eq!(response.code(), ErrorCode::TokenBadSignature);

    let response = refresh(&ctx, &forged.token).await;
    assert_eq!(response.code(), ErrorCode::TokenBadSignature);
}

#[tokio::test]
async fn test_error_body_shape() {
    let ctx = create_router_for_testing().await;
    let response = tokenize(&ctx, "garbage").await;

    assert_eq!(response.body["code"], "TOKEN_MALFORMED");
    assert_eq!(response.body["status"], 401);
    assert!(response.body["message"].is_string());
}

// =============================================================================
// Request Validation
// =============================================================================

#[tokio::test]
async fn test_malformed_login_is_bad_request() {
    let ctx = create_router_for_testing().await;

    let response = send(
        &ctx,
        Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), ErrorCode::BadRequest);

    let response = send(
        &ctx,
        create_json_request("POST", "/login", Some(json!({"username": "admin"}))),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = send(
        &ctx,
        create_json_request(
            "POST",
            "/login",
            Some(json!({"username": "", "password": "admin"})),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_sentence_is_bad_request() {
    let ctx = create_router_for_testing().await;
    let (access, _) = login(&ctx).await;

    let response = send(&ctx, bearer("GET", "/embed", &access)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.code(), ErrorCode::BadRequest);
}

#[tokio::test]
async fn test_multiple_sentences() {
    let ctx = create_router_for_testing().await;
    let (access, _) = login(&ctx).await;

    let response = send(
        &ctx,
        bearer(
            "GET",
            "/tokenize?sentence=This%20is%20sentence%20example.&sentence=Hello.",
            &access,
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    let tokens = response.body["tokens"].as_array().unwrap();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].as_array().unwrap().len(), 5);
    assert_eq!(tokens[0][4], ".");

    let response = send(
        &ctx,
        bearer("GET", "/embed?sentence=one&sentence=two&sentence=three", &access),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);
    let embedding = response.body["embedding"].as_array().unwrap();
    assert_eq!(embedding.len(), 3);
    for vector in embedding {
        assert_eq!(
            vector.as_array().unwrap().len(),
            ctx.state.config.inference.dimension
        );
    }
}

// =============================================================================
// Split Logout
// =============================================================================

#[tokio::test]
async fn test_logout_access_keeps_refresh_usable() {
    let ctx = create_router_for_testing().await;
    let (access, refresh_token) = login(&ctx).await;

    let response = send(&ctx, bearer("POST", "/logout/access", &access)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(tokenize(&ctx, &access).await.code(), ErrorCode::TokenRevoked);

    let response = refresh(&ctx, &refresh_token).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = send(&ctx, bearer("POST", "/logout/refresh", &refresh_token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        refresh(&ctx, &refresh_token).await.code(),
        ErrorCode::TokenRevoked
    );
}

#[tokio::test]
async fn test_split_logout_reports_wrong_kind() {
    let ctx = create_router_for_testing().await;
    let (access, _) = login(&ctx).await;

    let response = send(&ctx, bearer("POST", "/logout/refresh", &access)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["revoked"], 0);
    assert_eq!(response.body["failures"][0]["code"], "TOKEN_WRONG_KIND");
    assert_eq!(tokenize(&ctx, &access).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_logout_reports_malformed_authorization_header() {
    let ctx = create_router_for_testing().await;
    let (access, _) = login(&ctx).await;

    let request = Request::builder()
        .method("POST")
        .uri("/logout/access")
        .header(header::AUTHORIZATION, format!("Token {access}"))
        .body(Body::empty())
        .unwrap();
    let response = send(&ctx, request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "Logged out with errors");
    assert_eq!(response.body["revoked"], 0);
    assert_eq!(response.body["failures"][0]["kind"], "access");
    assert_eq!(response.body["failures"][0]["code"], "TOKEN_MALFORMED");
    assert_eq!(revoked_count(&ctx).await, 0);
}

#[tokio::test]
async fn test_logout_uses_cookie_behind_malformed_header() {
    let ctx = create_router_for_testing().await;
    let (access, refresh_token) = login(&ctx).await;

    let request = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(header::AUTHORIZATION, "Bearer")
        .header(
            header::COOKIE,
            format!("access_token_cookie={access}; refresh_token_cookie={refresh_token}"),
        )
        .body(Body::empty())
        .unwrap();
    let response = send(&ctx, request).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["revoked"], 2);
    assert_eq!(response.body["failures"].as_array().unwrap().len(), 0);
    assert_eq!(tokenize(&ctx, &access).await.code(), ErrorCode::TokenRevoked);
}

// =============================================================================
// Cookie Transport
// =============================================================================

fn cookie_pair(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&format!("{name}=")))
        .and_then(|v| v.split(';').next())
        .map(|v| v.to_string())
}

#[tokio::test]
async fn test_cookie_transport_session() {
    let mut config = test_config();
    config.auth.transport = TokenTransport::Cookies;
    let ctx = create_router_for_testing_with(config).await;

    let response = send(
        &ctx,
        create_json_request(
            "POST",
            "/login",
            Some(json!({"username": TEST_USERNAME, "password": TEST_PASSWORD})),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::OK);

    let access_cookie = cookie_pair(&response.headers, "access_token_cookie").unwrap();
    let refresh_cookie = cookie_pair(&response.headers, "refresh_token_cookie").unwrap();
    let jar = format!("{access_cookie}; {refresh_cookie}");

    let set_cookie = response
        .headers
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.contains("HttpOnly"));

    let with_jar = |method: &str, uri: &str| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, jar.clone())
            .body(Body::empty())
            .unwrap()
    };

    let response = send(&ctx, with_jar("GET", "/tokenize?sentence=Hello.")).await;
    assert_eq!(response.status, StatusCode::OK);

    // Refresh picks the refresh cookie even though both are present
    let response = send(&ctx, with_jar("POST", "/token/refresh")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(cookie_pair(&response.headers, "access_token_cookie").is_some());

    let response = send(&ctx, with_jar("POST", "/logout")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["revoked"], 2);
    assert_eq!(
        cookie_pair(&response.headers, "access_token_cookie").as_deref(),
        Some("access_token_cookie=")
    );

    let response = send(&ctx, with_jar("GET", "/tokenize?sentence=Hello.")).await;
    assert_eq!(response.code(), ErrorCode::TokenRevoked);
}

#[tokio::test]
async fn test_header_mode_sets_no_cookies() {
    let ctx = create_router_for_testing().await;
    let response = send(
        &ctx,
        create_json_request(
            "POST",
            "/login",
            Some(json!({"username": TEST_USERNAME, "password": TEST_PASSWORD})),
        ),
    )
    .await;
    assert!(response.headers.get(header::SET_COOKIE).is_none());
    assert_eq!(response.headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
}

// =============================================================================
// Revocation Pruning
// =============================================================================

#[tokio::test]
async fn test_pruner_removes_only_expired_revocations() {
    let ctx = create_router_for_testing().await;
    let codec = ctx.state.auth.codec().clone();

    // Expires at t0 + 24h
    let (early, _) = login(&ctx).await;
    send(&ctx, bearer("POST", "/logout/access", &early)).await;

    // Expires at t0 + 36h
    ctx.clock.advance(Duration::hours(12));
    let (late, _) = login(&ctx).await;
    send(&ctx, bearer("POST", "/logout/access", &late)).await;
    assert_eq!(revoked_count(&ctx).await, 2);

    ctx.clock.advance(Duration::hours(18));
    let pruner = spawn_revocation_pruner(
        ctx.state.auth.clone(),
        ctx.state.clock.clone(),
        std::time::Duration::from_millis(10),
    );

    for _ in 0..500 {
        if revoked_count(&ctx).await == 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    pruner.abort();

    let repo = RevokedTokenRepository::new(ctx.state.db_pool.clone());
    let early_id = codec.decode_signed(&early).unwrap().jti;
    let late_id = codec.decode_signed(&late).unwrap().jti;

    assert_eq!(repo.count().await.unwrap(), 1);
    assert!(repo.find(&early_id).await.unwrap().is_none());
    assert!(repo.find(&late_id).await.unwrap().is_some());
    assert_eq!(tokenize(&ctx, &late).await.code(), ErrorCode::TokenRevoked);
    assert_eq!(tokenize(&ctx, &early).await.code(), ErrorCode::TokenExpired);
}

#[tokio::test]
async fn test_pruner_keeps_unexpired_revocations() {
    let ctx = create_router_for_testing().await;
    let (access, refresh_token) = login(&ctx).await;
    send(
        &ctx,
        create_json_request(
            "POST",
            "/logout",
            Some(json!({"access_token": access, "refresh_token": refresh_token})),
        ),
    )
    .await;

    ctx.clock.advance(Duration::hours(23));
    let pruner = spawn_revocation_pruner(
        ctx.state.auth.clone(),
        ctx.state.clock.clone(),
        std::time::Duration::from_millis(10),
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    pruner.abort();

    assert_eq!(revoked_count(&ctx).await, 2);
    assert_eq!(tokenize(&ctx, &access).await.code(), ErrorCode::TokenRevoked);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn issued_token_ids_are_unique(
        requests in prop::collection::vec((any::<bool>(), "[a-z]{1,8}"), 1..64)
    ) {
        let codec = TokenCodec::new(TokenConfig::default());
        let now = chrono::Utc::now();
        let mut ids = HashSet::new();

        for (is_access, subject) in &requests {
            let kind = if *is_access { TokenKind::Access } else { TokenKind::Refresh };
            let issued = codec.issue(subject, kind, now).unwrap();
            prop_assert!(ids.insert(issued.id));
        }
        prop_assert_eq!(ids.len(), requests.len());
    }
}
