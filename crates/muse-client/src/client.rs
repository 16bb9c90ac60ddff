//! HTTP client for the MUSE API
//!
//! Author: hephaex@gmail.com

use crate::error::ClientError;
use crate::session::{ClientSession, SessionTokens};
use muse_core::ErrorBody;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct LoginReply {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct RefreshReply {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenizeReply {
    tokens: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct EmbedReply {
    embedding: Vec<Vec<f32>>,
}

/// Per-token failure reported by the server on logout
#[derive(Debug, Clone, Deserialize)]
pub struct LogoutFailure {
    pub kind: String,
    pub code: String,
}

/// Server's summary of a logout
#[derive(Debug, Clone, Deserialize)]
pub struct LogoutSummary {
    pub message: String,
    pub revoked: usize,
    #[serde(default)]
    pub failures: Vec<LogoutFailure>,
}

/// Session-aware client
///
/// Protected calls transparently refresh an expired access token once and
/// retry; any other failure is returned to the caller.
pub struct MuseClient {
    http: reqwest::Client,
    base_url: String,
    session: ClientSession,
}

impl MuseClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http(reqwest::Client::new(), base_url)
    }

    /// Client whose requests give up after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http(http, base_url))
    }

    fn with_http(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: ClientSession::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange credentials for a token pair and store it
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;

        let reply: LoginReply = decode(response).await?;
        self.session
            .store(SessionTokens {
                access_token: reply.access_token,
                refresh_token: reply.refresh_token,
            })
            .await;

        tracing::debug!(username, "Logged in");
        Ok(())
    }

    /// Revoke both tokens and forget them
    ///
    /// Succeeds without contacting revocation when not logged in; the server
    /// treats an empty logout as success.
    pub async fn logout(&self) -> Result<LogoutSummary, ClientError> {
        let mut request = self.http.post(self.url("/logout"));

        if let Some(tokens) = self.session.tokens().await {
            request = request
                .bearer_auth(&tokens.access_token)
                .json(&serde_json::json!({ "refresh_token": tokens.refresh_token }));
        }

        let summary: LogoutSummary = decode(request.send().await?).await?;
        self.session.clear().await;

        if !summary.failures.is_empty() {
            tracing::warn!(failures = summary.failures.len(), "Logout completed with errors");
        }
        Ok(summary)
    }

    /// Mint a new access token from `refresh_token`
    pub async fn refresh_access(&self, refresh_token: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url("/token/refresh"))
            .bearer_auth(refresh_token)
            .send()
            .await?;

        let reply: RefreshReply = decode(response).await?;
        Ok(reply.access_token)
    }

    async fn get_protected<T: DeserializeOwned>(
        &self,
        path: &str,
        sentences: &[&str],
    ) -> Result<T, ClientError> {
        let query: Vec<(&str, &str)> = sentences.iter().map(|s| ("sentence", *s)).collect();
        let url = self.url(path);

        self.session
            .call(
                |access| {
                    let request = self.http.get(&url).query(&query).bearer_auth(access);
                    async move { decode(request.send().await?).await }
                },
                |refresh| async move { self.refresh_access(&refresh).await },
            )
            .await
    }

    /// Tokenize each sentence
    pub async fn tokenize(&self, sentences: &[&str]) -> Result<Vec<Vec<String>>, ClientError> {
        let reply: TokenizeReply = self.get_protected("/tokenize", sentences).await?;
        Ok(reply.tokens)
    }

    /// Embed each sentence
    pub async fn embed(&self, sentences: &[&str]) -> Result<Vec<Vec<f32>>, ClientError> {
        let reply: EmbedReply = self.get_protected("/embed", sentences).await?;
        Ok(reply.embedding)
    }
}

/// Parse a success body, or the classified error body on failure
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        return serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()));
    }

    match serde_json::from_slice::<ErrorBody>(&bytes) {
        Ok(body) => Err(body.into()),
        Err(_) => Err(ClientError::Decode(format!(
            "HTTP {} without an error body",
            status_text(status)
        ))),
    }
}

fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}
