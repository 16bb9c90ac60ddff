//! Client-side session state and the refresh-and-retry protocol
//!
//! A `ClientSession` holds the current token pair. `call` runs a protected
//! operation with the stored access token; if, and only if, the server
//! classifies the failure as an expired token, it refreshes the access token
//! once and retries the operation once. Every other outcome, including a
//! second expiry, is returned unchanged.

use crate::error::ClientError;
use std::future::Future;
use tokio::sync::RwLock;

/// Stored credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// Token pair shared by every call made through one client
#[derive(Debug, Default)]
pub struct ClientSession {
    tokens: RwLock<Option<SessionTokens>>,
}

impl ClientSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both tokens (after login)
    pub async fn store(&self, tokens: SessionTokens) {
        *self.tokens.write().await = Some(tokens);
    }

    /// Replace the access token (after refresh); no-op when logged out
    pub async fn replace_access(&self, access_token: String) {
        if let Some(tokens) = self.tokens.write().await.as_mut() {
            tokens.access_token = access_token;
        }
    }

    /// Forget both tokens (after logout)
    pub async fn clear(&self) {
        *self.tokens.write().await = None;
    }

    pub async fn tokens(&self) -> Option<SessionTokens> {
        self.tokens.read().await.clone()
    }

    pub async fn is_logged_in(&self) -> bool {
        self.tokens.read().await.is_some()
    }

    /// Run `op` with the access token, refreshing and retrying at most once
    ///
    /// `refresh` receives the stored refresh token and must return a new
    /// access token. It is invoked only when the first attempt fails with
    /// an expired-token classification.
    pub async fn call<T, Op, OpFut, Refresh, RefreshFut>(
        &self,
        op: Op,
        refresh: Refresh,
    ) -> Result<T, ClientError>
    where
        Op: Fn(String) -> OpFut,
        OpFut: Future<Output = Result<T, ClientError>>,
        Refresh: FnOnce(String) -> RefreshFut,
        RefreshFut: Future<Output = Result<String, ClientError>>,
    {
        let tokens = self.tokens().await.ok_or(ClientError::NotLoggedIn)?;

        match op(tokens.access_token).await {
            Err(e) if e.is_token_expired() => {
                tracing::debug!("Access token expired; refreshing once");
            }
            other => return other,
        }

        let access_token = refresh(tokens.refresh_token).await?;
        self.replace_access(access_token.clone()).await;

        op(access_token).await
    }
}
