//! Client error types

use muse_core::{ErrorBody, ErrorCode};
use thiserror::Error;

/// Errors returned by `MuseClient`
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a classified error body
    #[error("{code}: {message} (HTTP {status})")]
    Api {
        status: u16,
        code: ErrorCode,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Wire error code, if the server sent one
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this failure may be recovered by refreshing the access token
    pub fn is_token_expired(&self) -> bool {
        self.code().is_some_and(|code| code.is_expired())
    }
}

impl From<ErrorBody> for ClientError {
    fn from(body: ErrorBody) -> Self {
        ClientError::Api {
            status: body.status,
            code: body.code,
            message: body.message,
        }
    }
}
