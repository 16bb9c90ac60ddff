//! Tokenize and embed handlers
//!
//! Both endpoints sit behind `require_access` and take one or more
//! `sentence` query parameters:
//!
//! ```text
//! GET /tokenize?sentence=Hello.&sentence=This+is+another+one.
//! ```
//!
//! Author: hephaex@gmail.com

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;

/// Upper bound on sentences per request
pub const MAX_SENTENCES: usize = 128;

/// Upper bound on characters per sentence
pub const MAX_SENTENCE_CHARS: usize = 10_000;

/// Validated `sentence` parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceQuery {
    pub sentences: Vec<String>,
}

impl SentenceQuery {
    /// Collect every `sentence` pair, ignoring other parameters
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, AppError> {
        let sentences: Vec<String> = pairs
            .into_iter()
            .filter(|(key, _)| key == "sentence")
            .map(|(_, value)| value)
            .collect();

        if sentences.is_empty() {
            return Err(AppError::BadRequest(
                "at least one 'sentence' parameter is required".to_string(),
            ));
        }
        if sentences.len() > MAX_SENTENCES {
            return Err(AppError::BadRequest(format!(
                "at most {MAX_SENTENCES} sentences per request"
            )));
        }
        if sentences
            .iter()
            .any(|s| s.chars().count() > MAX_SENTENCE_CHARS)
        {
            return Err(AppError::BadRequest(format!(
                "sentences are limited to {MAX_SENTENCE_CHARS} characters"
            )));
        }

        Ok(Self { sentences })
    }
}

/// Tokenize response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenizeResponse {
    /// One token list per sentence, in request order
    pub tokens: Vec<Vec<String>>,
}

/// Embed response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EmbedResponse {
    /// One vector per sentence, in request order
    pub embedding: Vec<Vec<f32>>,
}

async fn with_timeout<T, F>(state: &AppState, operation: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = muse_core::Result<T>>,
{
    let timeout = state.inference_timeout();
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => {
            tracing::warn!(operation, timeout_secs = timeout.as_secs(), "Inference timed out");
            Err(AppError::Timeout(format!(
                "{operation} did not complete within {}s",
                timeout.as_secs()
            )))
        }
    }
}

/// Split sentences into subword tokens
#[utoipa::path(
    get,
    path = "/tokenize",
    tag = "inference",
    params(
        ("sentence" = Vec<String>, Query, description = "Sentence to tokenize; repeat for a batch")
    ),
    responses(
        (status = 200, description = "Tokens per sentence", body = TokenizeResponse),
        (status = 400, description = "No sentence given", body = muse_core::ErrorBody),
        (status = 401, description = "Access token missing, expired, revoked or of the wrong kind", body = muse_core::ErrorBody),
        (status = 504, description = "Inference timed out", body = muse_core::ErrorBody),
    ),
    security(("bearer_auth" = []))
)]
pub async fn tokenize_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<TokenizeResponse>, AppError> {
    let Query(pairs) = query?;
    let SentenceQuery { sentences } = SentenceQuery::from_pairs(pairs)?;

    let started = Instant::now();
    let tokens = with_timeout(&state, "tokenize", state.inferencer.tokenize(&sentences)).await?;

    tracing::debug!(
        subject = %user.subject,
        sentences = sentences.len(),
        backend = state.inferencer.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Tokenized"
    );

    Ok(Json(TokenizeResponse { tokens }))
}

/// Embed sentences into fixed-size vectors
#[utoipa::path(
    get,
    path = "/embed",
    tag = "inference",
    params(
        ("sentence" = Vec<String>, Query, description = "Sentence to embed; repeat for a batch")
    ),
    responses(
        (status = 200, description = "Embedding per sentence", body = EmbedResponse),
        (status = 400, description = "No sentence given", body = muse_core::ErrorBody),
        (status = 401, description = "Access token missing, expired, revoked or of the wrong kind", body = muse_core::ErrorBody),
        (status = 504, description = "Inference timed out", body = muse_core::ErrorBody),
    ),
    security(("bearer_auth" = []))
)]
pub async fn embed_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<EmbedResponse>, AppError> {
    let Query(pairs) = query?;
    let SentenceQuery { sentences } = SentenceQuery::from_pairs(pairs)?;

    let started = Instant::now();
    let embedding = with_timeout(&state, "embed", state.inferencer.embed(&sentences)).await?;

    tracing::debug!(
        subject = %user.subject,
        sentences = sentences.len(),
        dimension = state.inferencer.dimension(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Embedded"
    );

    Ok(Json(EmbedResponse { embedding }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_repeated_sentences_keep_order() {
        let query = SentenceQuery::from_pairs(pairs(&[
            ("sentence", "first"),
            ("lang", "en"),
            ("sentence", "second"),
        ]))
        .unwrap();
        assert_eq!(query.sentences, vec!["first", "second"]);
    }

    #[test]
    fn test_missing_sentence_rejected() {
        let result = SentenceQuery::from_pairs(pairs(&[("text", "hello")]));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_too_many_sentences_rejected() {
        let many: Vec<(String, String)> = (0..=MAX_SENTENCES)
            .map(|i| ("sentence".to_string(), format!("s{i}")))
            .collect();
        assert!(SentenceQuery::from_pairs(many).is_err());
    }

    #[test]
    fn test_overlong_sentence_rejected() {
        let long = "a".repeat(MAX_SENTENCE_CHARS + 1);
        let result = SentenceQuery::from_pairs(vec![("sentence".to_string(), long)]);
        assert!(result.is_err());
    }
}
