//! Remote model server client
//!
//! Talks to a model server exposing `POST /tokenize` and `POST /embed`, each
//! taking `{"sentences": [...]}`.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use muse_core::{InferenceConfig, Inferencer, MuseError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP inference client
pub struct RemoteInferencer {
    client: Client,
    base_url: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct SentencesRequest<'a> {
    sentences: &'a [String],
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    tokens: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<Vec<f32>>,
}

impl RemoteInferencer {
    /// Create a new remote client
    pub fn new(base_url: impl Into<String>, dimension: usize, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MuseError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dimension,
        })
    }

    /// Create from config
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        Self::new(
            config.remote_url.clone(),
            config.dimension,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, path: &str, sentences: &[String]) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&SentencesRequest { sentences })
            .send()
            .await
            .map_err(|e| MuseError::InferenceError(format!("Request to {path} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MuseError::InferenceError(format!(
                "Model server returned {status}: {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MuseError::InferenceError(format!("Failed to parse {path} response: {e}")))
    }
}

#[async_trait]
impl Inferencer for RemoteInferencer {
    async fn tokenize(&self, sentences: &[String]) -> Result<Vec<Vec<String>>> {
        let result: TokenizeResponse = self.post("/tokenize", sentences).await?;
        if result.tokens.len() != sentences.len() {
            return Err(MuseError::InferenceError(format!(
                "Expected {} token lists, got {}",
                sentences.len(),
                result.tokens.len()
            )));
        }
        Ok(result.tokens)
    }

    async fn embed(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>> {
        let result: EmbedResponse = self.post("/embed", sentences).await?;

        if let Some(bad) = result.embedding.iter().find(|e| e.len() != self.dimension) {
            tracing::warn!(
                expected = self.dimension,
                actual = bad.len(),
                "Model server returned embedding with unexpected dimension"
            );
            return Err(MuseError::InferenceError(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.len()
            )));
        }

        Ok(result.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalized() {
        let client =
            RemoteInferencer::new("http://localhost:8501/", 512, Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url, "http://localhost:8501");
        assert_eq!(client.dimension(), 512);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_inference_error() {
        // Port 9 (discard) is essentially never served over HTTP locally.
        let client =
            RemoteInferencer::new("http://127.0.0.1:9", 512, Duration::from_millis(500)).unwrap();
        let err = client
            .tokenize(&["Hello.".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, MuseError::InferenceError(_)));
    }
}
