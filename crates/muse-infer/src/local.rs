//! In-process tokenizer and embedder
//!
//! Tokens follow the SentencePiece convention: a word-initial piece carries
//! the `▁` marker and punctuation stands alone. Embeddings are signed feature
//! hashes of the tokens, L2-normalised, so identical sentences always map to
//! identical vectors.

use async_trait::async_trait;
use muse_core::{Inferencer, MuseError, Result};
use sha2::{Digest, Sha256};

/// Word-boundary marker prepended to word-initial pieces
pub const WORD_MARKER: char = '\u{2581}';

/// Local subword tokenizer and hashing embedder
#[derive(Debug, Clone)]
pub struct LocalInferencer {
    dimension: usize,
}

impl LocalInferencer {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Tokenize a single sentence
    pub fn tokenize_sentence(sentence: &str) -> Vec<String> {
        let mut tokens = Vec::new();

        for word in sentence.split_whitespace() {
            let mut piece = String::new();
            let mut word_start = true;

            for ch in word.chars() {
                if ch.is_alphanumeric() || ch == '\'' || ch == '-' {
                    if piece.is_empty() && word_start {
                        piece.push(WORD_MARKER);
                    }
                    piece.push(ch);
                } else {
                    if !piece.is_empty() {
                        tokens.push(std::mem::take(&mut piece));
                    }
                    tokens.push(ch.to_string());
                }
                word_start = false;
            }

            if !piece.is_empty() {
                tokens.push(piece);
            }
        }

        tokens
    }

    fn embed_sentence(&self, sentence: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in Self::tokenize_sentence(sentence) {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&digest[..8]);
            let index = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for LocalInferencer {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl Inferencer for LocalInferencer {
    async fn tokenize(&self, sentences: &[String]) -> Result<Vec<Vec<String>>> {
        if sentences.is_empty() {
            return Err(MuseError::ValidationError(
                "at least one sentence is required".to_string(),
            ));
        }
        Ok(sentences
            .iter()
            .map(|s| Self::tokenize_sentence(s))
            .collect())
    }

    async fn embed(&self, sentences: &[String]) -> Result<Vec<Vec<f32>>> {
        if sentences.is_empty() {
            return Err(MuseError::ValidationError(
                "at least one sentence is required".to_string(),
            ));
        }
        Ok(sentences.iter().map(|s| self.embed_sentence(s)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "local"
    }
}
