//! MUSE Infer - Tokenize/embed backends
//!
//! Implementations of the `Inferencer` collaborator:
//! - `LocalInferencer`: in-process subword tokenizer and hashing embedder
//! - `RemoteInferencer`: HTTP client for an external model server

pub mod local;
pub mod remote;

pub use local::LocalInferencer;
pub use remote::RemoteInferencer;

use muse_core::{InferenceBackend, InferenceConfig, Inferencer, Result};
use std::sync::Arc;

/// Create an inferencer from config
pub fn create_inferencer(config: &InferenceConfig) -> Result<Arc<dyn Inferencer>> {
    match config.backend {
        InferenceBackend::Local => Ok(Arc::new(LocalInferencer::new(config.dimension))),
        InferenceBackend::Remote => Ok(Arc::new(RemoteInferencer::from_config(config)?)),
    }
}
