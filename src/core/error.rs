//! Error types for the terrastream engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("sampler error: {0}")]
    Sampler(String),

    #[error("streaming error: {0}")]
    Streaming(String),

    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
