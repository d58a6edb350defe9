//! Error types for protocol conversion.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Prompt blocked by provider: {0}")]
    Blocked(String),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
