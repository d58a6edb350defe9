use dof3a_core::StoreError;
use dof3a_llm::LLMError;
use thiserror::Error;

use crate::repair::RepairError;

pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Llm(#[from] LLMError),

    #[error("Failed to parse AI response as JSON: {0}")]
    Parse(#[from] RepairError),

    #[error("AI model returned empty response")]
    EmptyResponse,
}

impl AiError {
    pub fn is_validation(&self) -> bool {
        matches!(self, AiError::Validation(_))
    }

    /// Text fit for a response envelope. Upstream and storage details stay
    /// in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AiError::Validation(message) => message.clone(),
            AiError::Store(_) => "Storage unavailable".to_string(),
            AiError::Llm(error) => error.category().to_string(),
            AiError::Parse(_) => "Failed to parse AI response as JSON".to_string(),
            AiError::EmptyResponse => "AI model returned empty response".to_string(),
        }
    }
}
