use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    #[error("Protocol conversion error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// Per-call overrides. Unset fields fall back to the provider's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl LLMError {
    /// Short description safe to show to API callers. The full error can
    /// carry upstream response bodies.
    pub fn category(&self) -> &'static str {
        match self {
            LLMError::Http(_) => "AI service request failed",
            LLMError::Json(_) => "AI service sent malformed JSON",
            LLMError::Api(_) => "AI service returned an error",
            LLMError::Auth(_) => "AI service authentication failed",
            LLMError::EmptyResponse(_) => "AI model returned no text",
            LLMError::Protocol(_) => "AI service response could not be read",
        }
    }
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a single prompt and return the model's text.
    ///
    /// One outbound request per call; failures are returned as-is without
    /// retry.
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String>;

    /// Model name used when no override is given.
    fn model(&self) -> &str;

    /// Whether the provider has credentials to make calls at all.
    fn is_configured(&self) -> bool {
        true
    }
}
