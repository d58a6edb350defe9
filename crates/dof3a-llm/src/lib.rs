pub mod protocol;
pub mod provider;
pub mod providers;

pub use protocol::ProtocolError;
pub use provider::{GenerationOptions, LLMError, LLMProvider, Result};
pub use providers::GeminiProvider;
