//! Wire types for hosted model APIs.

mod errors;
pub mod gemini;

pub use errors::{ProtocolError, ProtocolResult};
pub use gemini::{GeminiRequest, GeminiResponse};
