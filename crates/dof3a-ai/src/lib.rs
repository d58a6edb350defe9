//! AI features of the dof3a platform.
//!
//! Every operation hangs off [`AiService`] and returns a serializable
//! envelope instead of an error, so HTTP handlers can pass results through
//! unchanged.

pub mod aggregator;
pub mod error;
pub mod formatter;
pub mod memory;
pub mod moderation;
pub mod prompts;
pub mod questions;
pub mod recommendations;
pub mod repair;
pub mod service;
pub mod tutor;
pub mod validation;

pub use aggregator::{ContextAggregator, UserSnapshot};
pub use error::{AiError, AiResult};
pub use formatter::{format_context, Engagement};
pub use memory::{AiFeature, ConversationMemory, UsageTracker};
pub use moderation::{
    parse_moderation_response, ContentType, ModerationDecision, ModerationEnvelope,
    ModerationReport,
};
pub use questions::{Difficulty, KnockoutQuestion, QuestionEnvelope, QuestionRequest};
pub use recommendations::{RecommendationEnvelope, RecommendationPayload};
pub use repair::{parse_model_json, JsonShape, RepairError, RepairOutcome};
pub use service::{AiService, EnvelopeStatus, ServiceStatus, UsageReport};
pub use tutor::{extract_recommendations, ChatEnvelope};
