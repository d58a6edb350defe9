use chrono::{DateTime, Utc};
use dof3a_core::UserId;
use serde::Serialize;

use crate::error::{AiError, AiResult};
use crate::memory::{AiFeature, PROMPT_HISTORY_LINES};
use crate::prompts::tutor_prompt;
use crate::service::{AiService, EnvelopeStatus};
use crate::validation::{sanitize_input, take_chars, truncate_with_ellipsis, validate_user_id};

pub const MAX_RESPONSE_CHARS: usize = 4000;
pub const MAX_EXTRACTED_RECOMMENDATIONS: usize = 5;
const ERROR_DETAIL_CHARS: usize = 100;

const RECOMMENDATION_KEYWORDS: [&str; 5] = ["recommend", "suggest", "should", "try", "focus on"];

const VALIDATION_REPLY: &str =
    "I'm sorry, but there was an issue with your request. Please check your input and try again.";
const UNAVAILABLE_REPLY: &str = "I'm sorry, but I'm temporarily unavailable. Please try again later.";
const PROCESSING_REPLY: &str = "I apologize, but I encountered an error while processing your request. Please try rephrasing your question or try again later.";
const LIMIT_REPLY: &str = "You've reached your daily limit for personal tutoring. Please upgrade your subscription for unlimited access.";

#[derive(Debug, Clone, Serialize)]
pub struct ChatEnvelope {
    pub response: String,
    pub status: EnvelopeStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
}

impl ChatEnvelope {
    fn failure(response: &str, error: impl Into<String>) -> Self {
        Self {
            response: response.to_string(),
            status: EnvelopeStatus::Error,
            timestamp: Utc::now(),
            user_id: None,
            input_length: None,
            response_length: None,
            recommendations: None,
            error: Some(error.into()),
            subscription_required: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }
}

/// Lines of a tutor answer that read like advice, at most five.
pub fn extract_recommendations(response: &str) -> Vec<String> {
    response
        .lines()
        .filter(|line| {
            let lower = line.to_lowercase();
            RECOMMENDATION_KEYWORDS
                .iter()
                .any(|keyword| lower.contains(keyword))
        })
        .map(|line| line.trim().to_string())
        .take(MAX_EXTRACTED_RECOMMENDATIONS)
        .collect()
}

struct ChatRequest {
    user_id: UserId,
    question: String,
    context: Option<String>,
}

fn validate_chat(
    raw_user_id: i64,
    user_input: &str,
    conversation_context: Option<&str>,
) -> AiResult<ChatRequest> {
    if user_input.trim().is_empty() {
        return Err(AiError::Validation(
            "User input must be a non-empty string".to_string(),
        ));
    }
    let question = sanitize_input(user_input);
    if question.is_empty() {
        return Err(AiError::Validation(
            "User input is empty after sanitization".to_string(),
        ));
    }
    let user_id = validate_user_id(raw_user_id)?;
    let context = conversation_context
        .map(sanitize_input)
        .filter(|context| !context.is_empty());

    Ok(ChatRequest {
        user_id,
        question,
        context,
    })
}

impl AiService {
    /// Answers a student question with their profile and recent
    /// conversation in the prompt. Never fails; errors come back as an
    /// envelope with `status: "error"` and a canned reply.
    pub async fn chat(
        &self,
        raw_user_id: i64,
        user_input: &str,
        conversation_context: Option<&str>,
    ) -> ChatEnvelope {
        let request = match validate_chat(raw_user_id, user_input, conversation_context) {
            Ok(request) => request,
            Err(error) => {
                log::error!("Validation error in chat: {}", error);
                return ChatEnvelope::failure(VALIDATION_REPLY, error.to_string());
            }
        };
        let user_id = request.user_id;

        if !self
            .usage_tracker()
            .within_limit(user_id, AiFeature::Tutor, self.tutor_daily_limit())
            .await
        {
            log::info!("User {} reached the daily tutor limit", user_id);
            let mut envelope = ChatEnvelope::failure(LIMIT_REPLY, "Daily tutor limit reached");
            envelope.subscription_required = Some(true);
            return envelope;
        }

        log::info!("Processing chat request for user {}", user_id);
        let user_context = match self.aggregator().user_context(user_id).await {
            Ok(context) => context,
            Err(error) => {
                log::warn!("Failed to fetch user context for user {}: {}", user_id, error);
                format!("User ID: {user_id} (No additional profile data available)")
            }
        };

        if !self.is_available() {
            log::error!("AI model is not configured");
            return ChatEnvelope::failure(UNAVAILABLE_REPLY, "AI service unavailable");
        }

        let history = match request.context {
            Some(context) => Some(context),
            None => self.memory().recent(user_id, PROMPT_HISTORY_LINES).await,
        };
        let prompt = tutor_prompt(&user_context, history.as_deref(), &request.question);

        let response = match self.complete(&prompt).await {
            Ok(response) => response,
            Err(error) => {
                log::error!("AI processing failed for user {}: {}", user_id, error);
                let detail = error.public_message();
                return ChatEnvelope::failure(
                    PROCESSING_REPLY,
                    format!("Processing failed: {}", take_chars(&detail, ERROR_DETAIL_CHARS)),
                );
            }
        };

        let response = if response.chars().count() > MAX_RESPONSE_CHARS {
            log::warn!("AI response was very long, truncating");
            truncate_with_ellipsis(&response, MAX_RESPONSE_CHARS)
        } else {
            response
        };

        self.memory()
            .record_exchange(user_id, &request.question, &response)
            .await;
        self.usage_tracker().track(user_id, AiFeature::Tutor).await;
        log::info!("Successfully processed chat request for user {}", user_id);

        ChatEnvelope {
            recommendations: Some(extract_recommendations(&response)),
            input_length: Some(request.question.chars().count()),
            response_length: Some(response.chars().count()),
            user_id: Some(user_id),
            response,
            status: EnvelopeStatus::Success,
            timestamp: Utc::now(),
            error: None,
            subscription_required: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{service_with, ScriptedProvider};
    use dof3a_llm::LLMError;

    #[tokio::test]
    async fn empty_input_is_a_validation_error() {
        let provider = ScriptedProvider::replying("unused");
        let (_dir, service, user_id) = service_with(provider.clone()).await;

        for input in ["", "   ", "<script>alert(1)</script>"] {
            let envelope = service.chat(user_id, input, None).await;
            assert!(!envelope.is_success());
            assert_eq!(envelope.response, VALIDATION_REPLY);
        }
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn invalid_user_id_is_a_validation_error() {
        let (_dir, service, _) = service_with(ScriptedProvider::replying("unused")).await;

        let envelope = service.chat(-4, "What is a fraction?", None).await;
        assert_eq!(envelope.response, VALIDATION_REPLY);
        assert_eq!(
            envelope.error.as_deref(),
            Some("Invalid user ID: -4. Must be a positive integer.")
        );
    }

    #[tokio::test]
    async fn successful_chat_embeds_profile_and_records_history() {
        let provider = ScriptedProvider::new(vec![
            Ok("Fractions split a whole.\nYou should practice with pizza slices.".to_string()),
            Ok("Sure.".to_string()),
        ]);
        let (_dir, service, user_id) = service_with(provider.clone()).await;

        let envelope = service.chat(user_id, "What is a fraction?", None).await;
        assert!(envelope.is_success());
        assert_eq!(envelope.user_id, Some(user_id));
        assert_eq!(envelope.input_length, Some("What is a fraction?".len()));
        assert_eq!(
            envelope.recommendations,
            Some(vec!["You should practice with pizza slices.".to_string()])
        );

        let prompts = provider.prompts();
        assert!(prompts[0].contains("Name: Layla Hassan (@layla)"));
        assert!(prompts[0].contains("No previous conversation"));

        service.chat(user_id, "Thanks", None).await;
        let prompts = provider.prompts();
        assert!(prompts[1].contains("Student: What is a fraction?"));
        assert!(prompts[1].contains("Tutor: Fractions split a whole."));
        assert_eq!(service.memory().len(user_id).await, 4);
    }

    #[tokio::test]
    async fn supplied_context_overrides_stored_history() {
        let provider = ScriptedProvider::replying("Answer");
        let (_dir, service, user_id) = service_with(provider.clone()).await;
        service
            .memory()
            .record_exchange(user_id, "old question", "old answer")
            .await;

        service
            .chat(user_id, "New question", Some("We talked about <script>x</script>angles"))
            .await;
        let prompts = provider.prompts();
        assert!(prompts[0].contains("We talked about angles"));
        assert!(!prompts[0].contains("old question"));
    }

    #[tokio::test]
    async fn unconfigured_model_returns_unavailable_envelope() {
        let (_dir, service, user_id) = service_with(ScriptedProvider::unconfigured()).await;

        let envelope = service.chat(user_id, "Help me", None).await;
        assert_eq!(envelope.response, UNAVAILABLE_REPLY);
        assert_eq!(envelope.error.as_deref(), Some("AI service unavailable"));
    }

    #[tokio::test]
    async fn model_failure_is_reported_without_history() {
        let provider = ScriptedProvider::new(vec![Err(LLMError::Api(format!(
            "Gemini API error: HTTP 500: {}",
            "x".repeat(300)
        )))]);
        let (_dir, service, user_id) = service_with(provider).await;

        let envelope = service.chat(user_id, "Help me", None).await;
        assert_eq!(envelope.response, PROCESSING_REPLY);
        let error = envelope.error.expect("error");
        assert_eq!(error, "Processing failed: AI service returned an error");
        assert!(!error.contains("xxx"));
        assert_eq!(service.memory().len(user_id).await, 0);
        assert_eq!(
            service.usage_tracker().used_today(user_id, AiFeature::Tutor).await,
            0
        );
    }

    #[tokio::test]
    async fn long_responses_are_truncated() {
        let provider = ScriptedProvider::replying(&"a".repeat(4500));
        let (_dir, service, user_id) = service_with(provider).await;

        let envelope = service.chat(user_id, "Explain", None).await;
        assert_eq!(envelope.response_length, Some(MAX_RESPONSE_CHARS + 3));
        assert!(envelope.response.ends_with("..."));
    }

    #[tokio::test]
    async fn daily_limit_blocks_before_calling_the_model() {
        let provider = ScriptedProvider::new(vec![Ok("One".to_string()), Ok("Two".to_string())]);
        let (_dir, service, user_id) = service_with(provider.clone()).await;
        let service = service.with_tutor_daily_limit(Some(1));

        assert!(service.chat(user_id, "First", None).await.is_success());
        let blocked = service.chat(user_id, "Second", None).await;
        assert_eq!(blocked.subscription_required, Some(true));
        assert_eq!(provider.prompts().len(), 1);
    }

    #[test]
    fn recommendations_are_capped_at_five() {
        let response = (0..8)
            .map(|index| format!("  Try exercise {index}  "))
            .chain(["Unrelated line".to_string()])
            .collect::<Vec<_>>()
            .join("\n");

        let extracted = extract_recommendations(&response);
        assert_eq!(extracted.len(), 5);
        assert_eq!(extracted[0], "Try exercise 0");
        assert!(extract_recommendations("Focus On geometry").len() == 1);
    }
}
