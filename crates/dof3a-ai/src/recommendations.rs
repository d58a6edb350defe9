use chrono::{DateTime, Utc};
use dof3a_core::UserId;
use serde::{Deserialize, Serialize};

use crate::error::AiError;
use crate::formatter::format_context;
use crate::memory::AiFeature;
use crate::prompts::recommendation_prompt;
use crate::repair::{parse_model_json, JsonShape};
use crate::service::{AiService, EnvelopeStatus};
use crate::validation::validate_user_id;

pub const DEFAULT_MOTIVATION: &str = "Keep up the great work!";

const PROFILE_MISSING_FALLBACK: [&str; 2] =
    ["Create a study schedule", "Focus on consistent daily practice"];
const UNAVAILABLE_FALLBACK: [&str; 2] = [
    "Review your textbooks regularly",
    "Ask teachers for help when needed",
];
const GENERATION_FAILED_FALLBACK: [&str; 3] = [
    "Study consistently",
    "Review challenging topics",
    "Seek help from teachers",
];

fn default_motivation() -> String {
    DEFAULT_MOTIVATION.to_string()
}

/// Shape the model is asked to return.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendationPayload {
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    #[serde(default)]
    pub study_tips: Vec<String>,
    #[serde(default = "default_motivation")]
    pub motivation_message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationDetails {
    pub focus_areas: Vec<String>,
    pub study_tips: Vec<String>,
    pub motivation_message: String,
    pub user_id: UserId,
    pub subject_focus: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationEnvelope {
    pub recommendations: Vec<String>,
    pub status: EnvelopeStatus,
    #[serde(flatten)]
    pub details: Option<RecommendationDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RecommendationEnvelope {
    fn failure(fallback: &[&str], error: impl Into<String>) -> Self {
        Self {
            recommendations: fallback.iter().map(|item| item.to_string()).collect(),
            status: EnvelopeStatus::Error,
            details: None,
            note: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }
}

impl AiService {
    /// Study advice built from the user's profile, optionally narrowed to
    /// one subject. Failures return canned advice where a sensible default
    /// exists.
    pub async fn recommend(&self, raw_user_id: i64, subject: Option<&str>) -> RecommendationEnvelope {
        let user_id = match validate_user_id(raw_user_id) {
            Ok(user_id) => user_id,
            Err(error) => {
                log::error!("Validation error in recommendations: {}", error);
                return RecommendationEnvelope::failure(&[], error.to_string());
            }
        };
        let subject = subject
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
            .map(str::to_string);

        let snapshot = match self.aggregator().collect(user_id).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                log::error!("Recommendation context lookup failed for user {}: {}", user_id, error);
                return RecommendationEnvelope::failure(&[], error.public_message());
            }
        };
        if snapshot.user.is_none() {
            return RecommendationEnvelope::failure(&PROFILE_MISSING_FALLBACK, "User profile not found");
        }
        let user_context = format_context(&snapshot);

        if !self.is_available() {
            log::error!("AI model is not configured");
            return RecommendationEnvelope::failure(&UNAVAILABLE_FALLBACK, "AI service unavailable");
        }

        let prompt = recommendation_prompt(&user_context, subject.as_deref());
        let response = match self.complete(&prompt).await {
            Ok(response) => response,
            Err(AiError::EmptyResponse) | Err(AiError::Llm(dof3a_llm::LLMError::EmptyResponse(_))) => {
                log::warn!("AI model returned empty response for recommendations");
                return RecommendationEnvelope::failure(&[], "Empty response from AI model");
            }
            Err(error) => {
                log::error!("AI recommendation generation failed: {}", error);
                return RecommendationEnvelope::failure(
                    &GENERATION_FAILED_FALLBACK,
                    "Recommendation generation failed",
                );
            }
        };

        let parsed = parse_model_json(&response, JsonShape::Object)
            .map_err(AiError::from)
            .and_then(|outcome| {
                let note = outcome.note();
                serde_json::from_value::<RecommendationPayload>(outcome.value)
                    .map(|payload| (payload, note))
                    .map_err(|error| AiError::Validation(error.to_string()))
            });
        let (payload, note) = match parsed {
            Ok(parsed) => parsed,
            Err(error) => {
                log::error!("Failed to parse recommendations response: {}", error);
                return RecommendationEnvelope::failure(&[], "Failed to parse AI response as JSON");
            }
        };

        self.usage_tracker()
            .track(user_id, AiFeature::Recommendations)
            .await;
        log::info!("Successfully generated study recommendations for user {}", user_id);

        RecommendationEnvelope {
            recommendations: payload.recommendations,
            status: EnvelopeStatus::Success,
            details: Some(RecommendationDetails {
                focus_areas: payload.focus_areas,
                study_tips: payload.study_tips,
                motivation_message: payload.motivation_message,
                user_id,
                subject_focus: subject,
            }),
            note,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::test_support::{service_with, ScriptedProvider};
    use dof3a_llm::LLMError;

    #[tokio::test]
    async fn success_fills_defaults_and_subject_focus() {
        let provider = ScriptedProvider::replying(
            "Sure!\n{\"recommendations\": [\"Practice equations daily\"], \"focus_areas\": [\"Algebra\"]}",
        );
        let (_dir, service, user_id) = service_with(provider.clone()).await;

        let envelope = service.recommend(user_id, Some(" Math ")).await;
        assert!(envelope.is_success());
        assert_eq!(envelope.recommendations, vec!["Practice equations daily"]);
        let details = envelope.details.expect("details");
        assert_eq!(details.motivation_message, DEFAULT_MOTIVATION);
        assert!(details.study_tips.is_empty());
        assert_eq!(details.subject_focus.as_deref(), Some("Math"));
        assert!(envelope.note.is_none());

        let prompts = provider.prompts();
        assert!(prompts[0].contains("Focus specifically on Math."));
        assert!(prompts[0].contains("Grade Level: Middle 2"));
    }

    #[tokio::test]
    async fn truncated_object_is_repaired() {
        let provider = ScriptedProvider::replying(
            r#"{"recommendations": ["Review fractions", "Sleep well""#,
        );
        let (_dir, service, user_id) = service_with(provider).await;

        let envelope = service.recommend(user_id, None).await;
        assert!(envelope.is_success());
        assert_eq!(envelope.note, Some("Recovered from incomplete JSON response"));
        assert_eq!(envelope.recommendations.len(), 2);

        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["status"], "success");
        assert_eq!(json["subject_focus"], serde_json::Value::Null);
        assert_eq!(json["user_id"], user_id);
    }

    #[tokio::test]
    async fn missing_profile_uses_profile_fallback() {
        let (_dir, service, _) = service_with(ScriptedProvider::replying("{}")).await;

        let envelope = service.recommend(4242, None).await;
        assert_eq!(envelope.error.as_deref(), Some("User profile not found"));
        assert_eq!(envelope.recommendations, PROFILE_MISSING_FALLBACK);
    }

    #[tokio::test]
    async fn unavailable_and_failed_calls_use_their_fallbacks() {
        let (_dir, service, user_id) = service_with(ScriptedProvider::unconfigured()).await;
        let envelope = service.recommend(user_id, None).await;
        assert_eq!(envelope.recommendations, UNAVAILABLE_FALLBACK);

        let provider = ScriptedProvider::new(vec![Err(LLMError::Api("boom".to_string()))]);
        let (_dir, service, user_id) = service_with(provider).await;
        let envelope = service.recommend(user_id, None).await;
        assert_eq!(envelope.error.as_deref(), Some("Recommendation generation failed"));
        assert_eq!(envelope.recommendations, GENERATION_FAILED_FALLBACK);
    }

    #[tokio::test]
    async fn unparseable_reply_returns_empty_list() {
        let (_dir, service, user_id) =
            service_with(ScriptedProvider::replying("No JSON for you")).await;

        let envelope = service.recommend(user_id, None).await;
        assert!(envelope.recommendations.is_empty());
        assert_eq!(envelope.error.as_deref(), Some("Failed to parse AI response as JSON"));
    }

    #[tokio::test]
    async fn invalid_user_id_is_rejected() {
        let (_dir, service, _) = service_with(ScriptedProvider::replying("{}")).await;
        let envelope = service.recommend(0, None).await;
        assert_eq!(
            envelope.error.as_deref(),
            Some("Invalid user ID: 0. Must be a positive integer.")
        );
        let json = serde_json::to_value(&envelope).expect("serialize");
        assert!(json.get("user_id").is_none());
    }
}
