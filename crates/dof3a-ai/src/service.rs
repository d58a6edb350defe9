use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dof3a_core::{PlatformStore, UserId};
use dof3a_llm::{GenerationOptions, LLMProvider};
use serde::Serialize;

use crate::aggregator::ContextAggregator;
use crate::error::{AiError, AiResult};
use crate::memory::{AiFeature, ConversationMemory, UsageTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub user_id: UserId,
    pub date: String,
    pub usage: HashMap<AiFeature, u32>,
    pub tutor_daily_limit: Option<u32>,
    pub tutor_remaining: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub message: &'static str,
    pub status: &'static str,
    pub ai_configured: bool,
    pub model: String,
    pub questions_enabled: bool,
    pub available_endpoints: Vec<(&'static str, &'static str)>,
    pub timestamp: DateTime<Utc>,
}

/// Entry point for every AI feature. One instance is shared by all request
/// handlers.
pub struct AiService {
    aggregator: ContextAggregator,
    llm: Arc<dyn LLMProvider>,
    memory: ConversationMemory,
    usage: UsageTracker,
    tutor_daily_limit: Option<u32>,
}

impl AiService {
    pub fn new(store: Arc<dyn PlatformStore>, llm: Arc<dyn LLMProvider>) -> Self {
        Self {
            aggregator: ContextAggregator::new(store),
            llm,
            memory: ConversationMemory::new(),
            usage: UsageTracker::new(),
            tutor_daily_limit: None,
        }
    }

    pub fn with_tutor_daily_limit(mut self, limit: Option<u32>) -> Self {
        self.tutor_daily_limit = limit;
        self
    }

    pub fn aggregator(&self) -> &ContextAggregator {
        &self.aggregator
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn usage_tracker(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn tutor_daily_limit(&self) -> Option<u32> {
        self.tutor_daily_limit
    }

    pub fn is_available(&self) -> bool {
        self.llm.is_configured()
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub async fn usage(&self, user_id: UserId) -> UsageReport {
        let usage = self.usage.snapshot(user_id).await;
        let used = usage.get(&AiFeature::Tutor).copied().unwrap_or(0);
        UsageReport {
            user_id,
            date: Utc::now().date_naive().to_string(),
            usage,
            tutor_daily_limit: self.tutor_daily_limit,
            tutor_remaining: self
                .tutor_daily_limit
                .map(|limit| limit.saturating_sub(used)),
        }
    }

    pub fn status(&self, questions_enabled: bool) -> ServiceStatus {
        let mut endpoints = vec![
            ("chat", "/api/ai/chat/ (POST, requires authentication)"),
            (
                "recommendations",
                "/api/ai/recommendations/ (POST, requires authentication)",
            ),
            ("moderate", "/api/ai/moderate/ (POST, requires authentication)"),
            ("usage", "/api/ai/usage/ (GET, requires authentication)"),
            ("test", "/api/ai/test/ (GET, no authentication)"),
        ];
        if questions_enabled {
            endpoints.insert(
                2,
                ("questions", "/api/ai/questions/ (POST, requires authentication)"),
            );
        }

        ServiceStatus {
            message: "AI Features API is working!",
            status: "active",
            ai_configured: self.is_available(),
            model: self.model().to_string(),
            questions_enabled,
            available_endpoints: endpoints,
            timestamp: Utc::now(),
        }
    }

    /// One model call; blank output counts as a failure.
    pub(crate) async fn complete(&self, prompt: &str) -> AiResult<String> {
        let response = self
            .llm
            .generate(prompt, GenerationOptions::default())
            .await?;
        if response.trim().is_empty() {
            return Err(AiError::EmptyResponse);
        }
        log::debug!(
            "Raw AI response (first 200 chars): {}",
            crate::validation::take_chars(&response, 200)
        );
        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use dof3a_llm::{GenerationOptions, LLMError, LLMProvider, Result};

    use super::AiService;

    /// Replays canned responses in order and records every prompt.
    pub(crate) struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
        configured: bool,
    }

    impl ScriptedProvider {
        pub(crate) fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
                configured: true,
            })
        }

        pub(crate) fn replying(text: &str) -> Arc<Self> {
            Self::new(vec![Ok(text.to_string())])
        }

        pub(crate) fn unconfigured() -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                prompts: Mutex::new(Vec::new()),
                configured: false,
            })
        }

        pub(crate) fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn generate(&self, prompt: &str, _options: GenerationOptions) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LLMError::Api("no scripted response".to_string())))
        }

        fn model(&self) -> &str {
            "scripted"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    pub(crate) async fn service_with(
        provider: Arc<ScriptedProvider>,
    ) -> (tempfile::TempDir, AiService, dof3a_core::UserId) {
        let (dir, store, user_id) = crate::aggregator::tests::seeded_store().await;
        (dir, AiService::new(store, provider), user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{service_with, ScriptedProvider};
    use super::*;

    #[tokio::test]
    async fn status_lists_questions_only_when_enabled() {
        let (_dir, service, _) = service_with(ScriptedProvider::unconfigured()).await;

        let status = service.status(false);
        assert!(!status.ai_configured);
        assert_eq!(status.model, "scripted");
        assert!(status.available_endpoints.iter().all(|(name, _)| *name != "questions"));

        let status = service.status(true);
        assert!(status.available_endpoints.iter().any(|(name, _)| *name == "questions"));
    }

    #[tokio::test]
    async fn usage_report_includes_remaining_tutor_calls() {
        let (_dir, service, user_id) = service_with(ScriptedProvider::unconfigured()).await;
        let service = service.with_tutor_daily_limit(Some(3));
        service.usage_tracker().track(user_id, AiFeature::Tutor).await;

        let report = service.usage(user_id).await;
        assert_eq!(report.usage[&AiFeature::Tutor], 1);
        assert_eq!(report.tutor_remaining, Some(2));
    }

    #[tokio::test]
    async fn blank_model_output_is_an_empty_response() {
        let (_dir, service, _) = service_with(ScriptedProvider::replying("   ")).await;
        let error = service.complete("prompt").await.expect_err("blank");
        assert!(matches!(error, AiError::EmptyResponse));
    }

    #[tokio::test]
    async fn unreachable_model_failures_do_not_expose_the_api_key() {
        let (_dir, store, user_id) = crate::aggregator::tests::seeded_store().await;
        let provider = dof3a_llm::GeminiProvider::new("SECRETKEY123")
            .with_base_url("http://127.0.0.1:1/v1beta");
        let service = AiService::new(store, Arc::new(provider));

        let moderation = service.moderate(user_id, "Photosynthesis notes", "post").await;
        assert_eq!(moderation.error.as_deref(), Some("AI service request failed"));

        let questions = service
            .generate_questions(&crate::questions::QuestionRequest {
                subject: "Science".to_string(),
                grade_level: "Middle 2".to_string(),
                difficulty: None,
                num_questions: Some(3),
                user_id: Some(user_id),
            })
            .await;
        let chat = service.chat(user_id, "What is a cell?", None).await;
        let recommendations = service.recommend(user_id, None).await;

        for body in [
            serde_json::to_string(&moderation),
            serde_json::to_string(&questions),
            serde_json::to_string(&chat),
            serde_json::to_string(&recommendations),
        ] {
            let body = body.expect("serialize envelope");
            assert!(!body.contains("SECRETKEY123"), "{body}");
            assert!(!body.contains("127.0.0.1"), "{body}");
        }
    }
}
