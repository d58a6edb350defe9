//! Google Gemini provider implementation.

use async_trait::async_trait;
use dof3a_core::config::{Config, DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEMO_API_KEY};
use reqwest::Client;

use crate::protocol::{GeminiRequest, GeminiResponse};
use crate::provider::{GenerationOptions, LLMError, LLMProvider, Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl GeminiProvider {
    /// Create a new Gemini provider with an API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Provider for the configured key, model and temperature. A missing key
    /// yields an unconfigured provider that fails every call with
    /// [`LLMError::Auth`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.usable_api_key().unwrap_or_default())
            .with_model(config.model.clone())
            .with_temperature(config.temperature)
    }

    /// Set a custom base URL (e.g., for proxies or test servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String> {
        if !self.is_configured() {
            return Err(LLMError::Auth(
                "Google API key is not configured. Set GOOGLE_API_KEY.".to_string(),
            ));
        }

        let request = GeminiRequest::from_prompt(
            prompt,
            Some(options.temperature.unwrap_or(self.temperature)),
            options.max_output_tokens,
        );
        let body = serde_json::to_vec(&request)?;

        log::debug!(
            "Gemini request to model '{}' ({} prompt chars)",
            self.model,
            prompt.chars().count()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .body(body)
            .send()
            .await
            .map_err(|e| LLMError::Http(e.without_url()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LLMError::Http(e.without_url()))?;

        if !status.is_success() {
            if status == 401 || status == 403 {
                return Err(LLMError::Auth(format!(
                    "Gemini authentication failed: {}. Please check your API key.",
                    text
                )));
            }

            return Err(LLMError::Api(format!(
                "Gemini API error: HTTP {}: {}",
                status, text
            )));
        }

        GeminiResponse::parse(&text)?.into_text()?.ok_or_else(|| {
            LLMError::EmptyResponse(format!("model '{}' returned no text", self.model))
        })
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && key != DEMO_API_KEY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_response(parts: &[&str]) -> serde_json::Value {
        let parts: Vec<_> = parts.iter().map(|text| json!({ "text": text })).collect();
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": parts },
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_new_provider_defaults() {
        let provider = GeminiProvider::new("test_key");
        assert_eq!(provider.api_key, "test_key");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(provider.model, "gemini-2.0-flash");
        assert!((provider.temperature - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_endpoint_construction() {
        let provider = GeminiProvider::new("my_api_key_123")
            .with_base_url("https://test.api.com/v1beta/")
            .with_model("gemini-custom");

        assert_eq!(
            provider.endpoint(),
            "https://test.api.com/v1beta/models/gemini-custom:generateContent"
        );
    }

    #[test]
    fn test_placeholder_keys_are_unconfigured() {
        assert!(!GeminiProvider::new("").is_configured());
        assert!(!GeminiProvider::new("  ").is_configured());
        assert!(!GeminiProvider::new(DEMO_API_KEY).is_configured());
        assert!(GeminiProvider::new("real").is_configured());
    }

    #[test]
    fn test_from_config_drops_demo_key() {
        let config = Config {
            google_api_key: Some(DEMO_API_KEY.to_string()),
            model: "gemini-1.5-pro".to_string(),
            temperature: 0.2,
            ..Config::default()
        };
        let provider = GeminiProvider::from_config(&config);
        assert!(!provider.is_configured());
        assert_eq!(provider.model(), "gemini-1.5-pro");
    }

    #[tokio::test]
    async fn generate_posts_prompt_and_joins_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test_key"))
            .and(body_partial_json(json!({
                "contents": [{"role": "user", "parts": [{"text": "What is a prime?"}]}],
                "generationConfig": {"temperature": 0.5}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(text_response(&["A prime ", "number..."])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("test_key").with_base_url(server.uri());
        let text = provider
            .generate("What is a prime?", GenerationOptions::default())
            .await
            .expect("generation succeeds");

        assert_eq!(text, "A prime number...");
    }

    #[tokio::test]
    async fn generate_maps_forbidden_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("bad_key").with_base_url(server.uri());
        let error = provider
            .generate("hello", GenerationOptions::default())
            .await
            .expect_err("forbidden");

        assert!(matches!(error, LLMError::Auth(message) if message.contains("API key not valid")));
    }

    #[tokio::test]
    async fn generate_maps_server_errors_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("backend unavailable"))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("key").with_base_url(server.uri());
        let error = provider
            .generate("hello", GenerationOptions::default())
            .await
            .expect_err("server error");

        match error {
            LLMError::Api(message) => {
                assert!(message.contains("HTTP 500"));
                assert!(message.contains("backend unavailable"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generate_without_candidates_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("key").with_base_url(server.uri());
        let error = provider
            .generate("hello", GenerationOptions::default())
            .await
            .expect_err("empty");

        assert!(matches!(error, LLMError::EmptyResponse(_)));
    }

    #[tokio::test]
    async fn unconfigured_provider_never_calls_the_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(&["unused"])))
            .expect(0)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new(DEMO_API_KEY).with_base_url(server.uri());
        let error = provider
            .generate("hello", GenerationOptions::default())
            .await
            .expect_err("unconfigured");

        assert!(matches!(error, LLMError::Auth(_)));
    }

    #[tokio::test]
    async fn per_call_options_override_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": {"temperature": 0.0, "maxOutputTokens": 64}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(&["ok"])))
            .expect(1)
            .mount(&server)
            .await;

        let provider = GeminiProvider::new("key").with_base_url(server.uri());
        let options = GenerationOptions {
            temperature: Some(0.0),
            max_output_tokens: Some(64),
        };

        assert_eq!(provider.generate("hi", options).await.expect("ok"), "ok");
    }

    #[tokio::test]
    async fn transport_errors_never_expose_the_api_key() {
        let provider =
            GeminiProvider::new("SECRETKEY123").with_base_url("http://127.0.0.1:1/v1beta");
        let error = provider
            .generate("hello", GenerationOptions::default())
            .await
            .expect_err("connection refused");

        assert!(matches!(error, LLMError::Http(_)));
        assert!(!error.to_string().contains("SECRETKEY123"));
        assert!(!format!("{error:?}").contains("SECRETKEY123"));
    }
}
