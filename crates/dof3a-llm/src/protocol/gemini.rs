//! Google Gemini `generateContent` wire format.
//!
//! # Example request
//! ```json
//! {
//!   "contents": [
//!     { "role": "user", "parts": [{ "text": "Explain photosynthesis" }] }
//!   ],
//!   "generationConfig": { "temperature": 0.5 }
//! }
//! ```
//!
//! The response carries `candidates[].content.parts[].text`. A prompt rejected
//! by safety filters comes back with no candidates and a
//! `promptFeedback.blockReason`.

use serde::{Deserialize, Serialize};

use crate::protocol::{ProtocolError, ProtocolResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    /// "user" or "model"
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPromptFeedback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

impl GeminiRequest {
    /// Single-turn user request.
    pub fn from_prompt(
        prompt: &str,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
    ) -> Self {
        let generation_config = if temperature.is_some() || max_output_tokens.is_some() {
            Some(GeminiGenerationConfig {
                temperature,
                max_output_tokens,
            })
        } else {
            None
        };

        Self {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config,
        }
    }
}

impl GeminiResponse {
    pub fn parse(body: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Concatenated text parts of the first candidate, `None` when the model
    /// produced no text.
    pub fn into_text(self) -> ProtocolResult<Option<String>> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(ProtocolError::Blocked(reason));
            }
            return Ok(None);
        };

        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_camel_case_generation_config() {
        let request = GeminiRequest::from_prompt("hi", Some(0.5), Some(256));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "hi"}]}],
                "generationConfig": {"temperature": 0.5, "maxOutputTokens": 256}
            })
        );
    }

    #[test]
    fn request_without_options_omits_generation_config() {
        let request = GeminiRequest::from_prompt("hi", None, None);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let response = GeminiResponse::parse(
            &json!({
                "candidates": [
                    {"content": {"role": "model", "parts": [{"text": "Hello "}, {"text": "there"}]},
                     "finishReason": "STOP"},
                    {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
                ]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(response.into_text().unwrap().as_deref(), Some("Hello there"));
    }

    #[test]
    fn response_without_text_is_none() {
        let response = GeminiResponse::parse(r#"{"candidates":[{"finishReason":"MAX_TOKENS"}]}"#)
            .unwrap();
        assert!(response.into_text().unwrap().is_none());

        let response = GeminiResponse::parse("{}").unwrap();
        assert!(response.into_text().unwrap().is_none());
    }

    #[test]
    fn blocked_prompt_is_reported() {
        let response =
            GeminiResponse::parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap();
        match response.into_text() {
            Err(ProtocolError::Blocked(reason)) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected blocked error, got {other:?}"),
        }
    }
}
