//! Educational-appropriateness screening for user generated content.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use dof3a_core::UserId;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AiError, AiResult};
use crate::memory::AiFeature;
use crate::prompts::moderation_prompt;
use crate::service::{AiService, EnvelopeStatus};
use crate::validation::{sanitize_input, validate_user_id};

pub const DEFAULT_CRITERION_SCORE: u32 = 5;
const MAX_CRITERION_SCORE: u32 = 10;
const ERROR_REASONING: &str = "Error in moderation process, flagging for manual review";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Post,
    Reel,
    Comment,
    StudyMaterial,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Post => "post",
            ContentType::Reel => "reel",
            ContentType::Comment => "comment",
            ContentType::StudyMaterial => "study_material",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = AiError;

    fn from_str(raw: &str) -> AiResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "post" => Ok(ContentType::Post),
            "reel" => Ok(ContentType::Reel),
            "comment" => Ok(ContentType::Comment),
            "study_material" => Ok(ContentType::StudyMaterial),
            _ => Err(AiError::Validation(format!(
                "Invalid content type: {}. Must be one of post, reel, comment, study_material.",
                raw.trim()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModerationDecision {
    Approve,
    Review,
    Reject,
}

impl ModerationDecision {
    /// Anything other than an explicit approve or reject needs a human.
    /// Only the first word counts, so "REJECT - off-topic" still rejects.
    pub fn from_label(label: &str) -> Self {
        let word = label
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|word| !word.is_empty())
            .unwrap_or_default();
        match word.to_ascii_uppercase().as_str() {
            "APPROVE" => ModerationDecision::Approve,
            "REJECT" => ModerationDecision::Reject,
            _ => ModerationDecision::Review,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CriterionScores {
    pub educational_relevance: u32,
    pub age_appropriateness: u32,
    pub language_appropriateness: u32,
    pub safety_score: u32,
    pub curriculum_alignment: u32,
}

impl Default for CriterionScores {
    fn default() -> Self {
        Self {
            educational_relevance: DEFAULT_CRITERION_SCORE,
            age_appropriateness: DEFAULT_CRITERION_SCORE,
            language_appropriateness: DEFAULT_CRITERION_SCORE,
            safety_score: DEFAULT_CRITERION_SCORE,
            curriculum_alignment: DEFAULT_CRITERION_SCORE,
        }
    }
}

impl CriterionScores {
    pub fn average(&self) -> f32 {
        let total = self.educational_relevance
            + self.age_appropriateness
            + self.language_appropriateness
            + self.safety_score
            + self.curriculum_alignment;
        total as f32 / 5.0
    }

    fn slot(&mut self, key: &str) -> Option<&mut u32> {
        match key {
            "educational_relevance" => Some(&mut self.educational_relevance),
            "age_appropriateness" => Some(&mut self.age_appropriateness),
            "language_appropriateness" => Some(&mut self.language_appropriateness),
            "safety_score" => Some(&mut self.safety_score),
            "curriculum_alignment" => Some(&mut self.curriculum_alignment),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    #[serde(flatten)]
    pub scores: CriterionScores,
    pub overall_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub educational_tags: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModerationReport {
    pub decision: ModerationDecision,
    pub reasoning: String,
    pub assessment: Assessment,
}

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").ok())
        .as_ref()
}

fn first_number(value: &str) -> Option<f32> {
    number_pattern()?
        .find(value)
        .and_then(|found| found.as_str().parse::<f32>().ok())
}

/// Reads the `Key: value` lines of a moderation reply. Missing criteria
/// score 5; a missing overall score is the criteria average.
pub fn parse_moderation_response(response: &str) -> ModerationReport {
    let mut scores = CriterionScores::default();
    let mut overall_score = None;
    let mut decision = ModerationDecision::Review;
    let mut reasoning = String::new();
    let mut suggestions = None;
    let mut educational_tags = None;

    for line in response.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase().replace(' ', "_");
        let value = value.trim();

        if let Some(slot) = scores.slot(&key) {
            *slot = first_number(value)
                .map(|score| (score as u32).min(MAX_CRITERION_SCORE))
                .unwrap_or(DEFAULT_CRITERION_SCORE);
            continue;
        }
        match key.as_str() {
            "overall_score" => overall_score = first_number(value),
            "decision" => decision = ModerationDecision::from_label(value),
            "reasoning" => reasoning = value.to_string(),
            "suggestions" => suggestions = Some(value.to_string()),
            "educational_tags" => educational_tags = Some(value.to_string()),
            _ => {}
        }
    }

    ModerationReport {
        decision,
        reasoning,
        assessment: Assessment {
            overall_score: overall_score.unwrap_or_else(|| scores.average()),
            scores,
            suggestions,
            educational_tags,
        },
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModerationEnvelope {
    pub status: EnvelopeStatus,
    pub decision: ModerationDecision,
    pub reasoning: String,
    #[serde(flatten)]
    pub assessment: Option<Assessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ModerationEnvelope {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            decision: ModerationDecision::Review,
            reasoning: ERROR_REASONING.to_string(),
            assessment: None,
            content_type: None,
            user_id: None,
            user_grade: None,
            content_length: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

impl AiService {
    /// Scores content against the platform's educational criteria. Any
    /// failure flags the content for manual review.
    pub async fn moderate(&self, raw_user_id: i64, content: &str, content_type: &str) -> ModerationEnvelope {
        let user_id = match validate_user_id(raw_user_id) {
            Ok(user_id) => user_id,
            Err(error) => return ModerationEnvelope::failure(error.to_string()),
        };
        let content_type = match content_type.parse::<ContentType>() {
            Ok(content_type) => content_type,
            Err(error) => return ModerationEnvelope::failure(error.to_string()),
        };
        let content = sanitize_input(content);
        if content.is_empty() {
            return ModerationEnvelope::failure("Content must be a non-empty string");
        }

        let user_grade = match self.aggregator().collect(user_id).await {
            Ok(snapshot) => snapshot
                .student
                .map(|student| student.grade.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            Err(error) => {
                log::error!("Moderation context lookup failed for user {}: {}", user_id, error);
                return ModerationEnvelope::failure(error.public_message());
            }
        };

        if !self.is_available() {
            log::error!("AI model is not configured");
            return ModerationEnvelope::failure("AI service unavailable");
        }

        let prompt = moderation_prompt(&content, content_type.as_str(), &user_grade);
        let response = match self.complete(&prompt).await {
            Ok(response) => response,
            Err(error) => {
                log::error!("Moderation failed for user {}: {}", user_id, error);
                return ModerationEnvelope::failure(error.public_message());
            }
        };

        let report = parse_moderation_response(&response);
        self.usage_tracker().track(user_id, AiFeature::Moderation).await;
        log::info!(
            "Moderated {} from user {}: {:?}",
            content_type,
            user_id,
            report.decision
        );

        ModerationEnvelope {
            status: EnvelopeStatus::Success,
            decision: report.decision,
            reasoning: report.reasoning,
            assessment: Some(report.assessment),
            content_type: Some(content_type),
            user_id: Some(user_id),
            user_grade: Some(user_grade),
            content_length: Some(content.chars().count()),
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

    const REPLY: &str = "Educational_Relevance: 9/10
Age_Appropriateness: 10/10
Language_Appropriateness: 8/10
Safety_Score: 10/10
Curriculum_Alignment: 7/10
Overall_Score: 8.8/10
Decision: approve
Reasoning: Clear algebra explanation.
Suggestions: Add a worked example
Educational_Tags: Math, Algebra";

    #[test]
    fn parses_full_reply() {
        let report = parse_moderation_response(REPLY);
        assert_eq!(report.decision, ModerationDecision::Approve);
        assert_eq!(report.reasoning, "Clear algebra explanation.");
        assert_eq!(report.assessment.scores.educational_relevance, 9);
        assert_eq!(report.assessment.scores.curriculum_alignment, 7);
        assert!((report.assessment.overall_score - 8.8).abs() < f32::EPSILON);
        assert_eq!(report.assessment.educational_tags.as_deref(), Some("Math, Algebra"));
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        let report = parse_moderation_response(
            "Safety Score: unclear\nEducational_Relevance: 10/10\nDecision: maybe",
        );
        assert_eq!(report.decision, ModerationDecision::Review);
        assert_eq!(report.assessment.scores.safety_score, 5);
        assert!((report.assessment.overall_score - 6.0).abs() < f32::EPSILON);
        assert!(report.assessment.suggestions.is_none());
    }

    #[test]
    fn content_types_parse_case_insensitively() {
        assert_eq!("Study_Material".parse::<ContentType>().ok(), Some(ContentType::StudyMaterial));
        assert!("video".parse::<ContentType>().is_err());
    }

    #[tokio::test]
    async fn moderation_embeds_grade_and_tracks_usage() {
        let provider = ScriptedProvider::replying(REPLY);
        let (_dir, service, user_id) = service_with(provider.clone()).await;

        let envelope = service
            .moderate(user_id, "Solving x + 2 = 5 step by step", "post")
            .await;
        assert_eq!(envelope.status, EnvelopeStatus::Success);
        assert_eq!(envelope.user_grade.as_deref(), Some("Middle 2"));
        assert_eq!(
            service.usage_tracker().used_today(user_id, AiFeature::Moderation).await,
            1
        );

        let prompts = provider.prompts();
        assert!(prompts[0].contains("Analyze this post content"));
        assert!(prompts[0].contains("- Grade Level: Middle 2"));

        let json = serde_json::to_value(&envelope).expect("serialize");
        assert_eq!(json["decision"], "APPROVE");
        assert_eq!(json["safety_score"], 10);
    }

    #[tokio::test]
    async fn failures_flag_for_manual_review() {
        let provider = ScriptedProvider::new(vec![Err(LLMError::Api("down".to_string()))]);
        let (_dir, service, user_id) = service_with(provider).await;

        let envelope = service.moderate(user_id, "Some text", "comment").await;
        assert_eq!(envelope.status, EnvelopeStatus::Error);
        assert_eq!(envelope.decision, ModerationDecision::Review);
        assert_eq!(envelope.reasoning, ERROR_REASONING);
        assert_eq!(envelope.error.as_deref(), Some("AI service returned an error"));

        let envelope = service.moderate(user_id, "Some text", "video").await;
        assert_eq!(envelope.decision, ModerationDecision::Review);
        assert!(envelope.error.expect("error").starts_with("Invalid content type"));
    }

    #[test]
    fn decision_label_uses_its_leading_word() {
        assert_eq!(ModerationDecision::from_label("APPROVE."), ModerationDecision::Approve);
        assert_eq!(ModerationDecision::from_label(" approve"), ModerationDecision::Approve);
        assert_eq!(
            ModerationDecision::from_label("REJECT - off-topic"),
            ModerationDecision::Reject
        );
        assert_eq!(ModerationDecision::from_label("**Reject**"), ModerationDecision::Reject);
        assert_eq!(ModerationDecision::from_label("maybe"), ModerationDecision::Review);
        assert_eq!(ModerationDecision::from_label("APPROVED"), ModerationDecision::Review);
        assert_eq!(ModerationDecision::from_label(""), ModerationDecision::Review);
    }
}
