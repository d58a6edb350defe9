//! Multiple-choice questions for 1v1 knockout games.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AiError;
use crate::formatter::Engagement;
use crate::memory::AiFeature;
use crate::prompts::{question_prompt, sample_topics, PerformanceContext, QuestionPrompt};
use crate::repair::{parse_model_json, JsonShape};
use crate::service::{AiService, EnvelopeStatus};

pub const DEFAULT_NUM_QUESTIONS: u32 = 5;
pub const MAX_NUM_QUESTIONS: u32 = 20;
const OPTIONS_PER_QUESTION: usize = 4;
const ANSWER_LETTERS: [&str; 4] = ["A", "B", "C", "D"];
const REQUIRED_FIELDS: [&str; 5] = ["question", "options", "correct_answer", "topic", "explanation"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Unknown or missing labels fall back to medium.
    pub fn parse_lenient(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("easy") => Difficulty::Easy,
            Some("hard") => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionRequest {
    pub subject: String,
    pub grade_level: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub num_questions: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnockoutQuestion {
    pub id: usize,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub topic: String,
    pub explanation: String,
    pub difficulty: Difficulty,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionEnvelope {
    pub questions: Vec<KnockoutQuestion>,
    pub status: EnvelopeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics_covered: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl QuestionEnvelope {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            questions: Vec::new(),
            status: EnvelopeStatus::Error,
            total_questions: None,
            subject: None,
            grade_level: None,
            difficulty: None,
            topics_covered: None,
            note: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }
}

/// Clamps the requested count to `1..=20`, defaulting to 5.
pub fn clamp_num_questions(raw: Option<i64>) -> u32 {
    match raw {
        Some(value) => value.clamp(1, i64::from(MAX_NUM_QUESTIONS)) as u32,
        None => DEFAULT_NUM_QUESTIONS,
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Checks one generated item; `None` drops it.
fn validate_question(
    index: usize,
    item: &Value,
    difficulty: Difficulty,
    subject: &str,
) -> Option<KnockoutQuestion> {
    let Some(fields) = item.as_object() else {
        log::warn!("Question {} is not an object, skipping", index + 1);
        return None;
    };

    let missing: Vec<&str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| !fields.contains_key(*field))
        .collect();
    if !missing.is_empty() {
        log::warn!("Question {} missing fields: {:?}, skipping", index + 1, missing);
        return None;
    }

    let options = match fields["options"].as_array() {
        Some(options) if options.len() == OPTIONS_PER_QUESTION => {
            options.iter().map(text_of).collect::<Vec<_>>()
        }
        _ => {
            log::warn!("Question {} has invalid options format, skipping", index + 1);
            return None;
        }
    };

    let correct_answer = text_of(&fields["correct_answer"]).to_uppercase();
    if !ANSWER_LETTERS.contains(&correct_answer.as_str()) {
        log::warn!(
            "Question {} has invalid correct_answer: {}, skipping",
            index + 1,
            correct_answer
        );
        return None;
    }

    Some(KnockoutQuestion {
        id: index + 1,
        question: text_of(&fields["question"]),
        options,
        correct_answer,
        topic: text_of(&fields["topic"]),
        explanation: text_of(&fields["explanation"]),
        difficulty,
        subject: subject.to_string(),
    })
}

impl AiService {
    pub async fn generate_questions(&self, request: &QuestionRequest) -> QuestionEnvelope {
        let subject = request.subject.trim();
        let grade_level = request.grade_level.trim();
        if subject.is_empty() {
            return QuestionEnvelope::failure("Subject must be a non-empty string");
        }
        if grade_level.is_empty() {
            return QuestionEnvelope::failure("Grade level must be a non-empty string");
        }
        let difficulty = Difficulty::parse_lenient(request.difficulty.as_deref());
        let num_questions = clamp_num_questions(request.num_questions);

        log::info!(
            "Generating {} {} questions for {} - {}",
            num_questions,
            difficulty,
            subject,
            grade_level
        );

        let performance = match request.user_id {
            Some(user_id) if user_id > 0 => self.performance_context(user_id).await,
            _ => None,
        };
        let topics = sample_topics(grade_level, subject, &mut rand::thread_rng());

        if !self.is_available() {
            log::error!("AI model is not configured");
            return QuestionEnvelope::failure("AI service unavailable");
        }

        let prompt = question_prompt(&QuestionPrompt {
            subject,
            grade_level,
            difficulty: difficulty.as_str(),
            num_questions,
            topics: &topics,
            performance: performance.as_ref(),
        });

        let response = match self.complete(&prompt).await {
            Ok(response) => response,
            Err(AiError::EmptyResponse) | Err(AiError::Llm(dof3a_llm::LLMError::EmptyResponse(_))) => {
                log::warn!("AI model returned empty response for questions");
                return QuestionEnvelope::failure("Empty response from AI model");
            }
            Err(error) => {
                log::error!("AI question generation failed: {}", error);
                return QuestionEnvelope::failure(format!(
                    "Question generation failed: {}",
                    error.public_message()
                ));
            }
        };

        let outcome = match parse_model_json(&response, JsonShape::Array) {
            Ok(outcome) => outcome,
            Err(error) => {
                log::error!("Failed to parse AI response as JSON: {}", error);
                return QuestionEnvelope::failure("Failed to parse AI response as JSON");
            }
        };
        let Some(items) = outcome.value.as_array() else {
            return QuestionEnvelope::failure("Question generation failed: Response is not a list");
        };

        let questions: Vec<KnockoutQuestion> = items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| validate_question(index, item, difficulty, subject))
            .collect();
        if questions.is_empty() {
            return QuestionEnvelope::failure(
                "Question generation failed: No valid questions generated after validation",
            );
        }

        if let Some(user_id) = request.user_id.filter(|id| *id > 0) {
            self.usage_tracker().track(user_id, AiFeature::Questions).await;
        }
        log::info!("Successfully generated {} questions", questions.len());

        QuestionEnvelope {
            total_questions: Some(questions.len()),
            questions,
            status: EnvelopeStatus::Success,
            subject: Some(subject.to_string()),
            grade_level: Some(grade_level.to_string()),
            difficulty: Some(difficulty),
            topics_covered: Some(topics),
            note: outcome.note(),
            error: None,
            timestamp: Utc::now(),
        }
    }

    async fn performance_context(&self, user_id: i64) -> Option<PerformanceContext> {
        let snapshot = match self.aggregator().collect(user_id).await {
            Ok(snapshot) => snapshot,
            Err(error) => {
                log::warn!("Failed to fetch user context for question generation: {}", error);
                return None;
            }
        };
        let student = snapshot.student?;
        log::info!("Using student performance data for user {}", user_id);
        Some(PerformanceContext {
            score: student.score,
            grade: student.grade.to_string(),
            engagement: Engagement::from_contributions(
                snapshot.posts.len(),
                snapshot.comments.len(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::curriculum_topics;
    use crate::service::test_support::{service_with, ScriptedProvider};
    use serde_json::json;

    fn request(user_id: Option<i64>) -> QuestionRequest {
        QuestionRequest {
            subject: " Math ".to_string(),
            grade_level: "Middle 2".to_string(),
            difficulty: Some("extreme".to_string()),
            num_questions: Some(50),
            user_id,
        }
    }

    fn item(answer: &str) -> Value {
        json!({
            "question": " What is 2 + 3? ",
            "options": ["A. 4", "B. 5", "C. 6", "D. 7"],
            "correct_answer": answer,
            "topic": "Equations",
            "explanation": "Add the numbers."
        })
    }

    #[test]
    fn difficulty_and_count_are_normalized() {
        assert_eq!(Difficulty::parse_lenient(Some("hard")), Difficulty::Hard);
        assert_eq!(Difficulty::parse_lenient(Some("HARD")), Difficulty::Medium);
        assert_eq!(Difficulty::parse_lenient(None), Difficulty::Medium);
        assert_eq!(clamp_num_questions(None), 5);
        assert_eq!(clamp_num_questions(Some(0)), 1);
        assert_eq!(clamp_num_questions(Some(99)), 20);
    }

    #[test]
    fn validation_drops_malformed_items() {
        let subject = "Math";
        assert!(validate_question(0, &json!("text"), Difficulty::Easy, subject).is_none());
        assert!(validate_question(0, &json!({"question": "q"}), Difficulty::Easy, subject).is_none());
        assert!(validate_question(0, &item("E"), Difficulty::Easy, subject).is_none());

        let mut three_options = item("A");
        three_options["options"] = json!(["A", "B", "C"]);
        assert!(validate_question(0, &three_options, Difficulty::Easy, subject).is_none());

        let question = validate_question(2, &item(" b "), Difficulty::Easy, subject).expect("valid");
        assert_eq!(question.id, 3);
        assert_eq!(question.correct_answer, "B");
        assert_eq!(question.question, "What is 2 + 3?");
        assert_eq!(question.subject, "Math");
    }

    #[tokio::test]
    async fn fenced_array_produces_numbered_questions() {
        let body = json!([item("b"), json!({"question": "broken"}), item("A")]);
        let provider = ScriptedProvider::replying(&format!("Here you go:\n```json\n{body}\n```"));
        let (_dir, service, user_id) = service_with(provider.clone()).await;

        let envelope = service.generate_questions(&request(Some(user_id))).await;
        assert!(envelope.is_success());
        assert_eq!(envelope.total_questions, Some(2));
        assert_eq!(
            envelope.questions.iter().map(|q| q.id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(envelope.difficulty, Some(Difficulty::Medium));
        assert_eq!(envelope.subject.as_deref(), Some("Math"));
        assert!(envelope.note.is_none());

        let table = curriculum_topics("Middle 2", "Math").expect("topics");
        let topics = envelope.topics_covered.expect("topics covered");
        assert_eq!(topics.len(), 3);
        assert!(topics.iter().all(|topic| table.contains(&topic.as_str())));

        let prompts = provider.prompts();
        assert!(prompts[0].contains("Generate 20 multiple choice questions"));
        assert!(prompts[0].contains("Current Score: 320 points"));
    }

    #[tokio::test]
    async fn truncated_array_is_repaired_with_note() {
        let provider = ScriptedProvider::replying(
            r#"[{"question": "Q?", "options": ["A", "B", "C", "D"], "correct_answer": "C", "topic": "T", "explanation": "E""#,
        );
        let (_dir, service, _) = service_with(provider).await;

        let envelope = service.generate_questions(&request(None)).await;
        assert!(envelope.is_success());
        assert_eq!(envelope.note, Some("Recovered from incomplete JSON response"));
        assert_eq!(envelope.questions[0].correct_answer, "C");
    }

    #[tokio::test]
    async fn unusable_output_yields_error_envelopes() {
        let cases = [
            ("I cannot help with that.", "Failed to parse AI response as JSON"),
            (
                r#"[{"question": "only"}]"#,
                "Question generation failed: No valid questions generated after validation",
            ),
            (r#"{"question": "object"}"#, "Question generation failed: Response is not a list"),
        ];
        for (reply, expected) in cases {
            let (_dir, service, _) = service_with(ScriptedProvider::replying(reply)).await;
            let envelope = service.generate_questions(&request(None)).await;
            assert!(envelope.questions.is_empty());
            assert_eq!(envelope.error.as_deref(), Some(expected), "reply: {reply}");
        }
    }

    #[tokio::test]
    async fn blank_subject_and_blank_reply_are_rejected() {
        let (_dir, service, _) = service_with(ScriptedProvider::replying("  ")).await;

        let mut blank = request(None);
        blank.subject = "  ".to_string();
        let envelope = service.generate_questions(&blank).await;
        assert_eq!(envelope.error.as_deref(), Some("Subject must be a non-empty string"));

        let envelope = service.generate_questions(&request(None)).await;
        assert_eq!(envelope.error.as_deref(), Some("Empty response from AI model"));
    }

    #[tokio::test]
    async fn unconfigured_model_reports_unavailable() {
        let (_dir, service, _) = service_with(ScriptedProvider::unconfigured()).await;
        let envelope = service.generate_questions(&request(None)).await;
        assert_eq!(envelope.error.as_deref(), Some("AI service unavailable"));
    }
}
