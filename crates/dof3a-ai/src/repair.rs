//! Best-effort extraction of JSON from model output.
//!
//! Models wrap JSON in markdown fences, add chatter around it, or stop
//! mid-structure when they hit the token limit. [`parse_model_json`] peels
//! those layers off in order and, as a last resort, appends the missing
//! closing brackets.

use serde_json::Value;
use thiserror::Error;

/// Upper bound on closers appended during repair. Larger imbalances mean the
/// output was cut off too early to trust.
pub const MAX_REPAIR_CLOSERS: usize = 4;

pub const REPAIR_NOTE: &str = "Recovered from incomplete JSON response";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepairError {
    #[error("response is empty")]
    Empty,

    #[error("{0}")]
    Unrecoverable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Array,
    Object,
}

impl JsonShape {
    fn opener(self) -> char {
        match self {
            JsonShape::Array => '[',
            JsonShape::Object => '{',
        }
    }

    fn closer(self) -> char {
        match self {
            JsonShape::Array => ']',
            JsonShape::Object => '}',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    pub value: Value,
    /// Closers had to be appended to parse the text.
    pub repaired: bool,
}

impl RepairOutcome {
    pub fn note(&self) -> Option<&'static str> {
        self.repaired.then_some(REPAIR_NOTE)
    }
}

pub fn parse_model_json(text: &str, shape: JsonShape) -> Result<RepairOutcome, RepairError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RepairError::Empty);
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(RepairOutcome {
            value,
            repaired: false,
        });
    }

    let unfenced = strip_code_fence(trimmed);
    let candidate = extract_structure(unfenced, shape);
    log::debug!(
        "Cleaned response for parsing: {}",
        crate::validation::take_chars(candidate, 300)
    );

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Ok(RepairOutcome {
            value,
            repaired: false,
        }),
        Err(error) => {
            log::warn!("Failed to parse model response as JSON: {}", error);
            balance_closers(candidate, shape).map(|value| RepairOutcome {
                value,
                repaired: true,
            })
        }
    }
}

/// Contents of the first ```` ```json ```` fence, else the first bare fence.
/// Unterminated fences leave the text as-is.
fn strip_code_fence(text: &str) -> &str {
    for marker in ["```json", "```"] {
        if let Some(start) = text.find(marker) {
            let body_start = start + marker.len();
            return match text[body_start..].find("```") {
                Some(end) => text[body_start..body_start + end].trim(),
                None => text,
            };
        }
    }
    text
}

/// Widest `opener..closer` span; when no closer follows the first opener,
/// everything from the opener on.
fn extract_structure(text: &str, shape: JsonShape) -> &str {
    if text.starts_with(shape.opener()) {
        return text;
    }

    let Some(start) = text.find(shape.opener()) else {
        return text;
    };
    match text.rfind(shape.closer()) {
        Some(end) if end > start => &text[start..=end],
        _ => &text[start..],
    }
}

fn balance_closers(text: &str, shape: JsonShape) -> Result<Value, RepairError> {
    let count = |c: char| text.chars().filter(|&ch| ch == c).count();
    let missing_brackets = count('[').saturating_sub(count(']'));
    let missing_braces = count('{').saturating_sub(count('}'));

    let total = missing_brackets + missing_braces;
    if total == 0 {
        return Err(RepairError::Unrecoverable(
            "brackets are balanced but the text is not valid JSON".to_string(),
        ));
    }
    if total > MAX_REPAIR_CLOSERS {
        return Err(RepairError::Unrecoverable(format!(
            "{total} missing closers exceeds the repair limit of {MAX_REPAIR_CLOSERS}"
        )));
    }

    let braces = "}".repeat(missing_braces);
    let brackets = "]".repeat(missing_brackets);
    let fixed = match shape {
        JsonShape::Array => format!("{text}{braces}{brackets}"),
        JsonShape::Object => format!("{text}{brackets}{braces}"),
    };

    match serde_json::from_str::<Value>(&fixed) {
        Ok(value) => {
            log::info!(
                "Parsed JSON after appending {} braces and {} brackets",
                missing_braces,
                missing_brackets
            );
            Ok(value)
        }
        Err(error) => Err(RepairError::Unrecoverable(format!(
            "still invalid after appending closers: {error}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_parses_without_repair() {
        let outcome = parse_model_json(r#" [{"a": 1}] "#, JsonShape::Array).unwrap();
        assert_eq!(outcome.value, json!([{"a": 1}]));
        assert!(!outcome.repaired);
        assert_eq!(outcome.note(), None);
    }

    #[test]
    fn json_fence_is_preferred_over_bare_fence() {
        let text = "Here you go:\n```json\n{\"focus_areas\": [\"Algebra\"]}\n```\nGood luck!";
        let outcome = parse_model_json(text, JsonShape::Object).unwrap();
        assert_eq!(outcome.value, json!({"focus_areas": ["Algebra"]}));
    }

    #[test]
    fn bare_fence_is_stripped() {
        let text = "```\n[1, 2, 3]\n```";
        let outcome = parse_model_json(text, JsonShape::Array).unwrap();
        assert_eq!(outcome.value, json!([1, 2, 3]));
    }

    #[test]
    fn structure_is_extracted_from_surrounding_chatter() {
        let text = "Sure! The questions are [{\"q\": \"1+1\"}] - enjoy.";
        let outcome = parse_model_json(text, JsonShape::Array).unwrap();
        assert_eq!(outcome.value, json!([{"q": "1+1"}]));
        assert!(!outcome.repaired);
    }

    #[test]
    fn array_truncated_mid_object_is_recovered() {
        let text = r#"[{"question": "2+2?", "correct_answer": "B"}, {"question": "3+3?", "correct_answer": "C""#;
        let outcome = parse_model_json(text, JsonShape::Array).unwrap();
        assert!(outcome.repaired);
        assert_eq!(outcome.note(), Some(REPAIR_NOTE));
        assert_eq!(outcome.value.as_array().map(Vec::len), Some(2));
        assert_eq!(outcome.value[1]["correct_answer"], "C");
    }

    #[test]
    fn truncated_fence_without_closing_marker_is_still_recovered() {
        let text = "```json\n[{\"question\": \"Define a cell\", \"topic\": \"Cell Biology\"}";
        let outcome = parse_model_json(text, JsonShape::Array).unwrap();
        assert!(outcome.repaired);
        assert_eq!(outcome.value[0]["topic"], "Cell Biology");
    }

    #[test]
    fn object_truncated_inside_list_closes_brackets_first() {
        let text = r#"{"recommendations": ["Review fractions", "Practice daily""#;
        let outcome = parse_model_json(text, JsonShape::Object).unwrap();
        assert!(outcome.repaired);
        assert_eq!(
            outcome.value,
            json!({"recommendations": ["Review fractions", "Practice daily"]})
        );
    }

    #[test]
    fn imbalance_beyond_limit_fails_cleanly() {
        let text = r#"[{"a": [{"b": [{"c": 1"#;
        let error = parse_model_json(text, JsonShape::Array).unwrap_err();
        assert!(matches!(error, RepairError::Unrecoverable(message) if message.contains("exceeds")));
    }

    #[test]
    fn truncation_inside_a_string_is_unrecoverable() {
        let text = r#"[{"question": "What is the capi"#;
        assert!(matches!(
            parse_model_json(text, JsonShape::Array),
            Err(RepairError::Unrecoverable(_))
        ));
    }

    #[test]
    fn empty_and_non_json_text_fail() {
        assert_eq!(
            parse_model_json("   ", JsonShape::Object),
            Err(RepairError::Empty)
        );
        assert!(matches!(
            parse_model_json("I cannot help with that.", JsonShape::Object),
            Err(RepairError::Unrecoverable(_))
        ));
    }
}
