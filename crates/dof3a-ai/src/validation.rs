//! Input checks shared by every AI operation.

use std::sync::OnceLock;

use dof3a_core::UserId;
use regex::Regex;

use crate::error::{AiError, AiResult};

pub const MAX_INPUT_CHARS: usize = 5000;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

fn injection_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?is)<script[^>]*>.*?</script>",
            r"(?i)javascript:",
            r"(?i)on\w+\s*=",
        ]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

pub fn validate_user_id(raw: i64) -> AiResult<UserId> {
    if raw <= 0 {
        return Err(AiError::Validation(format!(
            "Invalid user ID: {raw}. Must be a positive integer."
        )));
    }
    Ok(raw)
}

/// Clamps a listing limit to `1..=100`, defaulting to 10.
pub fn validate_limit(raw: Option<i64>) -> u32 {
    match raw {
        None => DEFAULT_LIMIT,
        Some(value) => value.clamp(1, i64::from(MAX_LIMIT)) as u32,
    }
}

/// Strips script blocks and inline handlers, caps the length and trims.
pub fn sanitize_input(text: &str) -> String {
    let mut cleaned = text.to_string();
    for pattern in injection_patterns() {
        cleaned = pattern.replace_all(&cleaned, "").into_owned();
    }

    let length = cleaned.chars().count();
    if length > MAX_INPUT_CHARS {
        log::warn!(
            "Input text truncated from {} to {} characters",
            length,
            MAX_INPUT_CHARS
        );
        cleaned = truncate_with_ellipsis(&cleaned, MAX_INPUT_CHARS);
    }

    cleaned.trim().to_string()
}

/// First `max_chars` characters followed by `...`, or the input unchanged
/// when it already fits.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
        None => text.to_string(),
    }
}

/// First `max_chars` characters without any marker.
pub fn take_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
