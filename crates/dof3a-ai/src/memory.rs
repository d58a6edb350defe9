//! Process-local state shared across requests: tutor conversation history
//! and per-day usage counters. Both reset when the process restarts.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use dof3a_core::UserId;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::validation::take_chars;

pub const MAX_HISTORY_LINES: usize = 20;
pub const PROMPT_HISTORY_LINES: usize = 5;
const TUTOR_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Default)]
pub struct ConversationMemory {
    histories: RwLock<HashMap<UserId, Vec<String>>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_exchange(&self, user_id: UserId, question: &str, response: &str) {
        let mut histories = self.histories.write().await;
        let history = histories.entry(user_id).or_default();
        history.push(format!("Student: {question}"));
        history.push(format!(
            "Tutor: {}...",
            take_chars(response, TUTOR_EXCERPT_CHARS)
        ));

        if history.len() > MAX_HISTORY_LINES {
            let excess = history.len() - MAX_HISTORY_LINES;
            history.drain(..excess);
        }
    }

    /// Last `lines` history lines joined with newlines, `None` if empty.
    pub async fn recent(&self, user_id: UserId, lines: usize) -> Option<String> {
        let histories = self.histories.read().await;
        let history = histories.get(&user_id)?;
        if history.is_empty() {
            return None;
        }
        let start = history.len().saturating_sub(lines);
        Some(history[start..].join("\n"))
    }

    pub async fn len(&self, user_id: UserId) -> usize {
        self.histories
            .read()
            .await
            .get(&user_id)
            .map_or(0, Vec::len)
    }

    pub async fn clear(&self, user_id: UserId) {
        self.histories.write().await.remove(&user_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AiFeature {
    Tutor,
    Questions,
    Recommendations,
    Moderation,
}

impl AiFeature {
    pub const ALL: [AiFeature; 4] = [
        AiFeature::Tutor,
        AiFeature::Questions,
        AiFeature::Recommendations,
        AiFeature::Moderation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AiFeature::Tutor => "tutor",
            AiFeature::Questions => "questions",
            AiFeature::Recommendations => "recommendations",
            AiFeature::Moderation => "moderation",
        }
    }
}

#[derive(Debug, Default)]
struct DailyUsage {
    day: Option<NaiveDate>,
    counts: HashMap<AiFeature, u32>,
}

impl DailyUsage {
    fn roll_to(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            self.day = Some(today);
            self.counts.clear();
        }
    }
}

/// Per-user counters of successful AI calls, reset at UTC midnight.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<HashMap<UserId, DailyUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn track(&self, user_id: UserId, feature: AiFeature) -> u32 {
        self.track_on(user_id, feature, Utc::now().date_naive()).await
    }

    async fn track_on(&self, user_id: UserId, feature: AiFeature, today: NaiveDate) -> u32 {
        let mut usage = self.usage.write().await;
        let daily = usage.entry(user_id).or_default();
        daily.roll_to(today);
        let count = daily.counts.entry(feature).or_insert(0);
        *count += 1;
        *count
    }

    pub async fn used_today(&self, user_id: UserId, feature: AiFeature) -> u32 {
        self.used_on(user_id, feature, Utc::now().date_naive()).await
    }

    async fn used_on(&self, user_id: UserId, feature: AiFeature, today: NaiveDate) -> u32 {
        let usage = self.usage.read().await;
        usage
            .get(&user_id)
            .filter(|daily| daily.day == Some(today))
            .and_then(|daily| daily.counts.get(&feature).copied())
            .unwrap_or(0)
    }

    /// `true` while the user is under `limit`; no limit always passes.
    pub async fn within_limit(&self, user_id: UserId, feature: AiFeature, limit: Option<u32>) -> bool {
        match limit {
            Some(limit) => self.used_today(user_id, feature).await < limit,
            None => true,
        }
    }

    /// Today's count for every feature, zeros included.
    pub async fn snapshot(&self, user_id: UserId) -> HashMap<AiFeature, u32> {
        let today = Utc::now().date_naive();
        let mut counts = HashMap::new();
        for feature in AiFeature::ALL {
            counts.insert(feature, self.used_on(user_id, feature, today).await);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_keeps_last_twenty_lines() {
        let memory = ConversationMemory::new();
        for index in 0..15 {
            memory
                .record_exchange(1, &format!("question {index}"), "answer")
                .await;
        }

        assert_eq!(memory.len(1).await, MAX_HISTORY_LINES);
        let recent = memory.recent(1, PROMPT_HISTORY_LINES).await.unwrap();
        let lines: Vec<&str> = recent.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "Tutor: answer...");
        assert_eq!(lines[4], "Tutor: answer...");
        assert_eq!(lines[3], "Student: question 14");
    }

    #[tokio::test]
    async fn tutor_lines_are_excerpted() {
        let memory = ConversationMemory::new();
        memory.record_exchange(2, "q", &"x".repeat(500)).await;
        let recent = memory.recent(2, 1).await.unwrap();
        assert_eq!(recent.len(), "Tutor: ".len() + 200 + 3);
        assert!(memory.recent(3, 5).await.is_none());

        memory.clear(2).await;
        assert_eq!(memory.len(2).await, 0);
    }

    #[tokio::test]
    async fn usage_counts_reset_on_a_new_day() {
        let tracker = UsageTracker::new();
        let monday = NaiveDate::from_ymd_opt(2026, 10, 12).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 10, 13).unwrap();

        assert_eq!(tracker.track_on(5, AiFeature::Tutor, monday).await, 1);
        assert_eq!(tracker.track_on(5, AiFeature::Tutor, monday).await, 2);
        assert_eq!(tracker.used_on(5, AiFeature::Tutor, monday).await, 2);
        assert_eq!(tracker.used_on(5, AiFeature::Tutor, tuesday).await, 0);
        assert_eq!(tracker.track_on(5, AiFeature::Tutor, tuesday).await, 1);
        assert_eq!(tracker.used_on(5, AiFeature::Questions, tuesday).await, 0);
    }

    #[tokio::test]
    async fn limits_are_enforced_per_feature() {
        let tracker = UsageTracker::new();
        tracker.track(8, AiFeature::Tutor).await;
        tracker.track(8, AiFeature::Tutor).await;

        assert!(!tracker.within_limit(8, AiFeature::Tutor, Some(2)).await);
        assert!(tracker.within_limit(8, AiFeature::Tutor, Some(3)).await);
        assert!(tracker.within_limit(8, AiFeature::Tutor, None).await);
        assert!(tracker.within_limit(8, AiFeature::Moderation, Some(1)).await);

        let snapshot = tracker.snapshot(8).await;
        assert_eq!(snapshot[&AiFeature::Tutor], 2);
        assert_eq!(snapshot[&AiFeature::Questions], 0);
    }
}
