//! Platform records as they are read back from storage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type UserId = i64;

/// School level of a student. The first variant is the placeholder a
/// freshly created student carries until they pick a grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Grade {
    #[default]
    #[serde(rename = "Please select an option")]
    Unselected,
    #[serde(rename = "Middle 1")]
    MiddleOne,
    #[serde(rename = "Middle 2")]
    MiddleTwo,
    #[serde(rename = "Middle 3")]
    MiddleThree,
    #[serde(rename = "Senior 1")]
    SeniorOne,
    #[serde(rename = "Senior 2")]
    SeniorTwo,
    #[serde(rename = "Senior 3")]
    SeniorThree,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown grade: {0}")]
pub struct ParseGradeError(pub String);

impl Grade {
    pub const ALL: [Grade; 7] = [
        Grade::Unselected,
        Grade::MiddleOne,
        Grade::MiddleTwo,
        Grade::MiddleThree,
        Grade::SeniorOne,
        Grade::SeniorTwo,
        Grade::SeniorThree,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::Unselected => "Please select an option",
            Grade::MiddleOne => "Middle 1",
            Grade::MiddleTwo => "Middle 2",
            Grade::MiddleThree => "Middle 3",
            Grade::SeniorOne => "Senior 1",
            Grade::SeniorTwo => "Senior 2",
            Grade::SeniorThree => "Senior 3",
        }
    }

    pub fn is_middle(&self) -> bool {
        matches!(
            self,
            Grade::MiddleOne | Grade::MiddleTwo | Grade::MiddleThree
        )
    }

    pub fn is_senior(&self) -> bool {
        matches!(
            self,
            Grade::SeniorOne | Grade::SeniorTwo | Grade::SeniorThree
        )
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = ParseGradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Grade::ALL
            .iter()
            .copied()
            .find(|grade| grade.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseGradeError(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

/// Student row joined with the owning user's public fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub user_id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub score: u32,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub author_id: UserId,
    pub author_username: String,
    pub caption: String,
    pub description: String,
    pub likes: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPost {
    pub caption: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub author_id: UserId,
    pub author_username: String,
    pub post_id: i64,
    pub body: String,
    pub likes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked { likes: u32 },
    AlreadyLiked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyGroup {
    pub id: i64,
    pub host_id: UserId,
    pub host_username: String,
    pub topic: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub scheduled_time: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStudyGroup {
    pub topic: String,
    #[serde(default)]
    pub location: String,
    pub scheduled_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StudyGroupFilter {
    pub host_id: Option<UserId>,
    pub limit: u32,
    pub active_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyGroupInvite {
    pub id: i64,
    pub group_id: i64,
    pub group_topic: String,
    pub student_id: UserId,
    pub student_username: String,
    pub accepted: bool,
    pub responded: bool,
    pub notified: bool,
}

impl StudyGroupInvite {
    pub fn status_label(&self) -> &'static str {
        if self.accepted {
            "Accepted"
        } else if self.responded {
            "Responded"
        } else {
            "Pending"
        }
    }
}

/// Friend request between two students. `from_*` carries the sender's user
/// fields so listings need no extra lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: i64,
    pub from_student_id: i64,
    pub from_username: String,
    pub from_email: String,
    pub to_student_id: i64,
    pub is_accepted: bool,
    pub timestamp: DateTime<Utc>,
}
