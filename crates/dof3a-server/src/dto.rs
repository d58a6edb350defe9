//! Request and response bodies of the REST API.

use chrono::{DateTime, Utc};
use dof3a_core::{Comment, FriendRequest, Grade, Post, Student, StudyGroup, UserId};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const MAX_USER_INPUT_CHARS: usize = 2000;
pub const MAX_CONVERSATION_CONTEXT_CHARS: usize = 10000;
pub const MAX_SUBJECT_CHARS: usize = 100;
pub const MAX_GRADE_LEVEL_CHARS: usize = 50;
pub const MAX_CONTENT_CHARS: usize = 5000;

fn check_length(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::field(
            field,
            format!("Ensure this field has no more than {max} characters."),
        ));
    }
    Ok(())
}

fn check_not_blank(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::field(field, "This field may not be blank."));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_input: String,
    #[serde(default)]
    pub conversation_context: Option<String>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        check_not_blank("user_input", &self.user_input)?;
        check_length("user_input", &self.user_input, MAX_USER_INPUT_CHARS)?;
        if let Some(context) = &self.conversation_context {
            check_length("conversation_context", context, MAX_CONVERSATION_CONTEXT_CHARS)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default)]
    pub subject: Option<String>,
}

impl RecommendationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        match &self.subject {
            Some(subject) => check_length("subject", subject, MAX_SUBJECT_CHARS),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuestionGenerationRequest {
    pub subject: String,
    pub grade_level: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub num_questions: Option<i64>,
}

impl QuestionGenerationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        check_not_blank("subject", &self.subject)?;
        check_length("subject", &self.subject, MAX_SUBJECT_CHARS)?;
        check_not_blank("grade_level", &self.grade_level)?;
        check_length("grade_level", &self.grade_level, MAX_GRADE_LEVEL_CHARS)?;
        if let Some(difficulty) = &self.difficulty {
            if !["easy", "medium", "hard"].contains(&difficulty.as_str()) {
                return Err(AppError::field(
                    "difficulty",
                    format!("\"{difficulty}\" is not a valid choice."),
                ));
            }
        }
        if let Some(count) = self.num_questions {
            if !(1..=20).contains(&count) {
                return Err(AppError::field(
                    "num_questions",
                    "Ensure this value is between 1 and 20.",
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ModerationRequest {
    pub content: String,
    pub content_type: String,
}

impl ModerationRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        check_not_blank("content", &self.content)?;
        check_length("content", &self.content, MAX_CONTENT_CHARS)
    }
}

#[derive(Debug, Serialize)]
pub struct SimpleUser {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct StudentResponse {
    pub id: i64,
    pub user: SimpleUser,
    pub grade: Grade,
    pub score: u32,
}

impl From<Student> for StudentResponse {
    fn from(student: Student) -> Self {
        Self {
            id: student.id,
            user: SimpleUser {
                id: student.user_id,
                first_name: student.first_name,
                last_name: student.last_name,
                email: student.email,
            },
            grade: student.grade,
            score: student.score,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub grade: String,
}

impl UpdateProfileRequest {
    pub fn grade(&self) -> Result<Grade, AppError> {
        self.grade.parse::<Grade>().map_err(|_| {
            AppError::field("grade", format!("\"{}\" is not a valid choice.", self.grade))
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: i64,
    pub author: UserId,
    pub post: i64,
    pub body: String,
    pub likes: u32,
}

impl From<Comment> for CommentResponse {
    fn from(comment: Comment) -> Self {
        Self {
            id: comment.id,
            author: comment.author_id,
            post: comment.post_id,
            body: comment.body,
            likes: comment.likes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: i64,
    pub author: UserId,
    pub caption: String,
    pub description: String,
    pub comments: Vec<CommentResponse>,
}

impl PostResponse {
    pub fn new(post: Post, comments: Vec<Comment>) -> Self {
        Self {
            id: post.id,
            author: post.author_id,
            caption: post.caption,
            description: post.description,
            comments: comments.into_iter().map(CommentResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestSender {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct FriendRequestResponse {
    pub id: i64,
    pub from_student: RequestSender,
    pub timestamp: DateTime<Utc>,
}

impl From<FriendRequest> for FriendRequestResponse {
    fn from(request: FriendRequest) -> Self {
        Self {
            id: request.id,
            from_student: RequestSender {
                username: request.from_username,
                email: request.from_email,
            },
            timestamp: request.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StudyGroupResponse {
    pub id: i64,
    pub host: UserId,
    pub topic: String,
    pub location: String,
    pub scheduled_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<StudyGroup> for StudyGroupResponse {
    fn from(group: StudyGroup) -> Self {
        Self {
            id: group.id,
            host: group.host_id,
            topic: group.topic,
            location: group.location,
            scheduled_time: group.scheduled_time,
            created_at: group.created_at,
        }
    }
}
