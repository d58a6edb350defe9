mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    Comment, FriendRequest, Grade, LikeOutcome, NewPost, NewStudyGroup, NewUser, Post, Student,
    StudyGroup, StudyGroupFilter, StudyGroupInvite, User, UserId,
};

pub use sqlite::SqlitePlatformStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task join error: {0}")]
    Task(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Persistence for every platform record. Lookups return `Ok(None)` for
/// missing rows; mutations of missing rows return `StoreError::NotFound`.
#[async_trait]
pub trait PlatformStore: Send + Sync {
    async fn init(&self) -> StoreResult<()>;

    /// Creates the user together with its student row (score 0, no grade).
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn user(&self, user_id: UserId) -> StoreResult<Option<User>>;
    async fn set_user_active(&self, user_id: UserId, active: bool) -> StoreResult<()>;
    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> StoreResult<()>;

    async fn issue_token(&self, user_id: UserId) -> StoreResult<String>;
    /// Resolves a bearer token to its owner; inactive owners resolve to `None`.
    async fn user_for_token(&self, token: &str) -> StoreResult<Option<User>>;

    async fn student(&self, student_id: i64) -> StoreResult<Option<Student>>;
    async fn student_for_user(&self, user_id: UserId) -> StoreResult<Option<Student>>;
    async fn list_students(&self) -> StoreResult<Vec<Student>>;
    async fn update_student_grade(&self, user_id: UserId, grade: Grade) -> StoreResult<Student>;
    async fn set_student_score(&self, user_id: UserId, score: u32) -> StoreResult<()>;
    /// Students of active users in `grade`, highest score first.
    async fn students_by_grade(&self, grade: Grade, limit: u32) -> StoreResult<Vec<Student>>;

    async fn create_post(&self, author_id: UserId, post: NewPost) -> StoreResult<Post>;
    async fn post(&self, post_id: i64) -> StoreResult<Option<Post>>;
    async fn list_posts(&self) -> StoreResult<Vec<Post>>;
    async fn update_post(&self, post_id: i64, post: NewPost) -> StoreResult<Post>;
    async fn delete_post(&self, post_id: i64) -> StoreResult<()>;
    /// Newest first.
    async fn posts_by_author(&self, author_id: UserId, limit: u32) -> StoreResult<Vec<Post>>;

    async fn create_comment(
        &self,
        author_id: UserId,
        post_id: i64,
        body: &str,
    ) -> StoreResult<Comment>;
    async fn comment(&self, post_id: i64, comment_id: i64) -> StoreResult<Option<Comment>>;
    async fn comments_for_post(&self, post_id: i64) -> StoreResult<Vec<Comment>>;
    async fn update_comment(&self, comment_id: i64, body: &str) -> StoreResult<Comment>;
    async fn delete_comment(&self, comment_id: i64) -> StoreResult<()>;
    async fn comments_by_author(&self, author_id: UserId, limit: u32)
        -> StoreResult<Vec<Comment>>;
    async fn like_comment(&self, comment_id: i64, user_id: UserId) -> StoreResult<LikeOutcome>;

    async fn create_study_group(
        &self,
        host_id: UserId,
        group: NewStudyGroup,
    ) -> StoreResult<StudyGroup>;
    /// Newest first.
    async fn study_groups(&self, filter: StudyGroupFilter) -> StoreResult<Vec<StudyGroup>>;
    async fn create_invite(&self, group_id: i64, user_id: UserId)
        -> StoreResult<StudyGroupInvite>;
    async fn invites_for_user(&self, user_id: UserId, limit: u32)
        -> StoreResult<Vec<StudyGroupInvite>>;

    /// Returns the existing request with `false` when one is already pending.
    async fn send_friend_request(
        &self,
        from_student_id: i64,
        to_student_id: i64,
    ) -> StoreResult<(FriendRequest, bool)>;
    async fn incoming_friend_requests(&self, student_id: i64) -> StoreResult<Vec<FriendRequest>>;
    async fn friend_request(&self, request_id: i64) -> StoreResult<Option<FriendRequest>>;
    /// Links both students as friends and removes the request.
    async fn accept_friend_request(&self, request_id: i64) -> StoreResult<()>;
    async fn delete_friend_request(&self, request_id: i64) -> StoreResult<()>;
    async fn friends(&self, student_id: i64) -> StoreResult<Vec<Student>>;
}
