use std::future::Future;
use std::sync::Arc;

use dof3a_core::{
    Comment, Grade, PlatformStore, Post, StoreResult, Student, StudyGroup, StudyGroupFilter,
    StudyGroupInvite, User, UserId,
};
use serde::Serialize;

use crate::error::{AiError, AiResult};
use crate::formatter::format_context;
use crate::validation::{validate_limit, validate_user_id};

/// Records pulled per activity type.
pub const RECENT_ACTIVITY_LIMIT: u32 = 5;

/// Everything known about one user at a point in time. Sub-records that
/// could not be read are left empty.
#[derive(Debug, Clone, Serialize)]
pub struct UserSnapshot {
    pub user_id: UserId,
    pub user: Option<User>,
    pub student: Option<Student>,
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,
    pub study_groups: Vec<StudyGroup>,
    pub invites: Vec<StudyGroupInvite>,
}

impl UserSnapshot {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            user: None,
            student: None,
            posts: Vec::new(),
            comments: Vec::new(),
            study_groups: Vec::new(),
            invites: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct ContextAggregator {
    store: Arc<dyn PlatformStore>,
}

impl ContextAggregator {
    pub fn new(store: Arc<dyn PlatformStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn PlatformStore> {
        &self.store
    }

    /// Reads the profile and recent activity of `raw_user_id`. Only an
    /// invalid id is an error; lookup failures degrade to missing data.
    pub async fn collect(&self, raw_user_id: i64) -> AiResult<UserSnapshot> {
        let user_id = validate_user_id(raw_user_id)?;
        let store = &self.store;

        let user = tolerate(user_id, "profile", store.user(user_id))
            .await
            .flatten()
            .filter(|user| user.is_active);
        let student = tolerate(user_id, "student profile", store.student_for_user(user_id))
            .await
            .flatten();
        let posts = tolerate(
            user_id,
            "posts",
            store.posts_by_author(user_id, RECENT_ACTIVITY_LIMIT),
        )
        .await
        .unwrap_or_default();
        let comments = tolerate(
            user_id,
            "comments",
            store.comments_by_author(user_id, RECENT_ACTIVITY_LIMIT),
        )
        .await
        .unwrap_or_default();
        let study_groups = tolerate(
            user_id,
            "study groups",
            store.study_groups(StudyGroupFilter {
                host_id: Some(user_id),
                limit: RECENT_ACTIVITY_LIMIT,
                active_only: true,
            }),
        )
        .await
        .unwrap_or_default();
        let invites = tolerate(
            user_id,
            "study group invites",
            store.invites_for_user(user_id, RECENT_ACTIVITY_LIMIT),
        )
        .await
        .unwrap_or_default();

        log::info!(
            "Collected context for user {}: profile={}, posts={}, comments={}, groups={}, invites={}",
            user_id,
            user.is_some(),
            posts.len(),
            comments.len(),
            study_groups.len(),
            invites.len()
        );

        Ok(UserSnapshot {
            user_id,
            user,
            student,
            posts,
            comments,
            study_groups,
            invites,
        })
    }

    /// Formatted report for prompts; `User {id} not found in database.` when
    /// the user is missing or inactive.
    pub async fn user_context(&self, raw_user_id: i64) -> AiResult<String> {
        let snapshot = self.collect(raw_user_id).await?;
        Ok(format_context(&snapshot))
    }

    /// Active students in `grade`, best score first.
    pub async fn search_by_grade(&self, grade: &str, limit: Option<i64>) -> AiResult<Vec<Student>> {
        let grade = grade
            .parse::<Grade>()
            .map_err(|error| AiError::Validation(error.to_string()))?;
        let limit = validate_limit(limit);

        match self.store.students_by_grade(grade, limit).await {
            Ok(students) => Ok(students),
            Err(error) => {
                log::error!("Error searching users by grade {}: {}", grade, error);
                Ok(Vec::new())
            }
        }
    }
}

async fn tolerate<T>(
    user_id: UserId,
    what: &str,
    query: impl Future<Output = StoreResult<T>>,
) -> Option<T> {
    match query.await {
        Ok(value) => Some(value),
        Err(error) => {
            log::warn!("Failed to fetch {} for user {}: {}", what, user_id, error);
            None
        }
    }
}
