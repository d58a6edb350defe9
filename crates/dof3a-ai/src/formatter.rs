//! Renders a [`UserSnapshot`] as the plain-text report embedded in prompts.

use std::fmt;

use dof3a_core::{Grade, User};

use crate::aggregator::UserSnapshot;

pub const USER_PROFILE_HEADER: &str = "=== USER PROFILE ===";
pub const STUDENT_PROFILE_HEADER: &str = "=== STUDENT PROFILE ===";
pub const RECENT_ACTIVITY_HEADER: &str = "=== RECENT ACTIVITY ===";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engagement {
    High,
    Moderate,
    Low,
}

impl Engagement {
    /// Platform engagement from posts, comments and hosted groups.
    pub fn from_activity(posts: usize, comments: usize, groups: usize) -> Self {
        Self::from_total(posts + comments + groups, 7, 3)
    }

    /// Engagement as used for question tuning, from posts and comments only.
    pub fn from_contributions(posts: usize, comments: usize) -> Self {
        Self::from_total(posts + comments, 5, 2)
    }

    fn from_total(total: usize, high_above: usize, moderate_above: usize) -> Self {
        if total > high_above {
            Engagement::High
        } else if total > moderate_above {
            Engagement::Moderate
        } else {
            Engagement::Low
        }
    }
}

impl fmt::Display for Engagement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engagement::High => "High",
            Engagement::Moderate => "Moderate",
            Engagement::Low => "Low",
        })
    }
}

pub fn user_type(user: &User, has_student: bool) -> &'static str {
    if user.is_superuser {
        "Administrator"
    } else if user.is_staff {
        "Staff Member"
    } else if has_student {
        "Student"
    } else {
        "Regular User"
    }
}

pub fn academic_focus(grade: Grade) -> &'static str {
    if grade.is_middle() {
        "Foundation building and core concepts"
    } else if grade.is_senior() {
        "Advanced concepts and university preparation"
    } else {
        "General education"
    }
}

pub fn format_context(snapshot: &UserSnapshot) -> String {
    let Some(user) = snapshot.user.as_ref() else {
        return format!("User {} not found in database.", snapshot.user_id);
    };

    let last_login = user
        .last_login
        .map(|at| at.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Never".to_string());
    let status = if user.is_active { "Active" } else { "Inactive" };

    let mut lines = vec![
        USER_PROFILE_HEADER.to_string(),
        format!(
            "Name: {} {} (@{})",
            user.first_name, user.last_name, user.username
        ),
        format!("Email: {}", user.email),
        format!("User Type: {}", user_type(user, snapshot.student.is_some())),
        format!("Account Created: {}", user.date_joined.format("%Y-%m-%d")),
        format!("Last Login: {last_login}"),
        format!("Account Status: {status}"),
        String::new(),
        STUDENT_PROFILE_HEADER.to_string(),
    ];

    match snapshot.student.as_ref() {
        Some(student) => {
            lines.push(format!("Grade Level: {}", student.grade));
            lines.push(format!("Current Score: {} points", student.score));
            lines.push(format!("Academic Focus: {}", academic_focus(student.grade)));
        }
        None => lines.push("No student profile available".to_string()),
    }

    let engagement = Engagement::from_activity(
        snapshot.posts.len(),
        snapshot.comments.len(),
        snapshot.study_groups.len(),
    );
    lines.extend([
        String::new(),
        RECENT_ACTIVITY_HEADER.to_string(),
        format!("Recent Posts: {} posts", snapshot.posts.len()),
        format!("Recent Comments: {} comments", snapshot.comments.len()),
        format!("Study Groups Hosted: {} groups", snapshot.study_groups.len()),
        format!("Study Group Invites: {} invites", snapshot.invites.len()),
        format!("Platform Engagement: {engagement}"),
    ]);

    lines.join("\n")
}
