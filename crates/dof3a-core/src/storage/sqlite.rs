use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{PlatformStore, StoreError, StoreResult};
use crate::models::{
    Comment, FriendRequest, Grade, LikeOutcome, NewPost, NewStudyGroup, NewUser, Post, Student,
    StudyGroup, StudyGroupFilter, StudyGroupInvite, User, UserId,
};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.first_name, u.last_name, \
     u.date_joined, u.last_login, u.is_active, u.is_staff, u.is_superuser";

const STUDENT_SELECT: &str = "SELECT s.id, s.user_id, u.username, u.email, u.first_name, \
     u.last_name, s.score, s.grade FROM students s JOIN users u ON u.id = s.user_id";

const POST_SELECT: &str = "SELECT p.id, p.author_id, u.username, p.caption, p.description, \
     p.likes FROM posts p JOIN users u ON u.id = p.author_id";

const COMMENT_SELECT: &str = "SELECT c.id, c.author_id, u.username, c.post_id, c.body, \
     (SELECT COUNT(*) FROM comment_likes l WHERE l.comment_id = c.id) \
     FROM comments c JOIN users u ON u.id = c.author_id";

const GROUP_SELECT: &str = "SELECT g.id, g.host_id, u.username, g.topic, g.location, \
     g.created_at, g.scheduled_time, g.is_active \
     FROM study_groups g JOIN users u ON u.id = g.host_id";

const INVITE_SELECT: &str = "SELECT i.id, i.group_id, g.topic, i.user_id, u.username, \
     i.accepted, i.responded, i.notified FROM study_group_invites i \
     JOIN study_groups g ON g.id = i.group_id JOIN users u ON u.id = i.user_id";

const FRIEND_REQUEST_SELECT: &str = "SELECT f.id, f.from_student_id, u.username, u.email, \
     f.to_student_id, f.is_accepted, f.timestamp FROM friend_requests f \
     JOIN students s ON s.id = f.from_student_id JOIN users u ON u.id = s.user_id";

/// SQLite-backed [`PlatformStore`]. Each operation opens its own connection on
/// the blocking pool.
#[derive(Debug, Clone)]
pub struct SqlitePlatformStore {
    db_path: PathBuf,
}

impl SqlitePlatformStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    async fn with_connection<T, F>(&self, func: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = open_connection(&db_path)?;
            func(&connection)
        })
        .await
        .map_err(|error| StoreError::Task(error.to_string()))?
    }
}

#[async_trait]
impl PlatformStore for SqlitePlatformStore {
    async fn init(&self) -> StoreResult<()> {
        self.with_connection(|connection| {
            connection.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    email TEXT NOT NULL DEFAULT '',
                    first_name TEXT NOT NULL DEFAULT '',
                    last_name TEXT NOT NULL DEFAULT '',
                    date_joined TEXT NOT NULL,
                    last_login TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    is_staff INTEGER NOT NULL DEFAULT 0,
                    is_superuser INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS students (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL UNIQUE,
                    score INTEGER NOT NULL DEFAULT 0,
                    grade TEXT NOT NULL DEFAULT 'Please select an option',
                    FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS api_tokens (
                    token TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS posts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    author_id INTEGER NOT NULL,
                    caption TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    likes INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY(author_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    author_id INTEGER NOT NULL,
                    post_id INTEGER NOT NULL,
                    body TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    FOREIGN KEY(author_id) REFERENCES users(id) ON DELETE CASCADE,
                    FOREIGN KEY(post_id) REFERENCES posts(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS comment_likes (
                    comment_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    PRIMARY KEY(comment_id, user_id),
                    FOREIGN KEY(comment_id) REFERENCES comments(id) ON DELETE CASCADE,
                    FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS study_groups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    host_id INTEGER NOT NULL,
                    topic TEXT NOT NULL,
                    location TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    scheduled_time TEXT NOT NULL,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    FOREIGN KEY(host_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS study_group_invites (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    group_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    accepted INTEGER NOT NULL DEFAULT 0,
                    responded INTEGER NOT NULL DEFAULT 0,
                    notified INTEGER NOT NULL DEFAULT 0,
                    FOREIGN KEY(group_id) REFERENCES study_groups(id) ON DELETE CASCADE,
                    FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS friend_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    from_student_id INTEGER NOT NULL,
                    to_student_id INTEGER NOT NULL,
                    is_accepted INTEGER NOT NULL DEFAULT 0,
                    timestamp TEXT NOT NULL,
                    UNIQUE(from_student_id, to_student_id),
                    FOREIGN KEY(from_student_id) REFERENCES students(id) ON DELETE CASCADE,
                    FOREIGN KEY(to_student_id) REFERENCES students(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS friendships (
                    student_id INTEGER NOT NULL,
                    friend_id INTEGER NOT NULL,
                    PRIMARY KEY(student_id, friend_id),
                    FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
                    FOREIGN KEY(friend_id) REFERENCES students(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
                CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
                CREATE INDEX IF NOT EXISTS idx_comments_author ON comments(author_id);
                CREATE INDEX IF NOT EXISTS idx_groups_host ON study_groups(host_id);
                CREATE INDEX IF NOT EXISTS idx_invites_user ON study_group_invites(user_id);
                CREATE INDEX IF NOT EXISTS idx_students_grade ON students(grade);
                "#,
            )?;
            Ok(())
        })
        .await
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        self.with_connection(move |connection| {
            let transaction = connection.unchecked_transaction()?;
            let taken: bool = transaction.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                params![user.username],
                |row| row.get(0),
            )?;
            if taken {
                return Err(StoreError::Conflict(format!(
                    "username '{}' already exists",
                    user.username
                )));
            }

            transaction.execute(
                r#"
                INSERT INTO users (username, email, first_name, last_name, date_joined,
                                   is_active, is_staff, is_superuser)
                VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)
                "#,
                params![
                    user.username,
                    user.email,
                    user.first_name,
                    user.last_name,
                    format_timestamp(Utc::now()),
                    user.is_staff,
                    user.is_superuser,
                ],
            )
            .map_err(|error| {
                conflict_on_unique(error, || format!("username '{}' already exists", user.username))
            })?;
            let user_id = transaction.last_insert_rowid();
            transaction.execute(
                "INSERT INTO students (user_id, score, grade) VALUES (?1, 0, ?2)",
                params![user_id, Grade::Unselected.as_str()],
            )?;
            transaction.commit()?;

            load_user(connection, user_id)?
                .ok_or_else(|| StoreError::NotFound(format!("user {user_id}")))
        })
        .await
    }

    async fn user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        self.with_connection(move |connection| load_user(connection, user_id))
            .await
    }

    async fn set_user_active(&self, user_id: UserId, active: bool) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE users SET is_active = ?1 WHERE id = ?2",
                params![active, user_id],
            )?;
            ensure_changed(changed, || format!("user {user_id}"))
        })
        .await
    }

    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE users SET last_login = ?1 WHERE id = ?2",
                params![format_timestamp(at), user_id],
            )?;
            ensure_changed(changed, || format!("user {user_id}"))
        })
        .await
    }

    async fn issue_token(&self, user_id: UserId) -> StoreResult<String> {
        self.with_connection(move |connection| {
            if load_user(connection, user_id)?.is_none() {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }
            let token = uuid::Uuid::new_v4().simple().to_string();
            connection.execute(
                "INSERT INTO api_tokens (token, user_id, created_at) VALUES (?1, ?2, ?3)",
                params![token, user_id, format_timestamp(Utc::now())],
            )?;
            Ok(token)
        })
        .await
    }

    async fn user_for_token(&self, token: &str) -> StoreResult<Option<User>> {
        let token = token.to_string();
        self.with_connection(move |connection| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM api_tokens t JOIN users u ON u.id = t.user_id \
                 WHERE t.token = ?1 AND u.is_active = 1"
            );
            Ok(connection
                .query_row(&sql, params![token], map_user)
                .optional()?)
        })
        .await
    }

    async fn student(&self, student_id: i64) -> StoreResult<Option<Student>> {
        self.with_connection(move |connection| {
            let sql = format!("{STUDENT_SELECT} WHERE s.id = ?1");
            Ok(connection
                .query_row(&sql, params![student_id], map_student)
                .optional()?)
        })
        .await
    }

    async fn student_for_user(&self, user_id: UserId) -> StoreResult<Option<Student>> {
        self.with_connection(move |connection| load_student_for_user(connection, user_id))
            .await
    }

    async fn list_students(&self) -> StoreResult<Vec<Student>> {
        self.with_connection(|connection| {
            let sql = format!("{STUDENT_SELECT} ORDER BY s.id ASC");
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map([], map_student)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn update_student_grade(&self, user_id: UserId, grade: Grade) -> StoreResult<Student> {
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE students SET grade = ?1 WHERE user_id = ?2",
                params![grade.as_str(), user_id],
            )?;
            ensure_changed(changed, || format!("student for user {user_id}"))?;
            load_student_for_user(connection, user_id)?
                .ok_or_else(|| StoreError::NotFound(format!("student for user {user_id}")))
        })
        .await
    }

    async fn set_student_score(&self, user_id: UserId, score: u32) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE students SET score = ?1 WHERE user_id = ?2",
                params![score, user_id],
            )?;
            ensure_changed(changed, || format!("student for user {user_id}"))
        })
        .await
    }

    async fn students_by_grade(&self, grade: Grade, limit: u32) -> StoreResult<Vec<Student>> {
        self.with_connection(move |connection| {
            let sql = format!(
                "{STUDENT_SELECT} WHERE s.grade = ?1 AND u.is_active = 1 \
                 ORDER BY s.score DESC, s.id ASC LIMIT ?2"
            );
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map(params![grade.as_str(), limit], map_student)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn create_post(&self, author_id: UserId, post: NewPost) -> StoreResult<Post> {
        self.with_connection(move |connection| {
            connection.execute(
                "INSERT INTO posts (author_id, caption, description, likes, created_at) \
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![
                    author_id,
                    post.caption,
                    post.description,
                    format_timestamp(Utc::now())
                ],
            )?;
            let post_id = connection.last_insert_rowid();
            load_post(connection, post_id)?
                .ok_or_else(|| StoreError::NotFound(format!("post {post_id}")))
        })
        .await
    }

    async fn post(&self, post_id: i64) -> StoreResult<Option<Post>> {
        self.with_connection(move |connection| load_post(connection, post_id))
            .await
    }

    async fn list_posts(&self) -> StoreResult<Vec<Post>> {
        self.with_connection(|connection| {
            let sql = format!("{POST_SELECT} ORDER BY p.id DESC");
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map([], map_post)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn update_post(&self, post_id: i64, post: NewPost) -> StoreResult<Post> {
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE posts SET caption = ?1, description = ?2 WHERE id = ?3",
                params![post.caption, post.description, post_id],
            )?;
            ensure_changed(changed, || format!("post {post_id}"))?;
            load_post(connection, post_id)?
                .ok_or_else(|| StoreError::NotFound(format!("post {post_id}")))
        })
        .await
    }

    async fn delete_post(&self, post_id: i64) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let changed = connection.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
            ensure_changed(changed, || format!("post {post_id}"))
        })
        .await
    }

    async fn posts_by_author(&self, author_id: UserId, limit: u32) -> StoreResult<Vec<Post>> {
        self.with_connection(move |connection| {
            let sql = format!(
                "{POST_SELECT} WHERE p.author_id = ?1 ORDER BY p.id DESC LIMIT ?2"
            );
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map(params![author_id, limit], map_post)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn create_comment(
        &self,
        author_id: UserId,
        post_id: i64,
        body: &str,
    ) -> StoreResult<Comment> {
        let body = body.to_string();
        self.with_connection(move |connection| {
            if load_post(connection, post_id)?.is_none() {
                return Err(StoreError::NotFound(format!("post {post_id}")));
            }
            connection.execute(
                "INSERT INTO comments (author_id, post_id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![author_id, post_id, body, format_timestamp(Utc::now())],
            )?;
            let comment_id = connection.last_insert_rowid();
            load_comment(connection, comment_id)?
                .ok_or_else(|| StoreError::NotFound(format!("comment {comment_id}")))
        })
        .await
    }

    async fn comment(&self, post_id: i64, comment_id: i64) -> StoreResult<Option<Comment>> {
        self.with_connection(move |connection| {
            Ok(load_comment(connection, comment_id)?.filter(|comment| comment.post_id == post_id))
        })
        .await
    }

    async fn comments_for_post(&self, post_id: i64) -> StoreResult<Vec<Comment>> {
        self.with_connection(move |connection| {
            let sql = format!("{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.id ASC");
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map(params![post_id], map_comment)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn update_comment(&self, comment_id: i64, body: &str) -> StoreResult<Comment> {
        let body = body.to_string();
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "UPDATE comments SET body = ?1 WHERE id = ?2",
                params![body, comment_id],
            )?;
            ensure_changed(changed, || format!("comment {comment_id}"))?;
            load_comment(connection, comment_id)?
                .ok_or_else(|| StoreError::NotFound(format!("comment {comment_id}")))
        })
        .await
    }

    async fn delete_comment(&self, comment_id: i64) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let changed =
                connection.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
            ensure_changed(changed, || format!("comment {comment_id}"))
        })
        .await
    }

    async fn comments_by_author(
        &self,
        author_id: UserId,
        limit: u32,
    ) -> StoreResult<Vec<Comment>> {
        self.with_connection(move |connection| {
            let sql = format!(
                "{COMMENT_SELECT} WHERE c.author_id = ?1 ORDER BY c.id DESC LIMIT ?2"
            );
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map(params![author_id, limit], map_comment)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn like_comment(&self, comment_id: i64, user_id: UserId) -> StoreResult<LikeOutcome> {
        self.with_connection(move |connection| {
            let comment = load_comment(connection, comment_id)?
                .ok_or_else(|| StoreError::NotFound(format!("comment {comment_id}")))?;
            let inserted = connection.execute(
                "INSERT OR IGNORE INTO comment_likes (comment_id, user_id) VALUES (?1, ?2)",
                params![comment_id, user_id],
            )?;
            if inserted == 0 {
                return Ok(LikeOutcome::AlreadyLiked);
            }
            Ok(LikeOutcome::Liked {
                likes: comment.likes + 1,
            })
        })
        .await
    }

    async fn create_study_group(
        &self,
        host_id: UserId,
        group: NewStudyGroup,
    ) -> StoreResult<StudyGroup> {
        self.with_connection(move |connection| {
            connection.execute(
                "INSERT INTO study_groups (host_id, topic, location, created_at, scheduled_time, is_active) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                params![
                    host_id,
                    group.topic,
                    group.location,
                    format_timestamp(Utc::now()),
                    format_timestamp(group.scheduled_time),
                ],
            )?;
            let group_id = connection.last_insert_rowid();
            load_study_group(connection, group_id)?
                .ok_or_else(|| StoreError::NotFound(format!("study group {group_id}")))
        })
        .await
    }

    async fn study_groups(&self, filter: StudyGroupFilter) -> StoreResult<Vec<StudyGroup>> {
        self.with_connection(move |connection| {
            // LIMIT -1 is unbounded in SQLite.
            let limit: i64 = if filter.limit == 0 {
                -1
            } else {
                i64::from(filter.limit)
            };
            let sql = format!(
                "{GROUP_SELECT} WHERE (?1 IS NULL OR g.host_id = ?1) AND (?2 = 0 OR g.is_active = 1) \
                 ORDER BY g.id DESC LIMIT ?3"
            );
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map(
                params![filter.host_id, filter.active_only, limit],
                map_study_group,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn create_invite(
        &self,
        group_id: i64,
        user_id: UserId,
    ) -> StoreResult<StudyGroupInvite> {
        self.with_connection(move |connection| {
            if load_study_group(connection, group_id)?.is_none() {
                return Err(StoreError::NotFound(format!("study group {group_id}")));
            }
            if load_user(connection, user_id)?.is_none() {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }
            connection.execute(
                "INSERT INTO study_group_invites (group_id, user_id) VALUES (?1, ?2)",
                params![group_id, user_id],
            )?;
            let invite_id = connection.last_insert_rowid();
            let sql = format!("{INVITE_SELECT} WHERE i.id = ?1");
            Ok(connection.query_row(&sql, params![invite_id], map_invite)?)
        })
        .await
    }

    async fn invites_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> StoreResult<Vec<StudyGroupInvite>> {
        self.with_connection(move |connection| {
            let sql = format!("{INVITE_SELECT} WHERE i.user_id = ?1 ORDER BY i.id DESC LIMIT ?2");
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map(params![user_id, limit], map_invite)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn send_friend_request(
        &self,
        from_student_id: i64,
        to_student_id: i64,
    ) -> StoreResult<(FriendRequest, bool)> {
        self.with_connection(move |connection| {
            if from_student_id == to_student_id {
                return Err(StoreError::Conflict(
                    "cannot send a friend request to yourself".to_string(),
                ));
            }
            for student_id in [from_student_id, to_student_id] {
                let exists: bool = connection.query_row(
                    "SELECT EXISTS(SELECT 1 FROM students WHERE id = ?1)",
                    params![student_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(StoreError::NotFound(format!("student {student_id}")));
                }
            }

            let sql = format!("{FRIEND_REQUEST_SELECT} WHERE f.from_student_id = ?1 AND f.to_student_id = ?2");
            let existing = connection
                .query_row(
                    &sql,
                    params![from_student_id, to_student_id],
                    map_friend_request,
                )
                .optional()?;
            if let Some(request) = existing {
                return Ok((request, false));
            }

            connection.execute(
                "INSERT INTO friend_requests (from_student_id, to_student_id, is_accepted, timestamp) \
                 VALUES (?1, ?2, 0, ?3)",
                params![from_student_id, to_student_id, format_timestamp(Utc::now())],
            )?;
            let request_id = connection.last_insert_rowid();
            let request = load_friend_request(connection, request_id)?
                .ok_or_else(|| StoreError::NotFound(format!("friend request {request_id}")))?;
            Ok((request, true))
        })
        .await
    }

    async fn incoming_friend_requests(&self, student_id: i64) -> StoreResult<Vec<FriendRequest>> {
        self.with_connection(move |connection| {
            let sql = format!("{FRIEND_REQUEST_SELECT} WHERE f.to_student_id = ?1 ORDER BY f.id ASC");
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map(params![student_id], map_friend_request)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn friend_request(&self, request_id: i64) -> StoreResult<Option<FriendRequest>> {
        self.with_connection(move |connection| load_friend_request(connection, request_id))
            .await
    }

    async fn accept_friend_request(&self, request_id: i64) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let request = load_friend_request(connection, request_id)?
                .ok_or_else(|| StoreError::NotFound(format!("friend request {request_id}")))?;

            let transaction = connection.unchecked_transaction()?;
            transaction.execute(
                "INSERT OR IGNORE INTO friendships (student_id, friend_id) VALUES (?1, ?2), (?2, ?1)",
                params![request.from_student_id, request.to_student_id],
            )?;
            transaction.execute(
                "DELETE FROM friend_requests WHERE id = ?1",
                params![request_id],
            )?;
            transaction.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_friend_request(&self, request_id: i64) -> StoreResult<()> {
        self.with_connection(move |connection| {
            let changed = connection.execute(
                "DELETE FROM friend_requests WHERE id = ?1",
                params![request_id],
            )?;
            ensure_changed(changed, || format!("friend request {request_id}"))
        })
        .await
    }

    async fn friends(&self, student_id: i64) -> StoreResult<Vec<Student>> {
        self.with_connection(move |connection| {
            let sql = format!(
                "{STUDENT_SELECT} JOIN friendships f ON f.friend_id = s.id \
                 WHERE f.student_id = ?1 ORDER BY s.id ASC"
            );
            let mut statement = connection.prepare(&sql)?;
            let rows = statement.query_map(params![student_id], map_student)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

fn open_connection(path: &Path) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let connection = Connection::open(path)?;
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        PRAGMA synchronous = NORMAL;
        "#,
    )?;
    Ok(connection)
}

fn ensure_changed(changed: usize, what: impl FnOnce() -> String) -> StoreResult<()> {
    if changed == 0 {
        return Err(StoreError::NotFound(what()));
    }
    Ok(())
}

/// A concurrent writer can slip past an existence check; its UNIQUE
/// violation is still a conflict.
fn conflict_on_unique(error: rusqlite::Error, what: impl FnOnce() -> String) -> StoreError {
    match error {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            StoreError::Conflict(what())
        }
        other => StoreError::Sqlite(other),
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

fn parse_timestamp(index: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

fn load_user(connection: &Connection, user_id: UserId) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
    Ok(connection
        .query_row(&sql, params![user_id], map_user)
        .optional()?)
}

fn load_student_for_user(connection: &Connection, user_id: UserId) -> StoreResult<Option<Student>> {
    let sql = format!("{STUDENT_SELECT} WHERE s.user_id = ?1");
    Ok(connection
        .query_row(&sql, params![user_id], map_student)
        .optional()?)
}

fn load_post(connection: &Connection, post_id: i64) -> StoreResult<Option<Post>> {
    let sql = format!("{POST_SELECT} WHERE p.id = ?1");
    Ok(connection
        .query_row(&sql, params![post_id], map_post)
        .optional()?)
}

fn load_comment(connection: &Connection, comment_id: i64) -> StoreResult<Option<Comment>> {
    let sql = format!("{COMMENT_SELECT} WHERE c.id = ?1");
    Ok(connection
        .query_row(&sql, params![comment_id], map_comment)
        .optional()?)
}

fn load_study_group(connection: &Connection, group_id: i64) -> StoreResult<Option<StudyGroup>> {
    let sql = format!("{GROUP_SELECT} WHERE g.id = ?1");
    Ok(connection
        .query_row(&sql, params![group_id], map_study_group)
        .optional()?)
}

fn load_friend_request(
    connection: &Connection,
    request_id: i64,
) -> StoreResult<Option<FriendRequest>> {
    let sql = format!("{FRIEND_REQUEST_SELECT} WHERE f.id = ?1");
    Ok(connection
        .query_row(&sql, params![request_id], map_friend_request)
        .optional()?)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let last_login: Option<String> = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        date_joined: parse_timestamp(5, row.get(5)?)?,
        last_login: last_login.map(|raw| parse_timestamp(6, raw)).transpose()?,
        is_active: row.get(7)?,
        is_staff: row.get(8)?,
        is_superuser: row.get(9)?,
    })
}

fn map_student(row: &Row<'_>) -> rusqlite::Result<Student> {
    let grade: String = row.get(7)?;
    let grade = grade.parse::<Grade>().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(error))
    })?;
    Ok(Student {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        email: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        score: row.get(6)?,
        grade,
    })
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_username: row.get(2)?,
        caption: row.get(3)?,
        description: row.get(4)?,
        likes: row.get(5)?,
    })
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_username: row.get(2)?,
        post_id: row.get(3)?,
        body: row.get(4)?,
        likes: row.get(5)?,
    })
}

fn map_study_group(row: &Row<'_>) -> rusqlite::Result<StudyGroup> {
    Ok(StudyGroup {
        id: row.get(0)?,
        host_id: row.get(1)?,
        host_username: row.get(2)?,
        topic: row.get(3)?,
        location: row.get(4)?,
        created_at: parse_timestamp(5, row.get(5)?)?,
        scheduled_time: parse_timestamp(6, row.get(6)?)?,
        is_active: row.get(7)?,
    })
}

fn map_invite(row: &Row<'_>) -> rusqlite::Result<StudyGroupInvite> {
    Ok(StudyGroupInvite {
        id: row.get(0)?,
        group_id: row.get(1)?,
        group_topic: row.get(2)?,
        student_id: row.get(3)?,
        student_username: row.get(4)?,
        accepted: row.get(5)?,
        responded: row.get(6)?,
        notified: row.get(7)?,
    })
}

fn map_friend_request(row: &Row<'_>) -> rusqlite::Result<FriendRequest> {
    Ok(FriendRequest {
        id: row.get(0)?,
        from_student_id: row.get(1)?,
        from_username: row.get(2)?,
        from_email: row.get(3)?,
        to_student_id: row.get(4)?,
        is_accepted: row.get(5)?,
        timestamp: parse_timestamp(6, row.get(6)?)?,
    })
}
