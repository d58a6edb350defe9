pub mod config;
pub mod models;
pub mod storage;

pub use config::Config;
pub use models::{
    Comment, FriendRequest, Grade, LikeOutcome, NewPost, NewStudyGroup, NewUser,
    ParseGradeError, Post, Student, StudyGroup, StudyGroupFilter, StudyGroupInvite, User, UserId,
};
pub use storage::{PlatformStore, SqlitePlatformStore, StoreError, StoreResult};
