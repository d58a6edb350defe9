//! Route handlers, one module per resource. Each module exposes a
//! `config` function that registers its services.

pub mod ai;
pub mod comments;
pub mod friend_requests;
pub mod posts;
pub mod students;
pub mod study_groups;
