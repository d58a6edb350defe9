pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod server;
pub mod state;

pub use server::{app_config, run};
pub use state::AppState;
