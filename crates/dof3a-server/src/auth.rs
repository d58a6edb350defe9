//! Token authentication for API handlers.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use dof3a_core::{Student, User};
use futures_util::future::LocalBoxFuture;

use crate::error::AppError;
use crate::state::AppState;

/// The user owning the request's `Authorization: Bearer <token>` header.
/// `Token <token>` is accepted as well.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn id(&self) -> i64 {
        self.0.id
    }

    /// The student row every user gets at sign-up.
    pub async fn student(&self, state: &AppState) -> Result<Student, AppError> {
        state
            .store
            .student_for_user(self.0.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Student profile not found.".to_string()))
    }
}

fn token_from(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") && !scheme.eq_ignore_ascii_case("token") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = token_from(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let token = token.ok_or(AppError::MissingCredentials)?;
            let state =
                state.ok_or_else(|| AppError::Internal("application state missing".to_string()))?;

            match state.store.user_for_token(&token).await? {
                Some(user) => Ok(AuthenticatedUser(user)),
                None => {
                    log::debug!("Rejected unknown or inactive token");
                    Err(AppError::InvalidToken)
                }
            }
        })
    }
}
