use actix_web::{get, route, web, HttpResponse};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::dto::FriendRequestResponse;
use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_incoming)
        .service(accept_request)
        .service(reject_request);
}

/// GET /dof3a-api/friend-requests/ - Pending requests addressed to the caller
#[get("/friend-requests/")]
pub async fn list_incoming(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let student = user.student(&state).await?;
    let requests = state.store.incoming_friend_requests(student.id).await?;
    let body: Vec<FriendRequestResponse> = requests
        .into_iter()
        .map(FriendRequestResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(body))
}

/// GET|POST /dof3a-api/friend-requests/{id}/accept/
#[route("/friend-requests/{id}/accept/", method = "GET", method = "POST")]
pub async fn accept_request(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let student = user.student(&state).await?;
    let request = state
        .store
        .friend_request(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Friend request not found.".to_string()))?;

    if request.to_student_id != student.id {
        return Err(AppError::Forbidden("Unauthorized action.".to_string()));
    }

    state.store.accept_friend_request(request.id).await?;
    log::info!(
        "Student {} accepted friend request from {}",
        student.id,
        request.from_student_id
    );
    Ok(HttpResponse::Ok().json(json!({ "success": "Friend request accepted." })))
}

/// GET|POST /dof3a-api/friend-requests/{id}/reject/
#[route("/friend-requests/{id}/reject/", method = "GET", method = "POST")]
pub async fn reject_request(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let student = user.student(&state).await?;
    let request = state
        .store
        .friend_request(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Friend request not found".to_string()))?;

    if request.to_student_id != student.id {
        return Err(AppError::Forbidden("Unauthorized action.".to_string()));
    }

    state.store.delete_friend_request(request.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": "Friend request rejected." })))
}
