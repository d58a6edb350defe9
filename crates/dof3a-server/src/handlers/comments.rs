use actix_web::{delete, get, post, put, route, web, HttpResponse};
use dof3a_core::{Comment, LikeOutcome};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::dto::{CommentRequest, CommentResponse};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_comments)
        .service(create_comment)
        .service(get_comment)
        .service(update_comment)
        .service(delete_comment)
        .service(like_comment);
}

async fn ensure_post(state: &AppState, post_id: i64) -> Result<()> {
    match state.store.post(post_id).await? {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound("Post not found.".to_string())),
    }
}

async fn load_comment(state: &AppState, post_id: i64, comment_id: i64) -> Result<Comment> {
    state
        .store
        .comment(post_id, comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Not found.".to_string()))
}

fn validate(body: &CommentRequest) -> Result<()> {
    if body.body.trim().is_empty() {
        return Err(AppError::field("body", "This field may not be blank."));
    }
    Ok(())
}

/// GET /dof3a-api/posts/{post_pk}/comments/
#[get("/posts/{post_pk}/comments/")]
pub async fn list_comments(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    ensure_post(&state, post_id).await?;

    let comments = state.store.comments_for_post(post_id).await?;
    let body: Vec<CommentResponse> = comments.into_iter().map(CommentResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// POST /dof3a-api/posts/{post_pk}/comments/
#[post("/posts/{post_pk}/comments/")]
pub async fn create_comment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: web::Json<CommentRequest>,
) -> Result<HttpResponse> {
    let post_id = path.into_inner();
    validate(&body)?;
    ensure_post(&state, post_id).await?;

    let comment = state
        .store
        .create_comment(user.id(), post_id, body.body.trim())
        .await?;
    Ok(HttpResponse::Created().json(CommentResponse::from(comment)))
}

/// GET /dof3a-api/posts/{post_pk}/comments/{id}/
#[get("/posts/{post_pk}/comments/{id}/")]
pub async fn get_comment(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let comment = load_comment(&state, post_id, comment_id).await?;
    Ok(HttpResponse::Ok().json(CommentResponse::from(comment)))
}

/// PUT /dof3a-api/posts/{post_pk}/comments/{id}/ - Author only
#[put("/posts/{post_pk}/comments/{id}/")]
pub async fn update_comment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(i64, i64)>,
    body: web::Json<CommentRequest>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let comment = load_comment(&state, post_id, comment_id).await?;
    if comment.author_id != user.id() {
        return Err(AppError::permission_denied());
    }
    validate(&body)?;

    let comment = state
        .store
        .update_comment(comment.id, body.body.trim())
        .await?;
    Ok(HttpResponse::Ok().json(CommentResponse::from(comment)))
}

/// DELETE /dof3a-api/posts/{post_pk}/comments/{id}/ - Author only
#[delete("/posts/{post_pk}/comments/{id}/")]
pub async fn delete_comment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let comment = load_comment(&state, post_id, comment_id).await?;
    if comment.author_id != user.id() {
        return Err(AppError::permission_denied());
    }

    state.store.delete_comment(comment.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET|POST /dof3a-api/posts/{post_pk}/comments/{id}/like_comment/
#[route(
    "/posts/{post_pk}/comments/{id}/like_comment/",
    method = "GET",
    method = "POST"
)]
pub async fn like_comment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse> {
    let (post_id, comment_id) = path.into_inner();
    let Some(comment) = state.store.comment(post_id, comment_id).await? else {
        return Ok(HttpResponse::NotFound().json(json!({ "detail": "No comment found with this ID." })));
    };

    match state.store.like_comment(comment.id, user.id()).await? {
        LikeOutcome::Liked { likes } => Ok(HttpResponse::Ok().json(json!({ "likes": likes }))),
        LikeOutcome::AlreadyLiked => Ok(HttpResponse::BadRequest()
            .json(json!({ "detail": "You already liked this comment." }))),
    }
}
