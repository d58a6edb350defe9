use actix_web::{delete, get, post, put, web, HttpResponse};
use dof3a_core::{NewPost, Post};

use crate::auth::AuthenticatedUser;
use crate::dto::PostResponse;
use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_posts)
        .service(create_post)
        .service(get_post)
        .service(update_post)
        .service(delete_post);
}

fn validate(post: &NewPost) -> Result<()> {
    if post.caption.trim().is_empty() {
        return Err(AppError::field("caption", "This field may not be blank."));
    }
    Ok(())
}

async fn load_post(state: &AppState, post_id: i64) -> Result<Post> {
    state
        .store
        .post(post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Not found.".to_string()))
}

async fn with_comments(state: &AppState, post: Post) -> Result<PostResponse> {
    let comments = state.store.comments_for_post(post.id).await?;
    Ok(PostResponse::new(post, comments))
}

/// GET /dof3a-api/posts/
#[get("/posts/")]
pub async fn list_posts(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let posts = state.store.list_posts().await?;
    let mut body = Vec::with_capacity(posts.len());
    for post in posts {
        body.push(with_comments(&state, post).await?);
    }
    Ok(HttpResponse::Ok().json(body))
}

/// POST /dof3a-api/posts/
#[post("/posts/")]
pub async fn create_post(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<NewPost>,
) -> Result<HttpResponse> {
    validate(&body)?;
    let post = state.store.create_post(user.id(), body.into_inner()).await?;
    log::info!("User {} created post {}", user.id(), post.id);
    Ok(HttpResponse::Created().json(PostResponse::new(post, Vec::new())))
}

/// GET /dof3a-api/posts/{id}/
#[get("/posts/{id}/")]
pub async fn get_post(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let post = load_post(&state, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(with_comments(&state, post).await?))
}

/// PUT /dof3a-api/posts/{id}/ - Author only
#[put("/posts/{id}/")]
pub async fn update_post(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
    body: web::Json<NewPost>,
) -> Result<HttpResponse> {
    let post = load_post(&state, path.into_inner()).await?;
    if post.author_id != user.id() {
        return Err(AppError::permission_denied());
    }
    validate(&body)?;

    let post = state.store.update_post(post.id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(with_comments(&state, post).await?))
}

/// DELETE /dof3a-api/posts/{id}/ - Author only
#[delete("/posts/{id}/")]
pub async fn delete_post(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let post = load_post(&state, path.into_inner()).await?;
    if post.author_id != user.id() {
        return Err(AppError::permission_denied());
    }

    state.store.delete_post(post.id).await?;
    log::info!("User {} deleted post {}", user.id(), post.id);
    Ok(HttpResponse::NoContent().finish())
}
