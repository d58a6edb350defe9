use actix_web::{get, put, web, HttpResponse};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::dto::{StudentResponse, UpdateProfileRequest};
use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    // my_profile must be registered ahead of the `{id}` routes.
    cfg.service(list_students)
        .service(my_profile)
        .service(update_my_profile)
        .service(get_student)
        .service(send_friend_request);
}

/// GET /dof3a-api/students/
#[get("/students/")]
pub async fn list_students(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let students = state.store.list_students().await?;
    let body: Vec<StudentResponse> = students.into_iter().map(StudentResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// GET /dof3a-api/students/my_profile/
#[get("/students/my_profile/")]
pub async fn my_profile(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    match state.store.student_for_user(user.id()).await? {
        Some(student) => Ok(HttpResponse::Ok().json(StudentResponse::from(student))),
        None => Ok(HttpResponse::BadRequest()
            .json(json!({ "detail": "No user found with this ID." }))),
    }
}

/// PUT /dof3a-api/students/my_profile/ - Only the grade is writable
#[put("/students/my_profile/")]
pub async fn update_my_profile(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse> {
    let grade = body.grade()?;
    let student = state.store.update_student_grade(user.id(), grade).await?;
    log::info!("User {} set grade to {}", user.id(), grade);
    Ok(HttpResponse::Ok().json(StudentResponse::from(student)))
}

/// GET /dof3a-api/students/{id}/
#[get("/students/{id}/")]
pub async fn get_student(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let student = state
        .store
        .student(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Not found.".to_string()))?;
    Ok(HttpResponse::Ok().json(StudentResponse::from(student)))
}

/// GET /dof3a-api/students/{id}/send_friend_request/
#[get("/students/{id}/send_friend_request/")]
pub async fn send_friend_request(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<HttpResponse> {
    let sender = user.student(&state).await?;
    let target = state
        .store
        .student(path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Target student not found".to_string()))?;

    if target.id == sender.id {
        return Err(AppError::BadRequest(
            "You cannot send a friend request to yourself.".to_string(),
        ));
    }

    let (_, created) = state
        .store
        .send_friend_request(sender.id, target.id)
        .await?;
    if created {
        log::info!("Student {} sent a friend request to {}", sender.id, target.id);
        Ok(HttpResponse::Ok().json(json!({ "success": "Friend request sent." })))
    } else {
        Ok(HttpResponse::Ok().json(json!({ "info": "Friend request already sent." })))
    }
}
