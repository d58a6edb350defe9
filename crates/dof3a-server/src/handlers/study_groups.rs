use actix_web::{get, post, web, HttpResponse};
use dof3a_core::{NewStudyGroup, StudyGroupFilter};

use crate::auth::AuthenticatedUser;
use crate::dto::StudyGroupResponse;
use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(list_groups).service(create_group);
}

/// GET /dof3a-api/study-groups/
#[get("/study-groups/")]
pub async fn list_groups(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
) -> Result<HttpResponse> {
    let groups = state.store.study_groups(StudyGroupFilter::default()).await?;
    let body: Vec<StudyGroupResponse> = groups.into_iter().map(StudyGroupResponse::from).collect();
    Ok(HttpResponse::Ok().json(body))
}

/// POST /dof3a-api/study-groups/ - The caller becomes the host
#[post("/study-groups/")]
pub async fn create_group(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<NewStudyGroup>,
) -> Result<HttpResponse> {
    if body.topic.trim().is_empty() {
        return Err(AppError::field("topic", "This field may not be blank."));
    }

    let group = state
        .store
        .create_study_group(user.id(), body.into_inner())
        .await?;
    log::info!("User {} is hosting study group {}", user.id(), group.id);
    Ok(HttpResponse::Created().json(StudyGroupResponse::from(group)))
}
