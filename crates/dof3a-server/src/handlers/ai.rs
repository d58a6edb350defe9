use actix_web::{get, post, web, HttpResponse};
use dof3a_ai::QuestionRequest;

use crate::auth::AuthenticatedUser;
use crate::dto::{ChatRequest, ModerationRequest, QuestionGenerationRequest, RecommendationRequest};
use crate::error::{AppError, Result};
use crate::middleware::RequestId;
use crate::state::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/ai")
            .service(chat)
            .service(recommendations)
            .service(questions)
            .service(moderate)
            .service(usage)
            .service(test),
    );
}

/// POST /api/ai/chat/ - Personal tutor
#[post("/chat/")]
pub async fn chat(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    request_id: RequestId,
    body: web::Json<ChatRequest>,
) -> Result<HttpResponse> {
    body.validate()?;
    log::info!("Tutor request {} from user {}", request_id.as_str(), user.id());

    let envelope = state
        .ai
        .chat(
            user.id(),
            &body.user_input,
            body.conversation_context.as_deref(),
        )
        .await;
    Ok(HttpResponse::Ok().json(envelope))
}

/// POST /api/ai/recommendations/ - Study recommendations, body optional
#[post("/recommendations/")]
pub async fn recommendations(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: Option<web::Json<RecommendationRequest>>,
) -> Result<HttpResponse> {
    let request = body.map(web::Json::into_inner).unwrap_or_default();
    request.validate()?;

    let envelope = state
        .ai
        .recommend(user.id(), request.subject.as_deref())
        .await;
    Ok(HttpResponse::Ok().json(envelope))
}

/// POST /api/ai/questions/ - Knockout question generation
#[post("/questions/")]
pub async fn questions(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<QuestionGenerationRequest>,
) -> Result<HttpResponse> {
    if !state.questions_enabled {
        return Err(AppError::NotFound(
            "Question generation is disabled".to_string(),
        ));
    }
    body.validate()?;

    let body = body.into_inner();
    let request = QuestionRequest {
        subject: body.subject,
        grade_level: body.grade_level,
        difficulty: body.difficulty,
        num_questions: body.num_questions,
        user_id: Some(user.id()),
    };
    let envelope = state.ai.generate_questions(&request).await;
    Ok(HttpResponse::Ok().json(envelope))
}

/// POST /api/ai/moderate/ - Content moderation
#[post("/moderate/")]
pub async fn moderate(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<ModerationRequest>,
) -> Result<HttpResponse> {
    body.validate()?;

    let envelope = state
        .ai
        .moderate(user.id(), &body.content, &body.content_type)
        .await;
    Ok(HttpResponse::Ok().json(envelope))
}

/// GET /api/ai/usage/ - Today's AI usage for the caller
#[get("/usage/")]
pub async fn usage(state: web::Data<AppState>, user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(state.ai.usage(user.id()).await)
}

/// GET /api/ai/test/
#[get("/test/")]
pub async fn test(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.ai.status(state.questions_enabled))
}
