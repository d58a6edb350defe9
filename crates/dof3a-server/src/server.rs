use actix_cors::Cors;
use actix_web::{error::JsonPayloadError, web, App, HttpRequest, HttpServer};

use crate::error::AppError;
use crate::handlers::{ai, comments, friend_requests, posts, students, study_groups};
use crate::middleware::RequestIdMiddleware;
use crate::state::AppState;

const DEFAULT_WORKER_COUNT: usize = 4;

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("Rejected request body: {}", err);
    AppError::BadRequest(err.to_string()).into()
}

pub fn app_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .configure(ai::config)
        .service(
            web::scope("/dof3a-api")
                .configure(students::config)
                .configure(posts::config)
                .configure(comments::config)
                .configure(friend_requests::config)
                .configure(study_groups::config),
        );
}

pub async fn run(state: web::Data<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(RequestIdMiddleware)
            .wrap(Cors::permissive())
            .configure(app_config)
    })
    .workers(DEFAULT_WORKER_COUNT)
    .bind((host, port))?
    .run();

    log::info!("dof3a API listening on http://{host}:{port}");

    if let Err(e) = server.await {
        log::error!("Web server error: {}", e);
        return Err(e);
    }
    Ok(())
}
