use actix_web::web;
use crate::web::handlers;

fn chat_resource(path: &str) -> actix_web::Resource {
    web::resource(path)
        .app_data(web::JsonConfig::default().error_handler(handlers::json_error_handler))
        .route(web::post().to(handlers::chat))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api").service(chat_resource("/chat")))
        .service(chat_resource("/chat"))
        .route("/health", web::get().to(handlers::health_check));
}
