use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse, Responder};
use log::{error, info, warn};
use uuid::Uuid;

use crate::relay::{self, RelayError};
use crate::web::models::{ChatRequest, ChatResponse, ErrorResponse, HealthResponse};
use crate::AppState;

// Health check endpoint
pub async fn health_check(data: web::Data<AppState>) -> impl Responder {
    let mode = if data.relay.is_online() { "online" } else { "offline" };
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        mode: mode.to_string(),
    })
}

// Chat API endpoint
pub async fn chat(data: web::Data<AppState>, req: web::Json<ChatRequest>) -> impl Responder {
    let request_id = Uuid::new_v4();
    let request: relay::ChatRequest = req.into_inner().into();

    info!(
        "[{}] Chat request: {} chars, {} history turns",
        request_id,
        request.message.len(),
        request.history.len()
    );

    match data.relay.handle(&request, request_id).await {
        Ok(reply) => {
            info!("[{}] Replied from {:?}", request_id, reply.source);
            HttpResponse::Ok().json(ChatResponse {
                response: reply.text,
            })
        }
        Err(e) => {
            match &e {
                RelayError::InvalidRequest => warn!("[{}] Rejected: {}", request_id, e),
                _ => error!("[{}] Chat failed: {} ({:?})", request_id, e, e.details()),
            }
            error_response(&e)
        }
    }
}

pub fn error_response(err: &RelayError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.to_string(),
        details: err.details().map(str::to_string),
    };
    match err {
        RelayError::InvalidRequest => HttpResponse::BadRequest().json(body),
        RelayError::ServiceUnavailable(_) => HttpResponse::ServiceUnavailable().json(body),
        RelayError::Internal(_) => HttpResponse::InternalServerError().json(body),
    }
}

/// Bodies that don't parse get the same 400 as a missing message.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!("Invalid chat payload: {}", err);
    let response = error_response(&RelayError::InvalidRequest);
    actix_web::error::InternalError::from_response(err, response).into()
}
