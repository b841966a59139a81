use actix_web::{HttpResponse, Responder, get};

/// GET /health
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().body("OK")
}
