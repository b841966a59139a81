//! Probe API handler

use actix_web::{HttpResponse, Responder, get, web};
use tracing::warn;

use crate::model::{common::AppState, response};

/// GET /probe
///
/// Waits for every node to answer (or time out) and returns the merged
/// aggregate. Nodes that failed are absent from it.
#[get("/probe")]
pub async fn probe(data: web::Data<AppState>) -> impl Responder {
    match data.queue.probe().await {
        Ok(aggregate) => HttpResponse::Ok().json(aggregate),
        Err(e) => {
            warn!(error = %e, "Probe failed");
            response::dispatch_error(&e)
        }
    }
}
