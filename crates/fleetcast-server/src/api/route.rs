//! Gateway routing configuration

use actix_web::{
    HttpRequest, HttpResponse,
    error::{InternalError, JsonPayloadError},
    web,
};

use crate::model::response;

use super::{dispatch, health, probe};

/// Register the gateway routes
///
/// Routes:
/// - POST /sendMessage/{uid} - Unicast a payload to one client
/// - POST /disconnect/{uid} - Disconnect one client
/// - PUT /broadcast - Broadcast a payload to every node
/// - GET /probe - Fleet-wide connected client summary
/// - GET /health - Gateway liveness
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .service(dispatch::send_message)
        .service(dispatch::disconnect)
        .service(dispatch::broadcast)
        .service(probe::probe)
        .service(health::health);
}

/// Answer malformed JSON bodies with a rejected acknowledgement
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response: HttpResponse = response::invalid(format!("Validation error: {}", err));
    InternalError::from_response(err, response).into()
}
