//! HTTP responses built from gateway acknowledgements

use actix_web::{HttpResponse, HttpResponseBuilder, http::StatusCode};

use fleetcast_api::model::Acknowledgement;
use fleetcast_core::DispatchError;

/// `200 {status: 200, isValid: true}`
pub fn accepted() -> HttpResponse {
    HttpResponse::Ok().json(Acknowledgement::accepted())
}

/// `400 {status: 400, isValid: false, message}`
pub fn invalid(message: impl Into<String>) -> HttpResponse {
    rejected(StatusCode::BAD_REQUEST, message)
}

pub fn rejected(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponseBuilder::new(status).json(Acknowledgement::rejected(status.as_u16(), message))
}

/// Map a dispatch failure to the status the caller sees
pub fn dispatch_error(err: &DispatchError) -> HttpResponse {
    match err {
        DispatchError::StoreUnavailable(_) | DispatchError::QueueUnavailable(_) => {
            rejected(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    }
}
