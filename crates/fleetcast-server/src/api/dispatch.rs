//! Unicast, disconnect and broadcast API handlers
//!
//! Each handler validates its request, enqueues the event and acknowledges
//! immediately; forwarding happens in the background.

use actix_web::{Responder, post, put, web};
use serde_json::Value;
use tracing::debug;

use fleetcast_api::model::{DisconnectBody, PayloadBody};
use fleetcast_core::DispatchEvent;

use crate::model::{common::AppState, response};

/// POST /sendMessage/{uid}
#[post("/sendMessage/{uid}")]
pub async fn send_message(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<PayloadBody>,
) -> impl Responder {
    let client_id = path.into_inner();
    let PayloadBody { payload } = body.into_inner();

    if let Err(message) = require(&data.identifier_key, &client_id)
        .and_then(|_| require("payload", &payload))
    {
        return response::invalid(message);
    }

    enqueue(&data, DispatchEvent::unicast(client_id, payload))
}

/// POST /disconnect/{uid}
#[post("/disconnect/{uid}")]
pub async fn disconnect(
    data: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<DisconnectBody>,
) -> impl Responder {
    let client_id = path.into_inner();
    let DisconnectBody { reason } = body.into_inner();

    if let Err(message) = require(&data.identifier_key, &client_id)
        .and_then(|_| require("reason", &reason))
    {
        return response::invalid(message);
    }

    enqueue(&data, DispatchEvent::disconnect(client_id, reason))
}

/// PUT /broadcast
#[put("/broadcast")]
pub async fn broadcast(data: web::Data<AppState>, body: web::Json<PayloadBody>) -> impl Responder {
    let PayloadBody { payload } = body.into_inner();

    if let Err(message) = require("payload", &payload) {
        return response::invalid(message);
    }

    let origin = origin_of(&payload, &data.identifier_key);
    enqueue(&data, DispatchEvent::broadcast(payload, origin))
}

fn enqueue(data: &AppState, event: DispatchEvent) -> actix_web::HttpResponse {
    let kind = event.kind();
    match data.queue.submit(event) {
        Ok(()) => {
            debug!(%kind, "Event accepted");
            response::accepted()
        }
        Err(e) => response::dispatch_error(&e),
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("Validation error: \"{}\" is not allowed to be empty", field))
    } else {
        Ok(())
    }
}

/// Identifier of the client a broadcast payload came from, when the payload is
/// a JSON object carrying it
fn origin_of(payload: &str, identifier_key: &str) -> Option<String> {
    let value: Value = serde_json::from_str(payload).ok()?;
    match value.get(identifier_key)? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of_payload() {
        assert_eq!(
            origin_of(r#"{"uid":"abc","text":"hi"}"#, "uid"),
            Some("abc".to_string())
        );
        assert_eq!(origin_of(r#"{"sub":42}"#, "sub"), Some("42".to_string()));
        assert_eq!(origin_of(r#"{"text":"hi"}"#, "uid"), None);
        assert_eq!(origin_of("plain text", "uid"), None);
        assert_eq!(origin_of(r#"["abc"]"#, "uid"), None);
    }

    #[test]
    fn test_require() {
        assert!(require("payload", "hi").is_ok());
        assert_eq!(
            require("payload", "  ").unwrap_err(),
            "Validation error: \"payload\" is not allowed to be empty"
        );
    }
}
