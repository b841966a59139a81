//! Shared state handed to every gateway handler

use fleetcast_core::{DispatchConfig, DispatchQueue};

/// Application state shared by all routes
#[derive(Clone, Debug)]
pub struct AppState {
    pub queue: DispatchQueue,
    /// Field name carrying the client identifier inside broadcast payloads
    pub identifier_key: String,
}

impl AppState {
    pub fn new(queue: DispatchQueue, config: &DispatchConfig) -> Self {
        Self {
            queue,
            identifier_key: config.identifier_key.clone(),
        }
    }
}
