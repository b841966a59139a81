//! Error taxonomy for the dispatch layer
//!
//! A routing miss (unknown client) is not an error; it is reported as a
//! [`DispatchOutcome`](crate::service::dispatch::DispatchOutcome).

use std::time::Duration;

/// The presence store could not be reached or returned unusable data
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("presence store unavailable: {0}")]
    Unavailable(String),
}

/// Failure talking to a sibling node
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {address} failed: {message}")]
    ConnectionFailed { address: String, message: String },

    #[error("request to {address} timed out after {timeout_ms}ms")]
    Timeout { address: String, timeout_ms: u64 },

    #[error("unsupported scheme '{scheme}' in node address {address}")]
    BadScheme { address: String, scheme: String },

    #[error("invalid node address '{address}': {message}")]
    InvalidAddress { address: String, message: String },

    #[error("{address} answered with status {status}")]
    Status { address: String, status: u16 },
}

impl TransportError {
    pub fn timeout(address: &str, timeout: Duration) -> Self {
        TransportError::Timeout {
            address: address.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Classify a reqwest failure for the given node address
    pub fn from_reqwest(address: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(address, timeout)
        } else {
            TransportError::ConnectionFailed {
                address: address.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Why a single node yielded no probe sample
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("malformed probe body: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

/// Errors surfaced by the dispatch core to its caller
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    #[error("dispatch queue unavailable: {0}")]
    QueueUnavailable(String),
}

pub type Result<T> = std::result::Result<T, DispatchError>;
