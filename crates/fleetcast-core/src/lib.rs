//! Fleetcast Core - Cluster dispatch and probe aggregation
//!
//! This crate provides:
//! - Layered configuration and the explicit dispatch settings
//! - Presence store contract, in-memory and file-backed stores
//! - HTTP transport to sibling nodes
//! - Dispatch core, probe aggregator and the dispatch queue

pub mod error;
pub mod model;
pub mod service;

// Re-export commonly used types
pub use error::{DispatchError, ProbeError, StoreError, TransportError};
pub use model::{Configuration, DispatchConfig};
pub use service::{
    DispatchEvent, DispatchOutcome, DispatchQueue, Dispatcher, FilePresenceStore, HttpTransport,
    MemoryPresenceStore, NodeTransport, PresenceClient, PresenceStore, ProbeAggregator,
};
