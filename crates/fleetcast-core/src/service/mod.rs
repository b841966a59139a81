// Dispatch services: presence, transport, routing policy and probe aggregation

pub mod dispatch;
pub mod file_store;
pub mod presence;
pub mod probe;
pub mod queue;
pub mod transport;

// Re-export commonly used types
pub use dispatch::{DispatchEvent, DispatchOutcome, Dispatcher};
pub use file_store::FilePresenceStore;
pub use presence::{MemoryPresenceStore, PresenceClient, PresenceStore};
pub use probe::ProbeAggregator;
pub use queue::DispatchQueue;
pub use transport::{HttpTransport, NodeTransport, TransportResponse};
