// Core data models shared between the dispatch layer, the gateway and sibling nodes

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the presence store set holding one JSON node descriptor per member
pub const DEFAULT_SERVERS_SET: &str = "SERVERS";

/// Field name used to carry the client identifier end-to-end
pub const DEFAULT_IDENTIFIER_KEY: &str = "uid";

pub const DEFAULT_MESSAGE_PATH: &str = "/sendMessage";
pub const DEFAULT_DISCONNECT_PATH: &str = "/disconnect";
pub const DEFAULT_BROADCAST_PATH: &str = "/broadcast";
pub const DEFAULT_PROBE_PATH: &str = "/probe";

/// Per-call network timeout used when none is configured
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15000;

/// Kind of a dispatch event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// Message addressed to exactly one client
    Unicast,
    /// Message addressed to every node of the fleet
    Broadcast,
    /// Disconnect request for exactly one client
    Disconnect,
    /// Fleet-wide health probe
    Probe,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Unicast => write!(f, "UNICAST"),
            EventKind::Broadcast => write!(f, "BROADCAST"),
            EventKind::Disconnect => write!(f, "DISCONNECT"),
            EventKind::Probe => write!(f, "PROBE"),
        }
    }
}

/// A fleet node as registered in the presence store.
///
/// Identity is the address string. Any other field the node registered
/// itself with is kept in `extra` and passed through untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub address: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeDescriptor {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            extra: Map::new(),
        }
    }

    /// Join a path suffix onto the node's base address
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.address.strip_suffix('/').unwrap_or(&self.address);
        format!("{}{}", base, path)
    }
}

/// Body of `POST <base>/sendMessage/<id>` and `PUT <base>/broadcast`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayloadBody {
    pub payload: String,
}

/// Body of `POST <base>/disconnect/<id>`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisconnectBody {
    pub reason: String,
}

/// The part of a node's `/probe` response the aggregator relies on.
///
/// Unknown fields are ignored; `connectedClients` is required and must be a
/// non-negative integer.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub connected_clients: u64,
}

/// Result of probing a single node
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeSample {
    pub node_address: String,
    pub connected_clients: u64,
    /// Full response body as returned by the node
    pub raw: Value,
}

/// Fleet-wide totals over the nodes that answered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeTotal {
    pub servers: usize,
    pub connected_clients: u64,
}

/// Merged probe result.
///
/// Only nodes that answered successfully appear in `servers`, and `total`
/// always agrees with `servers`. Build one through [`ProbeAggregateBuilder`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProbeAggregate {
    servers: Vec<ProbeSample>,
    total: ProbeTotal,
}

impl ProbeAggregate {
    pub fn builder() -> ProbeAggregateBuilder {
        ProbeAggregateBuilder::default()
    }

    pub fn servers(&self) -> &[ProbeSample] {
        &self.servers
    }

    pub fn total(&self) -> ProbeTotal {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Accumulates samples while keeping the aggregate totals consistent
#[derive(Debug, Default)]
pub struct ProbeAggregateBuilder {
    servers: Vec<ProbeSample>,
    connected_clients: u64,
}

impl ProbeAggregateBuilder {
    pub fn push(&mut self, sample: ProbeSample) -> &mut Self {
        self.connected_clients = self.connected_clients.saturating_add(sample.connected_clients);
        self.servers.push(sample);
        self
    }

    pub fn build(self) -> ProbeAggregate {
        ProbeAggregate {
            total: ProbeTotal {
                servers: self.servers.len(),
                connected_clients: self.connected_clients,
            },
            servers: self.servers,
        }
    }
}

impl FromIterator<ProbeSample> for ProbeAggregate {
    fn from_iter<I: IntoIterator<Item = ProbeSample>>(iter: I) -> Self {
        let mut builder = ProbeAggregate::builder();
        for sample in iter {
            builder.push(sample);
        }
        builder.build()
    }
}

/// Acknowledgement returned by the gateway once an event is accepted or rejected
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub status: u16,
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Acknowledgement {
    pub fn accepted() -> Self {
        Self {
            status: 200,
            is_valid: true,
            message: None,
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            is_valid: false,
            message: Some(message.into()),
        }
    }
}
