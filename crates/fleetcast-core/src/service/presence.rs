// Presence store contract and client
// Reads fleet membership and client-to-node bindings; never writes

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use fleetcast_api::model::NodeDescriptor;

use crate::{error::StoreError, model::DispatchConfig};

/// Raw KV/set contract of the external presence store
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Return every member of the named set
    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError>;

    /// Return the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Policy-free client over a [`PresenceStore`]
#[derive(Clone)]
pub struct PresenceClient {
    store: Arc<dyn PresenceStore>,
    servers_set: String,
    client_key_prefix: String,
}

impl std::fmt::Debug for PresenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceClient")
            .field("servers_set", &self.servers_set)
            .field("client_key_prefix", &self.client_key_prefix)
            .finish()
    }
}

impl PresenceClient {
    pub fn new(store: Arc<dyn PresenceStore>, config: &DispatchConfig) -> Self {
        Self {
            store,
            servers_set: config.servers_set.clone(),
            client_key_prefix: config.client_key_prefix.clone(),
        }
    }

    /// Current fleet membership, in the order the store returns it.
    ///
    /// Members that are not a JSON object with a string `address` are skipped.
    pub async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, StoreError> {
        let members = self.store.set_members(&self.servers_set).await?;

        let nodes: Vec<NodeDescriptor> = members
            .iter()
            .filter_map(|member| match parse_descriptor(member) {
                Some(node) => Some(node),
                None => {
                    warn!(set = %self.servers_set, member = %member, "Skipping malformed node descriptor");
                    None
                }
            })
            .collect();

        debug!(set = %self.servers_set, count = nodes.len(), "Listed fleet nodes");
        Ok(nodes)
    }

    /// Node currently holding `client_id`, or `None` if the client is unknown
    pub async fn resolve_client(
        &self,
        client_id: &str,
    ) -> Result<Option<NodeDescriptor>, StoreError> {
        let key = format!("{}{}", self.client_key_prefix, client_id);
        let address = self.store.get(&key).await?;

        Ok(address
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .map(NodeDescriptor::new))
    }
}

fn parse_descriptor(member: &str) -> Option<NodeDescriptor> {
    serde_json::from_str::<NodeDescriptor>(member)
        .ok()
        .filter(|node| !node.address.trim().is_empty())
}

/// In-memory presence store for static fleets and tests
#[derive(Debug)]
pub struct MemoryPresenceStore {
    sets: DashMap<String, Vec<String>>,
    values: DashMap<String, String>,
    available: AtomicBool,
}

impl Default for MemoryPresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self {
            sets: DashMap::new(),
            values: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Add `member` to `set`; adding an existing member is a no-op
    pub fn add_member(&self, set: &str, member: impl Into<String>) {
        let member = member.into();
        let mut entry = self.sets.entry(set.to_string()).or_default();
        if !entry.contains(&member) {
            entry.push(member);
        }
    }

    pub fn remove_member(&self, set: &str, member: &str) {
        if let Some(mut entry) = self.sets.get_mut(set) {
            entry.retain(|m| m != member);
        }
    }

    /// Register a node descriptor as a JSON member of `set`
    pub fn add_node(&self, set: &str, node: &NodeDescriptor) -> Result<(), serde_json::Error> {
        self.add_member(set, serde_json::to_string(node)?);
        Ok(())
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove_value(&self, key: &str) {
        self.values.remove(key);
    }

    /// Simulate the store becoming (un)reachable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn set_members(&self, set: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        Ok(self
            .sets
            .get(set)
            .map(|members| members.value().clone())
            .unwrap_or_default())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.values.get(key).map(|value| value.value().clone()))
    }
}
