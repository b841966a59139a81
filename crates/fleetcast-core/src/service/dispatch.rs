// Dispatch core
// Applies the per-event routing policy: resolve targets, forward, fan out, probe

use std::sync::Arc;

use reqwest::Method;
use serde_json::json;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, error, info, warn};
use url::Url;

use fleetcast_api::model::{EventKind, NodeDescriptor, ProbeAggregate};

use crate::{error::Result, model::DispatchConfig};

use super::{
    presence::PresenceClient,
    probe::ProbeAggregator,
    transport::{NodeTransport, bounded_send},
};

pub type ProbeReply = oneshot::Sender<Result<ProbeAggregate>>;

/// A validated event handed over by the gateway, consumed exactly once
#[derive(Debug)]
pub enum DispatchEvent {
    Unicast {
        client_id: String,
        payload: String,
    },
    Disconnect {
        client_id: String,
        reason: String,
    },
    Broadcast {
        payload: String,
        /// Identifier of the client that triggered the broadcast, if known
        origin: Option<String>,
    },
    Probe {
        reply: Option<ProbeReply>,
    },
}

impl DispatchEvent {
    pub fn unicast(client_id: impl Into<String>, payload: impl Into<String>) -> Self {
        DispatchEvent::Unicast {
            client_id: client_id.into(),
            payload: payload.into(),
        }
    }

    pub fn disconnect(client_id: impl Into<String>, reason: impl Into<String>) -> Self {
        DispatchEvent::Disconnect {
            client_id: client_id.into(),
            reason: reason.into(),
        }
    }

    pub fn broadcast(payload: impl Into<String>, origin: Option<String>) -> Self {
        DispatchEvent::Broadcast {
            payload: payload.into(),
            origin,
        }
    }

    pub fn probe(reply: Option<ProbeReply>) -> Self {
        DispatchEvent::Probe { reply }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            DispatchEvent::Unicast { .. } => EventKind::Unicast,
            DispatchEvent::Disconnect { .. } => EventKind::Disconnect,
            DispatchEvent::Broadcast { .. } => EventKind::Broadcast,
            DispatchEvent::Probe { .. } => EventKind::Probe,
        }
    }

    pub fn client_id(&self) -> Option<&str> {
        match self {
            DispatchEvent::Unicast { client_id, .. }
            | DispatchEvent::Disconnect { client_id, .. } => Some(client_id),
            DispatchEvent::Broadcast { origin, .. } => origin.as_deref(),
            DispatchEvent::Probe { .. } => None,
        }
    }
}

/// What happened to a dispatched event
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// Sent to the owning node; `delivered` is informational only
    Forwarded { target: String, delivered: bool },
    /// No node holds the client, nothing was sent
    UnknownClient { client_id: String },
    /// Fan-out issued to this many nodes
    Broadcast { nodes: usize },
    Probe(ProbeAggregate),
    /// The probe requester went away; outstanding node queries were dropped
    ProbeAbandoned,
}

/// Routes events to the fleet. Holds no per-event state.
#[derive(Clone)]
pub struct Dispatcher {
    presence: PresenceClient,
    transport: Arc<dyn NodeTransport>,
    aggregator: ProbeAggregator,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        presence: PresenceClient,
        transport: Arc<dyn NodeTransport>,
        config: DispatchConfig,
    ) -> Self {
        let aggregator = ProbeAggregator::new(presence.clone(), transport.clone(), &config);
        Self {
            presence,
            transport,
            aggregator,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub async fn dispatch(&self, event: DispatchEvent) -> Result<DispatchOutcome> {
        let kind = event.kind();
        debug!(%kind, client_id = event.client_id(), "Dispatching event");

        match event {
            DispatchEvent::Unicast { client_id, payload } => {
                self.forward(
                    kind,
                    &client_id,
                    &self.config.message_path,
                    json!({ "payload": payload }),
                )
                .await
            }
            DispatchEvent::Disconnect { client_id, reason } => {
                self.forward(
                    kind,
                    &client_id,
                    &self.config.disconnect_path,
                    json!({ "reason": reason }),
                )
                .await
            }
            DispatchEvent::Broadcast { payload, origin } => {
                // Detached: the caller already has its acknowledgement
                let handles = self.fan_out(&payload, origin.as_deref()).await?;
                Ok(DispatchOutcome::Broadcast {
                    nodes: handles.len(),
                })
            }
            DispatchEvent::Probe { reply: None } => {
                self.aggregator.probe().await.map(DispatchOutcome::Probe)
            }
            DispatchEvent::Probe {
                reply: Some(mut reply),
            } => {
                let result = tokio::select! {
                    biased;
                    _ = reply.closed() => {
                        debug!("Probe requester went away before the aggregate was ready");
                        return Ok(DispatchOutcome::ProbeAbandoned);
                    }
                    result = self.aggregator.probe() => result,
                };
                if reply.send(result.clone()).is_err() {
                    debug!("Probe requester went away before the aggregate was delivered");
                }
                result.map(DispatchOutcome::Probe)
            }
        }
    }

    /// Probe the fleet directly, bypassing any reply channel
    pub async fn probe(&self) -> Result<ProbeAggregate> {
        self.aggregator.probe().await
    }

    /// Send the broadcast payload to every node, one task per node.
    ///
    /// Returns the handles of the issued sends; dropping them leaves the sends
    /// running in the background.
    pub async fn fan_out(
        &self,
        payload: &str,
        origin: Option<&str>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let nodes = self.presence.list_nodes().await?;
        info!(
            nodes = nodes.len(),
            origin,
            "Broadcasting to fleet"
        );

        let body = json!({ "payload": payload });
        let handles = nodes
            .into_iter()
            .map(|node| {
                let transport = self.transport.clone();
                let timeout = self.config.request_timeout;
                let target = node.endpoint(&self.config.broadcast_path);
                let body = body.clone();
                let origin = origin.map(str::to_string);

                tokio::spawn(async move {
                    match bounded_send(transport.as_ref(), timeout, &target, Method::PUT, &body)
                        .await
                    {
                        Ok(response) if response.is_success() => {
                            debug!(address = %target, "Broadcast delivered");
                        }
                        Ok(response) => {
                            warn!(
                                address = %target,
                                kind = %EventKind::Broadcast,
                                client_id = origin.as_deref(),
                                status = response.status,
                                "Node rejected broadcast"
                            );
                        }
                        Err(e) => {
                            error!(
                                address = %target,
                                kind = %EventKind::Broadcast,
                                client_id = origin.as_deref(),
                                error = %e,
                                "Error forwarding broadcast"
                            );
                        }
                    }
                })
            })
            .collect();

        Ok(handles)
    }

    async fn forward(
        &self,
        kind: EventKind,
        client_id: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<DispatchOutcome> {
        let Some(node) = self.presence.resolve_client(client_id).await? else {
            error!(
                %kind,
                "The node address for the {} {} could not be found",
                self.config.identifier_key,
                client_id
            );
            return Ok(DispatchOutcome::UnknownClient {
                client_id: client_id.to_string(),
            });
        };

        let target = client_endpoint(&node, path, client_id);
        let delivered = match bounded_send(
            self.transport.as_ref(),
            self.config.request_timeout,
            &target,
            Method::POST,
            &body,
        )
        .await
        {
            Ok(response) if response.is_success() => {
                debug!(address = %target, %kind, client_id, "Event forwarded");
                true
            }
            Ok(response) => {
                warn!(
                    address = %target,
                    %kind,
                    client_id,
                    status = response.status,
                    "Node rejected event"
                );
                false
            }
            Err(e) => {
                error!(address = %target, %kind, client_id, error = %e, "Error forwarding event");
                false
            }
        };

        Ok(DispatchOutcome::Forwarded { target, delivered })
    }
}

/// Append `client_id` as a single percent-encoded path segment
fn client_endpoint(node: &NodeDescriptor, path: &str, client_id: &str) -> String {
    let base = node.endpoint(path);
    let Ok(mut url) = Url::parse(&base) else {
        // Rejected by the transport as an invalid address
        return base;
    };

    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(client_id);
    }
    url.into()
}
