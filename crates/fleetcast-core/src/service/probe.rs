// Fleet-wide probe aggregation
// Queries every node's probe endpoint concurrently and merges the answers

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use serde_json::Value;
use tracing::{info, warn};

use fleetcast_api::model::{NodeDescriptor, ProbeAggregate, ProbeReport, ProbeSample};

use crate::{error::ProbeError, model::DispatchConfig};

use super::{
    presence::PresenceClient,
    transport::{NodeTransport, bounded_fetch},
};

#[derive(Clone)]
pub struct ProbeAggregator {
    presence: PresenceClient,
    transport: Arc<dyn NodeTransport>,
    probe_path: String,
    timeout: Duration,
}

impl ProbeAggregator {
    pub fn new(
        presence: PresenceClient,
        transport: Arc<dyn NodeTransport>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            presence,
            transport,
            probe_path: config.probe_path.clone(),
            timeout: config.request_timeout,
        }
    }

    /// Probe the whole fleet.
    ///
    /// Fails only when membership cannot be read. Nodes that time out or answer
    /// with an unusable body are left out of the aggregate.
    pub async fn probe(&self) -> crate::error::Result<ProbeAggregate> {
        let nodes = self.presence.list_nodes().await?;

        let outcomes = join_all(nodes.iter().map(|node| self.probe_node(node))).await;

        let mut builder = ProbeAggregate::builder();
        let mut failed = 0usize;
        for (node, outcome) in nodes.iter().zip(outcomes) {
            match outcome {
                Ok(sample) => {
                    builder.push(sample);
                }
                Err(e) => {
                    failed += 1;
                    warn!(address = %node.address, error = %e, "Error probing node");
                }
            }
        }

        let aggregate = builder.build();
        info!(
            servers = aggregate.total().servers,
            connected_clients = aggregate.total().connected_clients,
            failed,
            "Probe completed"
        );

        Ok(aggregate)
    }

    async fn probe_node(&self, node: &NodeDescriptor) -> Result<ProbeSample, ProbeError> {
        let target = node.endpoint(&self.probe_path);
        let body = bounded_fetch(self.transport.as_ref(), self.timeout, &target).await?;

        let raw: Value = serde_json::from_str(&body)?;
        let report: ProbeReport = serde_json::from_value(raw.clone())?;

        Ok(ProbeSample {
            node_address: node.address.clone(),
            connected_clients: report.connected_clients,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::Method;
    use serde_json::json;

    use super::*;
    use crate::{
        error::{DispatchError, TransportError},
        service::{
            presence::MemoryPresenceStore,
            transport::TransportResponse,
        },
    };

    enum Reply {
        Body(String),
        Fail,
        Hang,
    }

    /// Transport answering `/probe` from a table keyed by target address
    struct ScriptedTransport {
        replies: HashMap<String, Reply>,
        fetched: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<(&str, Reply)>) -> Self {
            Self {
                replies: replies
                    .into_iter()
                    .map(|(address, reply)| (address.to_string(), reply))
                    .collect(),
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NodeTransport for ScriptedTransport {
        async fn send(
            &self,
            address: &str,
            _method: Method,
            _body: &Value,
        ) -> Result<TransportResponse, TransportError> {
            panic!("probe must not send to {address}");
        }

        async fn fetch(&self, address: &str) -> Result<String, TransportError> {
            self.fetched.lock().push(address.to_string());
            match self.replies.get(address) {
                Some(Reply::Body(body)) => Ok(body.clone()),
                Some(Reply::Hang) => futures::future::pending().await,
                Some(Reply::Fail) | None => Err(TransportError::ConnectionFailed {
                    address: address.to_string(),
                    message: "connection refused".to_string(),
                }),
            }
        }
    }

    fn fleet(addresses: &[&str]) -> Arc<MemoryPresenceStore> {
        let store = Arc::new(MemoryPresenceStore::new());
        for address in addresses {
            store
                .add_node("SERVERS", &NodeDescriptor::new(*address))
                .unwrap();
        }
        store
    }

    fn aggregator(
        store: Arc<MemoryPresenceStore>,
        transport: Arc<ScriptedTransport>,
    ) -> ProbeAggregator {
        let config = DispatchConfig::default();
        ProbeAggregator::new(PresenceClient::new(store, &config), transport, &config)
    }

    fn assert_invariant(aggregate: &ProbeAggregate) {
        let sum: u64 = aggregate.servers().iter().map(|s| s.connected_clients).sum();
        assert_eq!(aggregate.total().servers, aggregate.servers().len());
        assert_eq!(aggregate.total().connected_clients, sum);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_node_is_excluded() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            (
                "http://h1:3000/probe",
                Reply::Body(r#"{"connectedClients":7}"#.to_string()),
            ),
            ("http://h2:3000/probe", Reply::Hang),
        ]));
        let aggregator = aggregator(fleet(&["http://h1:3000", "http://h2:3000"]), transport);

        let aggregate = aggregator.probe().await.unwrap();

        assert_eq!(aggregate.servers().len(), 1);
        assert_eq!(aggregate.servers()[0].node_address, "http://h1:3000");
        assert_eq!(aggregate.servers()[0].raw, json!({ "connectedClients": 7 }));
        assert_eq!(aggregate.total().servers, 1);
        assert_eq!(aggregate.total().connected_clients, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nodes_are_queried_concurrently() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ("http://h1:3000/probe", Reply::Hang),
            ("http://h2:3000/probe", Reply::Hang),
            ("http://h3:3000/probe", Reply::Hang),
        ]));
        let aggregator = aggregator(
            fleet(&["http://h1:3000", "http://h2:3000", "http://h3:3000"]),
            transport.clone(),
        );
        let timeout = DispatchConfig::default().request_timeout;

        let started = tokio::time::Instant::now();
        let aggregate = aggregator.probe().await.unwrap();
        let elapsed = started.elapsed();

        assert!(aggregate.is_empty());
        assert_eq!(transport.fetched.lock().len(), 3);
        assert!(elapsed >= timeout);
        assert!(
            elapsed < timeout * 2,
            "took {:?}, slowest node bound is {:?}",
            elapsed,
            timeout
        );
    }

    #[tokio::test]
    async fn test_every_node_is_probed() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ("http://h1:3000/probe", Reply::Body(r#"{"connectedClients":1}"#.into())),
            ("http://h2:3000/probe", Reply::Body(r#"{"connectedClients":2}"#.into())),
            ("http://h3:3000/probe", Reply::Body(r#"{"connectedClients":3}"#.into())),
        ]));
        let aggregator = aggregator(
            fleet(&["http://h1:3000", "http://h2:3000", "http://h3:3000"]),
            transport.clone(),
        );

        let aggregate = aggregator.probe().await.unwrap();

        assert_eq!(transport.fetched.lock().len(), 3);
        assert_eq!(aggregate.total().servers, 3);
        assert_eq!(aggregate.total().connected_clients, 6);
        let order: Vec<&str> = aggregate
            .servers()
            .iter()
            .map(|s| s.node_address.as_str())
            .collect();
        assert_eq!(order, ["http://h1:3000", "http://h2:3000", "http://h3:3000"]);
    }

    #[tokio::test]
    async fn test_invariant_for_every_failure_mix() {
        let addresses = ["http://h1:3000", "http://h2:3000", "http://h3:3000"];

        for mask in 0u8..8 {
            let replies = addresses
                .iter()
                .enumerate()
                .map(|(i, address)| {
                    let target = format!("{}/probe", address);
                    let reply = if mask & (1 << i) != 0 {
                        Reply::Body(format!(r#"{{"connectedClients":{}}}"#, (i + 1) * 10))
                    } else {
                        Reply::Fail
                    };
                    (target, reply)
                })
                .collect::<Vec<_>>();
            let transport = Arc::new(ScriptedTransport {
                replies: replies.into_iter().collect(),
                fetched: Mutex::new(Vec::new()),
            });

            let aggregate = aggregator(fleet(&addresses), transport).probe().await.unwrap();

            assert_invariant(&aggregate);
            assert_eq!(aggregate.total().servers, mask.count_ones() as usize);
        }
    }

    #[tokio::test]
    async fn test_all_failed() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let aggregate = aggregator(fleet(&["http://h1:3000", "http://h2:3000"]), transport)
            .probe()
            .await
            .unwrap();

        assert!(aggregate.servers().is_empty());
        assert_eq!(aggregate.total().servers, 0);
        assert_eq!(aggregate.total().connected_clients, 0);
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_excluded() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            ("http://h1:3000/probe", Reply::Body("<html>oops</html>".into())),
            ("http://h2:3000/probe", Reply::Body(r#"{"clients":4}"#.into())),
            ("http://h3:3000/probe", Reply::Body(r#"{"connectedClients":-2}"#.into())),
            (
                "http://h4:3000/probe",
                Reply::Body(r#"{"connectedClients":4,"version":"1.2"}"#.into()),
            ),
        ]));
        let aggregate = aggregator(
            fleet(&[
                "http://h1:3000",
                "http://h2:3000",
                "http://h3:3000",
                "http://h4:3000",
            ]),
            transport,
        )
        .probe()
        .await
        .unwrap();

        assert_eq!(aggregate.total().servers, 1);
        assert_eq!(aggregate.servers()[0].node_address, "http://h4:3000");
        assert_eq!(aggregate.servers()[0].raw["version"], "1.2");
    }

    #[tokio::test]
    async fn test_store_unavailable_fails_whole_probe() {
        let store = fleet(&["http://h1:3000"]);
        store.set_available(false);
        let transport = Arc::new(ScriptedTransport::new(vec![]));

        let result = aggregator(store, transport.clone()).probe().await;

        assert!(matches!(result, Err(DispatchError::StoreUnavailable(_))));
        assert!(transport.fetched.lock().is_empty());
    }

    #[tokio::test]
    async fn test_empty_fleet() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let aggregate = aggregator(fleet(&[]), transport).probe().await.unwrap();
        assert!(aggregate.is_empty());
    }
}
