// Dispatch queue
// Bounded channel between the gateway and the dispatcher; one task per event.
// Capacity bounds queued and in-flight events together.

use std::sync::Arc;

use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use fleetcast_api::model::{EventKind, ProbeAggregate};

use crate::error::{DispatchError, Result};

use super::dispatch::{DispatchEvent, DispatchOutcome, Dispatcher};

/// Sending half handed to the gateway. Cheap to clone.
#[derive(Clone, Debug)]
pub struct DispatchQueue {
    tx: mpsc::Sender<(DispatchEvent, OwnedSemaphorePermit)>,
    permits: Arc<Semaphore>,
}

impl DispatchQueue {
    /// Start the worker loop and return the queue feeding it.
    ///
    /// The worker stops once every `DispatchQueue` clone has been dropped.
    pub fn start(dispatcher: Arc<Dispatcher>, capacity: usize) -> (Self, JoinHandle<()>) {
        let capacity = capacity.max(1);
        let (tx, mut rx) = mpsc::channel::<(DispatchEvent, OwnedSemaphorePermit)>(capacity);
        let permits = Arc::new(Semaphore::new(capacity));

        let worker = tokio::spawn(async move {
            info!(capacity, "Dispatch queue started");

            while let Some((event, permit)) = rx.recv().await {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    // Released once the event is fully processed
                    let _permit = permit;
                    let kind = event.kind();
                    match dispatcher.dispatch(event).await {
                        Ok(outcome) => log_outcome(kind, &outcome),
                        Err(e) => warn!(%kind, error = %e, "Failed to dispatch event"),
                    }
                });
            }

            info!("Dispatch queue closed");
        });

        (Self { tx, permits }, worker)
    }

    /// Enqueue an event without waiting for it to be processed.
    ///
    /// Fails once `capacity` events are queued or still being processed.
    pub fn submit(&self, event: DispatchEvent) -> Result<()> {
        let permit = match self.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => return Err(queue_full(&event)),
            Err(TryAcquireError::Closed) => {
                return Err(DispatchError::QueueUnavailable("queue closed".to_string()));
            }
        };

        self.tx.try_send((event, permit)).map_err(|e| match e {
            mpsc::error::TrySendError::Full((event, _)) => queue_full(&event),
            mpsc::error::TrySendError::Closed(_) => {
                DispatchError::QueueUnavailable("queue closed".to_string())
            }
        })
    }

    /// Enqueue a probe and wait for its aggregate
    pub async fn probe(&self) -> Result<ProbeAggregate> {
        let (reply, rx) = oneshot::channel();
        self.submit(DispatchEvent::probe(Some(reply)))?;

        rx.await.map_err(|_| {
            DispatchError::QueueUnavailable("probe dropped before completion".to_string())
        })?
    }
}

fn queue_full(event: &DispatchEvent) -> DispatchError {
    DispatchError::QueueUnavailable(format!("queue full, dropping {} event", event.kind()))
}

fn log_outcome(kind: EventKind, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Forwarded { target, delivered } => {
            debug!(%kind, address = %target, delivered, "Event processed");
        }
        DispatchOutcome::UnknownClient { client_id } => {
            debug!(%kind, client_id = %client_id, "Event dropped for unknown client");
        }
        DispatchOutcome::Broadcast { nodes } => {
            debug!(%kind, nodes, "Broadcast issued");
        }
        DispatchOutcome::Probe(aggregate) => {
            debug!(%kind, servers = aggregate.total().servers, "Probe processed");
        }
        DispatchOutcome::ProbeAbandoned => {
            debug!(%kind, "Probe abandoned by its requester");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fleetcast_api::model::NodeDescriptor;
    use reqwest::Method;

    use super::*;
    use crate::{
        model::DispatchConfig,
        service::{
            dispatch::tests::RecordingTransport,
            presence::{MemoryPresenceStore, PresenceClient},
        },
    };

    fn queue_over(
        store: Arc<MemoryPresenceStore>,
        transport: Arc<RecordingTransport>,
        capacity: usize,
    ) -> (DispatchQueue, JoinHandle<()>) {
        let config = DispatchConfig::default();
        let dispatcher = Dispatcher::new(PresenceClient::new(store, &config), transport, config);
        DispatchQueue::start(Arc::new(dispatcher), capacity)
    }

    fn store() -> Arc<MemoryPresenceStore> {
        let store = Arc::new(MemoryPresenceStore::new());
        store
            .add_node("SERVERS", &NodeDescriptor::new("http://h1:3000"))
            .unwrap();
        store.set_value("abc", "http://h1:3000");
        store
    }

    async fn wait_for_calls(transport: &RecordingTransport, count: usize) {
        for _ in 0..100 {
            if transport.calls().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} calls, saw {:?}", count, transport.calls());
    }

    #[tokio::test]
    async fn test_submitted_unicast_is_forwarded() {
        let transport = Arc::new(RecordingTransport::new());
        let (queue, _worker) = queue_over(store(), transport.clone(), 8);

        queue.submit(DispatchEvent::unicast("abc", "hi")).unwrap();
        wait_for_calls(&transport, 1).await;

        let calls = transport.calls();
        assert_eq!(calls[0].address, "http://h1:3000/sendMessage/abc");
        assert_eq!(calls[0].method, Method::POST);
    }

    #[tokio::test]
    async fn test_probe_round_trip() {
        let transport = Arc::new(RecordingTransport::new());
        let (queue, _worker) = queue_over(store(), transport, 8);

        let aggregate = queue.probe().await.unwrap();
        assert_eq!(aggregate.total().servers, 1);
        assert_eq!(aggregate.total().connected_clients, 1);
    }

    #[tokio::test]
    async fn test_probe_surfaces_store_unavailable() {
        let store = store();
        store.set_available(false);
        let (queue, _worker) = queue_over(store, Arc::new(RecordingTransport::new()), 8);

        assert!(matches!(
            queue.probe().await,
            Err(DispatchError::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_stopped_worker_rejects_events() {
        let (queue, worker) = queue_over(store(), Arc::new(RecordingTransport::new()), 8);
        worker.abort();
        let _ = worker.await;

        assert!(matches!(
            queue.submit(DispatchEvent::unicast("abc", "hi")),
            Err(DispatchError::QueueUnavailable(_))
        ));
        assert!(matches!(
            queue.probe().await,
            Err(DispatchError::QueueUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_bounds_events_in_flight() {
        let transport =
            Arc::new(RecordingTransport::new().hanging("http://h1:3000/sendMessage/abc"));
        let (queue, _worker) = queue_over(store(), transport.clone(), 2);

        queue.submit(DispatchEvent::unicast("abc", "one")).unwrap();
        queue.submit(DispatchEvent::unicast("abc", "two")).unwrap();
        wait_for_calls(&transport, 2).await;

        // Both events are stuck on the node, so the queue is at capacity
        let err = queue
            .submit(DispatchEvent::unicast("abc", "three"))
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::QueueUnavailable("queue full, dropping UNICAST event".to_string())
        );

        // The stuck sends time out and release their slots
        tokio::time::sleep(DispatchConfig::default().request_timeout + Duration::from_secs(1))
            .await;
        queue.submit(DispatchEvent::broadcast("four", None)).unwrap();
    }

    #[tokio::test]
    async fn test_worker_stops_when_queue_dropped() {
        let (queue, worker) = queue_over(store(), Arc::new(RecordingTransport::new()), 8);
        drop(queue);
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
