// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Watch dispatcher: serializes local endpoint joins and leaves.
//!
//! Every join/leave goes through one task, so the structure of the watch
//! table (which networks are watched, which endpoints are local) only ever
//! changes from here. Producers wait until their event has been applied.
//!
//! ```text
//! watch_svc_record ──► join_tx ──┐
//!                                ├──► dispatcher ──► watch table + svc records
//! unwatch_svc_record ► leave_tx ─┘         │
//!                                          └──► spawn reconciler (first join)
//! ```

use super::{reconcile, Inner, NetworkController};
use crate::datastore::{KvObject, SWARM_SCOPE};
use crate::error::{Result, StoreError};
use crate::metrics;
use crate::model::{Endpoint, Network};
use crate::svc_record::ServiceRecords;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Watch state for one network with at least one local endpoint.
pub(crate) struct NetWatch {
    pub(crate) local_eps: HashMap<String, Endpoint>,
    pub(crate) remote_eps: HashMap<String, Endpoint>,
    stop_tx: watch::Sender<bool>,
    /// Distinguishes this watch from a later one on the same network id.
    pub(crate) generation: u64,
}

impl NetWatch {
    pub(crate) fn local_list(&self) -> Vec<Endpoint> {
        self.local_eps.values().cloned().collect()
    }

    pub(crate) fn remote_list(&self) -> Vec<Endpoint> {
        self.remote_eps.values().cloned().collect()
    }

    /// Signal the network's reconciler to exit.
    pub(crate) fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

pub(crate) type WatchTable = HashMap<String, NetWatch>;

#[derive(Debug, Clone, Copy)]
enum EventKind {
    Join,
    Leave,
}

struct WatchEvent {
    network: Network,
    endpoint: Endpoint,
    done: oneshot::Sender<()>,
}

/// Handle to the running dispatcher task.
pub(crate) struct Dispatcher {
    join_tx: mpsc::Sender<WatchEvent>,
    leave_tx: mpsc::Sender<WatchEvent>,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) task: Mutex<Option<JoinHandle<()>>>,
}

impl<R: ServiceRecords> NetworkController<R> {
    /// Start the dispatcher. Later calls are no-ops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_watch(&self) {
        self.inner.dispatcher.get_or_init(|| {
            // Unbuffered in spirit: a producer waits for its own event anyway
            let (join_tx, join_rx) = mpsc::channel(1);
            let (leave_tx, leave_rx) = mpsc::channel(1);
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let task = tokio::spawn(watch_loop(
                Arc::downgrade(&self.inner),
                join_rx,
                leave_rx,
                shutdown_rx,
            ));
            info!("Started watch dispatcher");

            Dispatcher {
                join_tx,
                leave_tx,
                shutdown_tx,
                task: Mutex::new(Some(task)),
            }
        });
    }

    /// Record a local endpoint join, watching its network if it is the
    /// first local endpoint there.
    ///
    /// Returns once the dispatcher has applied the join.
    pub async fn watch_svc_record(&self, network: &Network, endpoint: &Endpoint) -> Result<()> {
        self.send_event(EventKind::Join, network, endpoint).await
    }

    /// Record a local endpoint leave, tearing the network's watch down if it
    /// was the last local endpoint there.
    ///
    /// Returns once the dispatcher has applied the leave.
    pub async fn unwatch_svc_record(&self, network: &Network, endpoint: &Endpoint) -> Result<()> {
        self.send_event(EventKind::Leave, network, endpoint).await
    }

    async fn send_event(&self, kind: EventKind, network: &Network, endpoint: &Endpoint) -> Result<()> {
        let dispatcher = self
            .inner
            .dispatcher
            .get()
            .ok_or(StoreError::DispatcherNotRunning)?;

        let (done, done_rx) = oneshot::channel();
        let event = WatchEvent {
            network: network.clone(),
            endpoint: endpoint.clone(),
            done,
        };
        let tx = match kind {
            EventKind::Join => &dispatcher.join_tx,
            EventKind::Leave => &dispatcher.leave_tx,
        };

        tx.send(event).await.map_err(|_| StoreError::Shutdown)?;
        done_rx.await.map_err(|_| StoreError::Shutdown)
    }

    /// Joins and leaves on multi-host swarm networks are owned by the
    /// cluster agent unless this node runs distributed control itself.
    fn skip_watch(&self, network: &Network) -> bool {
        !self.is_distributed_control()
            && network.scope() == SWARM_SCOPE
            && self.driver_is_multihost(network)
    }

    pub(crate) fn local_endpoint_list(&self, network_id: &str) -> Vec<Endpoint> {
        self.lock_watches()
            .get(network_id)
            .map(NetWatch::local_list)
            .unwrap_or_default()
    }

    async fn process_endpoint_create(&self, network: &Network, endpoint: Endpoint) {
        if self.skip_watch(network) {
            metrics::record_watch_event("join", "ignored");
            return;
        }
        metrics::record_watch_event("join", "applied");

        let network_ref = network.to_ref();
        let network_id = network.id().to_string();
        let endpoint_id = endpoint.id().to_string();

        let existing = self
            .lock_watches()
            .get(&network_id)
            .map(NetWatch::local_list);

        if let Some(locals) = existing {
            self.inner
                .svc_records
                .update_record(&network_ref, &endpoint, &locals, true);

            let mut table = self.lock_watches();
            if let Some(nw) = table.get_mut(&network_id) {
                // Local ownership wins over anything learned from the store
                nw.remote_eps.remove(&endpoint_id);
                nw.local_eps.insert(endpoint_id, endpoint);
            }
            return;
        }

        // Add the record before the endpoint becomes local, so the hook does
        // not see it as its own container context
        self.inner
            .svc_records
            .update_record(&network_ref, &endpoint, &[], true);

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let (stop_tx, stop_rx) = watch::channel(false);
        let watched = {
            let mut table = self.lock_watches();
            let mut local_eps = HashMap::new();
            local_eps.insert(endpoint_id, endpoint);
            table.insert(
                network_id.clone(),
                NetWatch {
                    local_eps,
                    remote_eps: HashMap::new(),
                    stop_tx,
                    generation,
                },
            );
            table.len()
        };
        metrics::set_watched_networks(watched);
        debug!(network_id = %network_id, generation, "Watching network");

        let Some(store) = self.store(network.data_scope()) else {
            debug!(network_id = %network_id, scope = %network.data_scope(), "No store for network scope, not watching");
            return;
        };
        if !store.watchable() {
            metrics::record_watch_start(store.scope(), "unsupported");
            return;
        }

        match store.watch(&network.endpoint_count_or_new(), stop_rx.clone()).await {
            Ok(notify_rx) => {
                metrics::record_watch_start(store.scope(), "started");
                tokio::spawn(reconcile::run_reconciler(
                    Arc::downgrade(&self.inner),
                    network.clone(),
                    generation,
                    stop_rx,
                    notify_rx,
                ));
            }
            Err(e) => {
                metrics::record_watch_start(store.scope(), "failed");
                warn!(network = %network.name(), network_id = %network_id, error = %e, "Error creating watch for network");
            }
        }
    }

    fn process_endpoint_delete(&self, network: &Network, endpoint: &Endpoint) {
        if self.skip_watch(network) {
            metrics::record_watch_event("leave", "ignored");
            return;
        }
        metrics::record_watch_event("leave", "applied");

        let locals = {
            let mut table = self.lock_watches();
            let Some(nw) = table.get_mut(network.id()) else {
                return;
            };
            nw.local_eps.remove(endpoint.id());
            nw.local_list()
        };

        // Remove after the endpoint stops being local, so the hook does not
        // see it as its own container context
        self.inner
            .svc_records
            .update_record(&network.to_ref(), endpoint, &locals, false);

        if locals.is_empty() {
            let watched = {
                let mut table = self.lock_watches();
                if let Some(nw) = table.remove(network.id()) {
                    nw.stop();
                }
                table.len()
            };
            self.inner.svc_records.clear_network(network.id());
            metrics::set_watched_networks(watched);
            debug!(network_id = %network.id(), "Stopped watching network");
        }
    }
}

async fn watch_loop<R: ServiceRecords>(
    inner: Weak<Inner<R>>,
    mut join_rx: mpsc::Receiver<WatchEvent>,
    mut leave_rx: mpsc::Receiver<WatchEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            Some(event) = join_rx.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                let ctrl = NetworkController::from_inner(inner);
                ctrl.process_endpoint_create(&event.network, event.endpoint).await;
                let _ = event.done.send(());
            }
            Some(event) = leave_rx.recv() => {
                let Some(inner) = inner.upgrade() else { break };
                let ctrl = NetworkController::from_inner(inner);
                ctrl.process_endpoint_delete(&event.network, &event.endpoint);
                let _ = event.done.send(());
            }
            _ = shutdown_rx.changed() => break,
        }
    }
    debug!("Watch dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::svc_record::ServiceRecordTable;

    async fn controller() -> NetworkController<ServiceRecordTable> {
        let ctrl = NetworkController::with_service_records(
            StoreConfig::for_testing(),
            Arc::new(ServiceRecordTable::new()),
        );
        ctrl.init_stores().await.unwrap();
        ctrl
    }

    #[tokio::test]
    async fn test_watch_before_start_fails() {
        let ctrl = NetworkController::new(StoreConfig::for_testing());
        let n = Network::new("n1", "a", "bridge", "local");
        let ep = Endpoint::new("e1", "web", &n);
        let err = ctrl.watch_svc_record(&n, &ep).await.unwrap_err();
        assert!(matches!(err, StoreError::DispatcherNotRunning));
    }

    #[tokio::test]
    async fn test_first_join_creates_watch() {
        let ctrl = controller().await;
        let n = Network::new("n1", "a", "bridge", "local");
        let ep = Endpoint::new("e1", "web", &n);

        ctrl.watch_svc_record(&n, &ep).await.unwrap();
        assert_eq!(ctrl.watched_networks(), vec!["n1"]);
        assert_eq!(ctrl.local_endpoints("n1").len(), 1);
        assert!(ctrl.service_records().contains_name("n1", "web"));
        ctrl.shutdown().await;
    }

    #[tokio::test]
    async fn test_last_leave_tears_down() {
        let ctrl = controller().await;
        let n = Network::new("n1", "a", "bridge", "local");
        let e1 = Endpoint::new("e1", "web", &n);
        let e2 = Endpoint::new("e2", "db", &n);

        ctrl.watch_svc_record(&n, &e1).await.unwrap();
        ctrl.watch_svc_record(&n, &e2).await.unwrap();
        assert_eq!(ctrl.local_endpoints("n1").len(), 2);

        ctrl.unwatch_svc_record(&n, &e1).await.unwrap();
        assert_eq!(ctrl.watched_networks(), vec!["n1"]);
        assert!(!ctrl.service_records().contains_name("n1", "web"));

        ctrl.unwatch_svc_record(&n, &e2).await.unwrap();
        assert!(ctrl.watched_networks().is_empty());
        assert!(ctrl.service_records().is_network_empty("n1"));
        ctrl.shutdown().await;
    }

    #[tokio::test]
    async fn test_leave_for_unwatched_network_is_noop() {
        let ctrl = controller().await;
        let n = Network::new("n1", "a", "bridge", "local");
        let ep = Endpoint::new("e1", "web", &n);
        ctrl.unwatch_svc_record(&n, &ep).await.unwrap();
        assert!(ctrl.watched_networks().is_empty());
        ctrl.shutdown().await;
    }

    #[tokio::test]
    async fn test_swarm_multihost_is_ignored() {
        let ctrl = controller().await;
        let n = Network::new("n1", "ingress", "overlay", "swarm");
        let ep = Endpoint::new("e1", "web", &n);

        ctrl.watch_svc_record(&n, &ep).await.unwrap();
        assert!(ctrl.watched_networks().is_empty());
        assert!(ctrl.service_records().is_network_empty("n1"));
        ctrl.shutdown().await;
    }

    #[tokio::test]
    async fn test_events_after_shutdown_fail() {
        let ctrl = controller().await;
        ctrl.shutdown().await;

        let n = Network::new("n1", "a", "bridge", "local");
        let ep = Endpoint::new("e1", "web", &n);
        let err = ctrl.watch_svc_record(&n, &ep).await.unwrap_err();
        assert!(matches!(err, StoreError::Shutdown));
    }
}
