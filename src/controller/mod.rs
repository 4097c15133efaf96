// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Network controller.
//!
//! The orchestrator that ties together:
//! - The per-scope stores via [`crate::registry::StoreRegistry`]
//! - Versioned object writes/deletes (`sync`)
//! - Multi-store listings of networks and endpoints (`listing`)
//! - The watch dispatcher and per-network reconcilers (`watch`, [`reconcile`])
//! - Maintenance walkers for half-deleted and special networks (`maintenance`)
//!
//! # Lifecycle
//!
//! 1. [`NetworkController::init_stores()`] opens one store per configured
//!    scope and starts the watch dispatcher (once per controller).
//! 2. Local endpoint joins/leaves are fed through
//!    [`watch_svc_record()`](NetworkController::watch_svc_record) and
//!    [`unwatch_svc_record()`](NetworkController::unwatch_svc_record).
//! 3. [`shutdown()`](NetworkController::shutdown) stops every reconciler, the
//!    dispatcher, and closes the stores.
//!
//! # Locking
//!
//! Watch state for every network lives behind one mutex. It is never held
//! across an `.await` or across a service-record call made by a reconciler.

mod listing;
mod maintenance;
pub mod reconcile;
mod sync;
mod watch;

pub use maintenance::NetworkLifecycle;
pub use reconcile::{diff_remote_endpoints, EndpointDiff};

use crate::config::StoreConfig;
use crate::datastore::DataStore;
use crate::error::Result;
use crate::metrics;
use crate::model::{Endpoint, Network};
use crate::registry::StoreRegistry;
use crate::svc_record::{NoOpServiceRecords, ServiceRecords};
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use watch::{Dispatcher, WatchTable};

/// How long shutdown waits for the dispatcher task to exit.
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Inner<R> {
    config: StoreConfig,
    stores: StoreRegistry,
    svc_records: Arc<R>,
    watches: Mutex<WatchTable>,
    dispatcher: OnceLock<Dispatcher>,
    generation: AtomicU64,
}

/// Keeps scoped stores and local service records in step with the cluster.
///
/// Cheap to clone; clones share all state.
pub struct NetworkController<R: ServiceRecords = NoOpServiceRecords> {
    inner: Arc<Inner<R>>,
}

impl<R: ServiceRecords> Clone for NetworkController<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl NetworkController<NoOpServiceRecords> {
    /// Create a controller whose service-record updates are only logged.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_service_records(config, Arc::new(NoOpServiceRecords))
    }
}

impl<R: ServiceRecords> NetworkController<R> {
    /// Create a controller driving the given service-record table.
    ///
    /// No stores are opened until [`init_stores()`](Self::init_stores).
    pub fn with_service_records(config: StoreConfig, svc_records: Arc<R>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                stores: StoreRegistry::new(),
                svc_records,
                watches: Mutex::new(WatchTable::new()),
                dispatcher: OnceLock::new(),
                generation: AtomicU64::new(0),
            }),
        }
    }

    fn from_inner(inner: Arc<Inner<R>>) -> Self {
        Self { inner }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    pub fn service_records(&self) -> &Arc<R> {
        &self.inner.svc_records
    }

    pub fn registry(&self) -> &StoreRegistry {
        &self.inner.stores
    }

    /// Open one store per configured scope and start the watch dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn init_stores(&self) -> Result<()> {
        self.inner.stores.init(&self.inner.config)?;
        self.start_watch();
        Ok(())
    }

    /// Register an externally constructed store.
    pub fn register_store(&self, store: DataStore) -> Result<()> {
        self.inner.stores.register(store)
    }

    /// Store for `scope`, if registered.
    pub fn store(&self, scope: &str) -> Option<DataStore> {
        self.inner.stores.get(scope)
    }

    /// Every registered store, in priority order.
    pub fn stores(&self) -> Vec<DataStore> {
        self.inner.stores.all()
    }

    /// Close every store.
    pub fn close_stores(&self) {
        self.inner.stores.close_all();
    }

    pub fn is_distributed_control(&self) -> bool {
        self.inner.config.controller.distributed_control
    }

    /// Whether `network`'s driver spans hosts.
    pub fn driver_is_multihost(&self, network: &Network) -> bool {
        self.inner
            .config
            .controller
            .is_multihost_driver(network.network_type())
    }

    /// Whether `network`'s driver is in the special set.
    pub fn has_special_driver(&self, network: &Network) -> bool {
        self.inner
            .config
            .controller
            .is_special_driver(network.network_type())
    }

    fn lock_watches(&self) -> MutexGuard<'_, WatchTable> {
        self.inner
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids of networks with at least one local endpoint, sorted.
    pub fn watched_networks(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_watches().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Locally-owned endpoints of `network_id`.
    pub fn local_endpoints(&self, network_id: &str) -> Vec<Endpoint> {
        self.lock_watches()
            .get(network_id)
            .map(|nw| nw.local_list())
            .unwrap_or_default()
    }

    /// Endpoints of `network_id` learned from the store.
    pub fn remote_endpoints(&self, network_id: &str) -> Vec<Endpoint> {
        self.lock_watches()
            .get(network_id)
            .map(|nw| nw.remote_list())
            .unwrap_or_default()
    }

    /// Stop reconcilers and the dispatcher, then close every store.
    pub async fn shutdown(&self) {
        info!("Shutting down network controller");

        if let Some(dispatcher) = self.inner.dispatcher.get() {
            let _ = dispatcher.shutdown_tx.send(true);
            let task = dispatcher
                .task
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(task) = task {
                match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, task).await {
                    Ok(Ok(())) => debug!("Watch dispatcher exited"),
                    Ok(Err(e)) => warn!(error = %e, "Watch dispatcher panicked"),
                    Err(_) => warn!("Watch dispatcher did not stop in time"),
                }
            }
        }

        let stopped = {
            let mut table = self.lock_watches();
            let stopped = table.len();
            for (_, nw) in table.drain() {
                nw.stop();
            }
            stopped
        };
        metrics::set_watched_networks(0);

        self.close_stores();
        info!(stopped, "Network controller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeConfig;
    use crate::datastore::{MemoryBackend, GLOBAL_SCOPE};
    use crate::error::StoreError;

    #[test]
    fn test_controller_initial_state() {
        let ctrl = NetworkController::new(StoreConfig::for_testing());
        assert!(ctrl.stores().is_empty());
        assert!(ctrl.watched_networks().is_empty());
        assert!(!ctrl.is_distributed_control());
    }

    #[tokio::test]
    async fn test_init_stores_opens_scopes() {
        let ctrl = NetworkController::new(StoreConfig::for_testing());
        ctrl.init_stores().await.unwrap();

        assert!(ctrl.store("local").is_some());
        assert!(ctrl.store("global").is_some());
        assert!(ctrl.store("swarm").is_none());
        ctrl.shutdown().await;
    }

    #[tokio::test]
    async fn test_init_stores_failure_propagates() {
        let config = StoreConfig::default().with_scope(
            "global",
            ScopeConfig {
                provider: "etcd".to_string(),
                bucket: None,
            },
        );
        let ctrl = NetworkController::new(config);
        let err = ctrl.init_stores().await.unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        assert!(ctrl.stores().is_empty());
    }

    #[tokio::test]
    async fn test_register_store_rejects_duplicates() {
        let ctrl = NetworkController::new(StoreConfig::default());
        ctrl.register_store(DataStore::new(GLOBAL_SCOPE, Arc::new(MemoryBackend::new())))
            .unwrap();
        assert!(ctrl
            .register_store(DataStore::new(GLOBAL_SCOPE, Arc::new(MemoryBackend::new())))
            .is_err());
    }

    #[test]
    fn test_driver_policies() {
        let ctrl = NetworkController::new(StoreConfig::default());
        let overlay = Network::new("n1", "a", "overlay", "swarm");
        let host = Network::new("n2", "host", "host", "local");
        assert!(ctrl.driver_is_multihost(&overlay));
        assert!(!ctrl.driver_is_multihost(&host));
        assert!(ctrl.has_special_driver(&host));
    }

    #[tokio::test]
    async fn test_shutdown_closes_stores() {
        let ctrl = NetworkController::new(StoreConfig::for_testing());
        ctrl.init_stores().await.unwrap();
        ctrl.shutdown().await;

        let store = ctrl.store("global").unwrap();
        let mut n = Network::new("n1", "a", "bridge", "global");
        assert!(store.put_object_atomic(&mut n).await.is_err());
    }
}
