// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Multi-store listings of networks and endpoints.
//!
//! Stores are visited in registry order. Single-object lookups stop at the
//! first store that has the object; listings concatenate.

use super::NetworkController;
use crate::datastore::{key, DataStore, KvObject, ENDPOINT_COUNT_KEY_PREFIX, NETWORK_KEY_PREFIX};
use crate::error::{Result, StoreError};
use crate::metrics;
use crate::model::{Endpoint, EndpointCount, Network, NetworkRef};
use crate::svc_record::ServiceRecords;
use tracing::{debug, warn};

impl<R: ServiceRecords> NetworkController<R> {
    /// Networks stored under `scope`, each with its endpoint count attached.
    ///
    /// A network whose count is missing is dropped from the result unless it
    /// is being deleted; the cleanup walker still needs to see those.
    pub async fn networks_for_scope(&self, scope: &str) -> Result<Vec<Network>> {
        let Some(store) = self.store(scope) else {
            return Ok(Vec::new());
        };

        let listed = match store
            .list(&key(&[NETWORK_KEY_PREFIX]), &Network::default())
            .await
        {
            Ok(listed) => listed,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::backend(
                    scope,
                    format!("failed to get networks: {e}"),
                ))
            }
        };

        let mut networks = Vec::with_capacity(listed.len());
        for mut network in listed {
            let mut ec = EndpointCount::new(network.to_ref());
            match store.get_object(&key(&ec.key()), &mut ec).await {
                Ok(()) => network.set_endpoint_count(Some(ec)),
                Err(e) if network.in_delete() => {
                    debug!(network_id = %network.id(), error = %e, "No endpoint count for network being deleted");
                }
                Err(e) => {
                    warn!(
                        network = %network.name(),
                        network_id = %network.id(),
                        error = %e,
                        "Could not find endpoint count for network"
                    );
                    metrics::record_inconsistent_network(scope);
                    continue;
                }
            }

            if network.scope().is_empty() {
                network.set_scope(scope);
            }
            networks.push(network);
        }

        Ok(networks)
    }

    /// Every network in every store, counts attached where found.
    ///
    /// Store errors are logged and that store is skipped.
    pub async fn networks_from_store(&self) -> Vec<Network> {
        let mut networks = Vec::new();
        for store in self.stores() {
            match networks_in(&store).await {
                Ok(found) => networks.extend(found),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    debug!(scope = %store.scope(), error = %e, "Failed to get networks from store");
                }
            }
        }
        networks
    }

    /// The network with `id`, from the first store that has it.
    pub async fn network_from_store(&self, id: &str) -> Result<Network> {
        for store in self.stores() {
            let mut network = Network::default();
            let network_key = key(&[NETWORK_KEY_PREFIX, id]);
            if let Err(e) = store.get_object(&network_key, &mut network).await {
                if !e.is_not_found() {
                    debug!(scope = %store.scope(), network_id = id, error = %e, "Could not read network");
                }
                continue;
            }

            let mut ec = EndpointCount::new(network.to_ref());
            match store.get_object(&key(&ec.key()), &mut ec).await {
                Ok(()) => network.set_endpoint_count(Some(ec)),
                Err(e) => {
                    debug!(network_id = id, error = %e, "No endpoint count for network");
                }
            }

            if network.scope().is_empty() {
                network.set_scope(store.scope());
            }
            return Ok(network);
        }

        Err(StoreError::NoSuchNetwork(id.to_string()))
    }

    /// The endpoint `endpoint_id` of `network`, from the first store that
    /// has it.
    ///
    /// Not-found answers just move the search on. Any other store failure
    /// is reported as a `scope:reason` entry if no store has the endpoint.
    pub async fn endpoint_from_store(&self, network: &Network, endpoint_id: &str) -> Result<Endpoint> {
        let mut errors = Vec::new();
        let network_ref = network.to_ref();

        for store in self.stores() {
            let mut endpoint = Endpoint::prototype(network_ref.clone());
            endpoint.set_id(endpoint_id);
            match store.get_object(&key(&endpoint.key()), &mut endpoint).await {
                Ok(()) => return Ok(endpoint),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    debug!(scope = %store.scope(), endpoint_id, error = %e, "Could not read endpoint");
                    errors.push(format!("{}:{}", store.scope(), e));
                }
            }
        }

        Err(StoreError::EndpointNotFound {
            id: endpoint_id.to_string(),
            errors,
        })
    }

    /// Every endpoint of `network` across all stores.
    ///
    /// An endpoint present in more than one store appears once per store.
    /// A store with no endpoints for the network contributes nothing; other
    /// store errors are logged and skipped.
    pub async fn endpoints_from_store(&self, network: &Network) -> Result<Vec<Endpoint>> {
        let proto = Endpoint::prototype(network.to_ref());
        let prefix = key(&proto.key_prefix());
        let mut endpoints = Vec::new();

        for store in self.stores() {
            match store.list(&prefix, &proto).await {
                Ok(found) => endpoints.extend(found),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    debug!(
                        scope = %store.scope(),
                        network_id = %network.id(),
                        error = %e,
                        "Failed to get endpoints from store"
                    );
                }
            }
        }

        Ok(endpoints)
    }
}

/// All networks in one store with the store's endpoint counts attached.
async fn networks_in(store: &DataStore) -> Result<Vec<Network>> {
    let mut networks = store
        .list(&key(&[NETWORK_KEY_PREFIX]), &Network::default())
        .await?;

    let counts = match store
        .map(
            &key(&[ENDPOINT_COUNT_KEY_PREFIX]),
            &EndpointCount::new(NetworkRef::default()),
        )
        .await
    {
        Ok(counts) => counts,
        Err(e) if e.is_not_found() => Default::default(),
        Err(e) => {
            debug!(scope = %store.scope(), error = %e, "Failed to get endpoint counts");
            Default::default()
        }
    };

    for network in &mut networks {
        let mut ec = EndpointCount::new(network.to_ref());
        let count_key = key(&ec.key());
        if let Some(found) = counts.get(count_key.trim_matches('/')) {
            ec.set_count(found.count());
            ec.set_index(found.index());
            network.set_endpoint_count(Some(ec));
        }
        if network.scope().is_empty() {
            network.set_scope(store.scope());
        }
    }

    Ok(networks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    async fn controller() -> NetworkController {
        let ctrl = NetworkController::new(StoreConfig::for_testing());
        ctrl.init_stores().await.unwrap();
        ctrl
    }

    async fn store_network(ctrl: &NetworkController, n: &mut Network, with_count: bool) {
        ctrl.update_to_store(n).await.unwrap();
        if with_count {
            let mut ec = EndpointCount::new(n.to_ref());
            ctrl.update_to_store(&mut ec).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_networks_for_unknown_scope_is_empty() {
        let ctrl = controller().await;
        assert!(ctrl.networks_for_scope("swarm").await.unwrap().is_empty());
        assert!(ctrl.networks_for_scope("global").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_networks_for_scope_drops_inconsistent() {
        let ctrl = controller().await;
        let mut ok = Network::new("n1", "good", "overlay", "global");
        let mut broken = Network::new("n2", "broken", "overlay", "global");
        let mut deleting = Network::new("n3", "going", "overlay", "global");
        deleting.set_in_delete(true);

        store_network(&ctrl, &mut ok, true).await;
        store_network(&ctrl, &mut broken, false).await;
        store_network(&ctrl, &mut deleting, false).await;

        let mut ids: Vec<String> = ctrl
            .networks_for_scope("global")
            .await
            .unwrap()
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["n1", "n3"]);
    }

    #[tokio::test]
    async fn test_networks_from_store_attaches_counts() {
        let ctrl = controller().await;
        let mut n = Network::new("n1", "a", "overlay", "global");
        store_network(&ctrl, &mut n, true).await;
        let mut ec = EndpointCount::new(n.to_ref());
        ctrl.store("global")
            .unwrap()
            .get_object(&key(&ec.key()), &mut ec)
            .await
            .unwrap();
        ctrl.increment_endpoint_count(&mut ec).await.unwrap();

        let mut l = Network::new("l1", "b", "bridge", "");
        store_network(&ctrl, &mut l, false).await;

        let networks = ctrl.networks_from_store().await;
        assert_eq!(networks.len(), 2);

        let global = networks.iter().find(|n| n.id() == "n1").unwrap();
        assert_eq!(global.endpoint_count().unwrap().count(), 1);
        assert_eq!(global.scope(), "global");

        let local = networks.iter().find(|n| n.id() == "l1").unwrap();
        assert!(local.endpoint_count().is_none());
        assert_eq!(local.scope(), "local");
    }

    #[tokio::test]
    async fn test_network_from_store() {
        let ctrl = controller().await;
        let mut n = Network::new("n1", "a", "overlay", "global");
        store_network(&ctrl, &mut n, true).await;

        let found = ctrl.network_from_store("n1").await.unwrap();
        assert_eq!(found.name(), "a");
        assert!(found.endpoint_count().is_some());

        let err = ctrl.network_from_store("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NoSuchNetwork(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_network_from_store_without_count() {
        let ctrl = controller().await;
        let mut l = Network::new("l1", "b", "bridge", "");
        store_network(&ctrl, &mut l, false).await;

        let found = ctrl.network_from_store("l1").await.unwrap();
        assert_eq!(found.name(), "b");
        assert_eq!(found.scope(), "local");
        assert!(found.endpoint_count().is_none());

        let listed: Vec<String> = ctrl
            .networks_from_store()
            .await
            .iter()
            .map(|n| n.id().to_string())
            .collect();
        assert_eq!(listed, vec!["l1"]);
    }

    #[tokio::test]
    async fn test_endpoint_from_store_aggregates_errors() {
        let ctrl = controller().await;
        let n = Network::new("n1", "a", "overlay", "global");
        let mut ep = Endpoint::new("e1", "web", &n);
        ctrl.update_to_store(&mut ep).await.unwrap();

        let found = ctrl.endpoint_from_store(&n, "e1").await.unwrap();
        assert_eq!(found.name(), "web");
        assert_eq!(found.network().id, "n1");

        match ctrl.endpoint_from_store(&n, "e2").await.unwrap_err() {
            StoreError::EndpointNotFound { id, errors } => {
                assert_eq!(id, "e2");
                assert!(errors.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_endpoint_from_store_reports_store_failures() {
        let ctrl = controller().await;
        let n = Network::new("n1", "a", "overlay", "global");
        ctrl.store("local").unwrap().close();

        match ctrl.endpoint_from_store(&n, "e1").await.unwrap_err() {
            StoreError::EndpointNotFound { errors, .. } => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("local:"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_endpoints_from_store_concatenates() {
        let ctrl = controller().await;
        let n = Network::new("n1", "a", "overlay", "global");
        for (id, name) in [("e1", "a"), ("e2", "b")] {
            let mut ep = Endpoint::new(id, name, &n);
            ctrl.update_to_store(&mut ep).await.unwrap();
        }

        let mut names: Vec<String> = ctrl
            .endpoints_from_store(&n)
            .await
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);

        let empty = Network::new("n2", "b", "overlay", "global");
        assert!(ctrl.endpoints_from_store(&empty).await.unwrap().is_empty());
    }
}
