// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Maintenance walkers run at daemon start.
//!
//! - Stale cleanup: networks left half-deleted by a crash are force-deleted.
//! - Special networks: networks whose driver is special are re-added to the
//!   working set, since they are not reconstructed any other way.

use super::NetworkController;
use crate::datastore::BoxFuture;
use crate::metrics;
use crate::model::Network;
use crate::svc_record::ServiceRecords;
use tracing::{debug, info, warn};

/// What the maintenance walkers need from the network lifecycle owner.
///
/// Uses `BoxFuture` for dyn-compatibility.
pub trait NetworkLifecycle: Send + Sync {
    /// Delete `network`. With `force`, local state is removed even when the
    /// driver reports an error.
    fn delete_network<'a>(&'a self, network: &'a Network, force: bool) -> BoxFuture<'a, ()>;

    /// Bring `network` back into the working set.
    fn add_network<'a>(&'a self, network: &'a Network) -> BoxFuture<'a, ()>;
}

impl<R: ServiceRecords> NetworkController<R> {
    /// Force-delete every stored network marked as being deleted.
    ///
    /// Failures are logged and skipped. Returns how many were removed.
    pub async fn network_cleanup<L: NetworkLifecycle + ?Sized>(&self, lifecycle: &L) -> usize {
        let mut removed = 0;

        for network in self.networks_from_store().await {
            if !network.in_delete() {
                continue;
            }

            info!(network = %network.name(), network_id = %network.id(), "Removing stale network");
            match lifecycle.delete_network(&network, true).await {
                Ok(()) => {
                    removed += 1;
                    metrics::record_stale_network_cleanup(true);
                }
                Err(e) => {
                    debug!(network_id = %network.id(), error = %e, "Error while removing stale network");
                    metrics::record_stale_network_cleanup(false);
                }
            }
        }

        removed
    }

    /// Walker step for special networks.
    ///
    /// Re-adds `network` when its driver is special and it is not
    /// configuration-only. Always returns `false` so a walk continues.
    pub async fn populate_special<L: NetworkLifecycle + ?Sized>(
        &self,
        lifecycle: &L,
        network: &Network,
    ) -> bool {
        if self.has_special_driver(network) && !network.config_only() {
            match lifecycle.add_network(network).await {
                Ok(()) => metrics::record_special_network_populated(true),
                Err(e) => {
                    warn!(
                        network = %network.name(),
                        driver = %network.network_type(),
                        error = %e,
                        "Failed to populate network"
                    );
                    metrics::record_special_network_populated(false);
                }
            }
        }
        false
    }

    /// Run [`populate_special`](Self::populate_special) over every stored
    /// network. Returns how many networks qualified.
    pub async fn populate_special_networks<L: NetworkLifecycle + ?Sized>(&self, lifecycle: &L) -> usize {
        let mut populated = 0;
        for network in self.networks_from_store().await {
            if self.has_special_driver(&network) && !network.config_only() {
                populated += 1;
            }
            if self.populate_special(lifecycle, &network).await {
                break;
            }
        }
        populated
    }
}
