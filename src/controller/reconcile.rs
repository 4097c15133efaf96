// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-network reconciler.
//!
//! Each watched network gets one reconciler task. Every endpoint-count
//! notification triggers a full re-list of the network's endpoints, which is
//! diffed against what the node already knows:
//!
//! ```text
//! count changed ──► list endpoints ──► diff_remote_endpoints ──► deletes ──► adds
//!                                        (under watch lock)       (svc records, lock released)
//! ```
//!
//! The count is only a trigger; the listing is what gets trusted.

use super::{Inner, NetworkController};
use crate::metrics;
use crate::model::{Endpoint, EndpointCount, Network};
use crate::svc_record::ServiceRecords;
use std::collections::{HashMap, HashSet};
use std::sync::Weak;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info_span, trace, warn, Instrument};

/// Service-record changes produced by one reconciler pass.
#[derive(Debug, Clone, Default)]
pub struct EndpointDiff {
    /// New or renamed remote endpoints.
    pub adds: Vec<Endpoint>,
    /// Remote endpoints that disappeared from the store.
    pub deletes: Vec<Endpoint>,
}

impl EndpointDiff {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.deletes.is_empty()
    }
}

/// Diff a fresh listing against the known remote endpoints of a network.
///
/// `remote` is updated in place to reflect `listed`. Endpoints in `local`
/// are never added and never reported as deleted. A known endpoint listed
/// under a new name is reported as an add only; the add replaces the old
/// name.
pub fn diff_remote_endpoints(
    local: &HashMap<String, Endpoint>,
    remote: &mut HashMap<String, Endpoint>,
    listed: Vec<Endpoint>,
) -> EndpointDiff {
    let mut removal_candidates = remote.clone();
    let mut renamed: HashSet<String> = HashSet::new();
    let mut adds = Vec::new();

    for endpoint in listed {
        if local.contains_key(endpoint.id()) {
            continue;
        }

        if let Some(known) = remote.get(endpoint.id()) {
            if known.name() == endpoint.name() {
                removal_candidates.remove(endpoint.id());
                continue;
            }
            renamed.insert(endpoint.id().to_string());
        }

        remote.insert(endpoint.id().to_string(), endpoint.clone());
        adds.push(endpoint);
    }

    let mut deletes = Vec::new();
    for (id, endpoint) in removal_candidates {
        if renamed.contains(&id) {
            continue;
        }
        remote.remove(&id);
        if !local.contains_key(&id) {
            deletes.push(endpoint);
        }
    }
    deletes.sort_by(|a, b| a.id().cmp(b.id()));

    EndpointDiff { adds, deletes }
}

/// Reconciler task body for one watched network.
///
/// Exits when `stop_rx` fires, the notification channel closes, or the
/// controller is dropped.
pub(super) async fn run_reconciler<R: ServiceRecords>(
    inner: Weak<Inner<R>>,
    network: Network,
    generation: u64,
    mut stop_rx: watch::Receiver<bool>,
    mut notify_rx: mpsc::Receiver<EndpointCount>,
) {
    let span = info_span!("reconciler", network_id = %network.id(), generation);

    async move {
        debug!("Starting endpoint reconciler");
        loop {
            tokio::select! {
                biased;

                _ = stop_rx.changed() => break,
                notification = notify_rx.recv() => {
                    let Some(ec) = notification else {
                        debug!("Endpoint count watch closed");
                        break;
                    };
                    trace!(count = ec.count(), "Endpoint count changed");

                    let Some(inner) = inner.upgrade() else { break };
                    NetworkController::from_inner(inner)
                        .reconcile_endpoints(&network, generation, &stop_rx)
                        .await;
                }
            }
        }
        debug!("Endpoint reconciler stopped");
    }
    .instrument(span)
    .await
}

impl<R: ServiceRecords> NetworkController<R> {
    /// One reconciler pass for `network`.
    async fn reconcile_endpoints(
        &self,
        network: &Network,
        generation: u64,
        stop_rx: &watch::Receiver<bool>,
    ) {
        let started = Instant::now();

        let listed = match self.endpoints_from_store(network).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "Failed to list endpoints for watched network");
                metrics::record_reconcile_skipped("list_failed");
                return;
            }
        };

        let diff = {
            let mut table = self.lock_watches();
            let Some(nw) = table
                .get_mut(network.id())
                .filter(|nw| nw.generation == generation)
            else {
                metrics::record_reconcile_skipped("not_watched");
                return;
            };
            diff_remote_endpoints(&nw.local_eps, &mut nw.remote_eps, listed)
        };

        if *stop_rx.borrow() {
            metrics::record_reconcile_skipped("stopped");
            return;
        }

        let network_ref = network.to_ref();
        for endpoint in &diff.deletes {
            let locals = self.local_endpoint_list(network.id());
            self.inner
                .svc_records
                .update_record(&network_ref, endpoint, &locals, false);
        }
        for endpoint in &diff.adds {
            let locals = self.local_endpoint_list(network.id());
            self.inner
                .svc_records
                .update_record(&network_ref, endpoint, &locals, true);
        }

        metrics::record_reconcile(diff.adds.len(), diff.deletes.len(), started.elapsed());
        if !diff.is_empty() {
            debug!(
                adds = diff.adds.len(),
                deletes = diff.deletes.len(),
                "Reconciled remote endpoints"
            );
        }
    }
}
