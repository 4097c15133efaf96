// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Service-record hook.
//!
//! The watch coordinator and reconcilers push endpoint membership changes
//! into a [`ServiceRecords`] implementation. The name-resolution table
//! itself lives behind this trait; this crate only drives it.
//!
//! # Example
//!
//! ```rust
//! use network_store::svc_record::ServiceRecords;
//! use network_store::model::{Endpoint, NetworkRef};
//!
//! struct Printer;
//!
//! impl ServiceRecords for Printer {
//!     fn update_record(&self, network: &NetworkRef, ep: &Endpoint, _local: &[Endpoint], is_add: bool) {
//!         println!("{} {} on {}", if is_add { "add" } else { "remove" }, ep.name(), network.id);
//!     }
//!
//!     fn clear_network(&self, network_id: &str) {
//!         println!("clear {network_id}");
//!     }
//! }
//! ```

use crate::model::{Endpoint, NetworkRef};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Trait defining what we need from the name-resolution table.
pub trait ServiceRecords: Send + Sync + 'static {
    /// Add or remove `endpoint`'s record in `network`.
    ///
    /// `local_endpoints` are the network's locally-owned endpoints at the
    /// time of the call, for implementations that also maintain per-container
    /// state.
    fn update_record(
        &self,
        network: &NetworkRef,
        endpoint: &Endpoint,
        local_endpoints: &[Endpoint],
        is_add: bool,
    );

    /// Drop every record for `network_id`.
    fn clear_network(&self, network_id: &str);
}

/// A no-op implementation for standalone mode.
///
/// Logs operations but doesn't keep any records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpServiceRecords;

impl ServiceRecords for NoOpServiceRecords {
    fn update_record(
        &self,
        network: &NetworkRef,
        endpoint: &Endpoint,
        local_endpoints: &[Endpoint],
        is_add: bool,
    ) {
        debug!(
            network_id = %network.id,
            endpoint_id = %endpoint.id(),
            name = %endpoint.name(),
            local = local_endpoints.len(),
            is_add,
            "NoOp: would update service record"
        );
    }

    fn clear_network(&self, network_id: &str) {
        debug!(network_id, "NoOp: would clear service records");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Record {
    name: String,
    address: Option<IpAddr>,
}

/// In-memory name table: network id → endpoint id → (name, address).
///
/// Keyed by endpoint id so that adding a renamed endpoint replaces its old
/// name instead of leaving a stale entry behind.
#[derive(Debug, Default)]
pub struct ServiceRecordTable {
    networks: Mutex<HashMap<String, HashMap<String, Record>>>,
}

impl ServiceRecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, Record>>> {
        self.networks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Addresses registered under `name` in `network_id`.
    pub fn resolve(&self, network_id: &str, name: &str) -> Vec<IpAddr> {
        self.lock()
            .get(network_id)
            .map(|records| {
                records
                    .values()
                    .filter(|r| r.name == name)
                    .filter_map(|r| r.address)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any endpoint is registered under `name` in `network_id`.
    pub fn contains_name(&self, network_id: &str, name: &str) -> bool {
        self.lock()
            .get(network_id)
            .is_some_and(|records| records.values().any(|r| r.name == name))
    }

    /// Sorted names registered in `network_id`.
    pub fn names(&self, network_id: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .get(network_id)
            .map(|records| records.values().map(|r| r.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Whether `network_id` has no records at all.
    pub fn is_network_empty(&self, network_id: &str) -> bool {
        self.lock()
            .get(network_id)
            .map_or(true, |records| records.is_empty())
    }
}

impl ServiceRecords for ServiceRecordTable {
    fn update_record(
        &self,
        network: &NetworkRef,
        endpoint: &Endpoint,
        local_endpoints: &[Endpoint],
        is_add: bool,
    ) {
        let mut networks = self.lock();
        if is_add {
            networks.entry(network.id.clone()).or_default().insert(
                endpoint.id().to_string(),
                Record {
                    name: endpoint.name().to_string(),
                    address: endpoint.address(),
                },
            );
        } else if let Some(records) = networks.get_mut(&network.id) {
            records.remove(endpoint.id());
        }
        trace!(
            network_id = %network.id,
            endpoint_id = %endpoint.id(),
            local = local_endpoints.len(),
            is_add,
            "Service record updated"
        );
    }

    fn clear_network(&self, network_id: &str) {
        self.lock().remove(network_id);
    }
}
