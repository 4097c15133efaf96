// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persisted records: networks, endpoints and per-network endpoint counts.
//!
//! Endpoints and endpoint counts refer back to their network through a
//! [`NetworkRef`], a plain identity handle. Nothing here owns anything else:
//! a network never owns its endpoints, and an endpoint never keeps its
//! network alive.

mod endpoint;
mod endpoint_count;
mod network;

pub use endpoint::Endpoint;
pub use endpoint_count::EndpointCount;
pub use network::Network;

use crate::datastore::LOCAL_SCOPE;

/// Non-owning reference to a network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NetworkRef {
    pub id: String,
    pub name: String,
    pub scope: String,
}

impl NetworkRef {
    /// Scope whose store holds the network and its children.
    pub fn data_scope(&self) -> &str {
        if self.scope.is_empty() {
            LOCAL_SCOPE
        } else {
            &self.scope
        }
    }
}
