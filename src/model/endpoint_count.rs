// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use super::NetworkRef;
use crate::datastore::{KvObject, ObjectKind, ENDPOINT_COUNT_KEY_PREFIX};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Per-network sentinel whose version changes whenever membership changes.
///
/// Watchers use it only as a trigger to re-list endpoints; the count itself
/// is not authoritative about which endpoints exist.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointCount {
    #[serde(rename = "Count")]
    count: u64,
    #[serde(skip)]
    network: NetworkRef,
    #[serde(skip)]
    index: u64,
}

impl EndpointCount {
    pub fn new(network: NetworkRef) -> Self {
        Self {
            count: 0,
            network,
            index: 0,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn set_count(&mut self, count: u64) {
        self.count = count;
    }

    pub fn network(&self) -> &NetworkRef {
        &self.network
    }

    pub fn set_network(&mut self, network: NetworkRef) {
        self.network = network;
    }
}

impl KvObject for EndpointCount {
    fn kind(&self) -> ObjectKind {
        ObjectKind::EndpointCount
    }

    fn key(&self) -> Vec<String> {
        vec![
            ENDPOINT_COUNT_KEY_PREFIX.to_string(),
            self.network.id.clone(),
        ]
    }

    fn key_prefix(&self) -> Vec<String> {
        vec![ENDPOINT_COUNT_KEY_PREFIX.to_string()]
    }

    fn value(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn set_value(&mut self, value: &[u8]) -> Result<()> {
        let decoded: EndpointCount = serde_json::from_slice(value)?;
        self.count = decoded.count;
        Ok(())
    }

    fn index(&self) -> u64 {
        self.index
    }

    fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    fn data_scope(&self) -> &str {
        self.network.data_scope()
    }
}
