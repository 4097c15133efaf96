// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use super::{Network, NetworkRef};
use crate::datastore::{KvObject, ObjectKind, ENDPOINT_KEY_PREFIX};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A container's attachment point to a network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    address: Option<IpAddr>,
    #[serde(skip)]
    network: NetworkRef,
    #[serde(skip)]
    index: u64,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>, network: &Network) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            network: network.to_ref(),
            ..Default::default()
        }
    }

    /// An empty endpoint of `network`, used as a decode prototype.
    pub fn prototype(network: NetworkRef) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: IpAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container rename: same identity, new name.
    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    pub fn network(&self) -> &NetworkRef {
        &self.network
    }
}

impl KvObject for Endpoint {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Endpoint
    }

    fn key(&self) -> Vec<String> {
        vec![
            ENDPOINT_KEY_PREFIX.to_string(),
            self.network.id.clone(),
            self.id.clone(),
        ]
    }

    fn key_prefix(&self) -> Vec<String> {
        vec![ENDPOINT_KEY_PREFIX.to_string(), self.network.id.clone()]
    }

    fn value(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn set_value(&mut self, value: &[u8]) -> Result<()> {
        let decoded: Endpoint = serde_json::from_slice(value)?;
        self.id = decoded.id;
        self.name = decoded.name;
        self.address = decoded.address;
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
