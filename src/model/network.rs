// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use super::{EndpointCount, NetworkRef};
use crate::datastore::{KvObject, ObjectKind, LOCAL_SCOPE, NETWORK_KEY_PREFIX};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A network as persisted in a scoped store.
///
/// `endpoint_count` is an in-process cache filled in by the listing layer;
/// the count object has its own key and lifecycle in the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    id: String,
    name: String,
    #[serde(rename = "networkType")]
    network_type: String,
    #[serde(default)]
    scope: String,
    #[serde(default, rename = "inDelete")]
    in_delete: bool,
    #[serde(default, rename = "configOnly")]
    config_only: bool,
    #[serde(skip)]
    endpoint_count: Option<EndpointCount>,
    #[serde(skip)]
    index: u64,
    #[serde(skip)]
    transient: bool,
}

impl Network {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        network_type: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            network_type: network_type.into(),
            scope: scope.into(),
            ..Default::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Driver name.
    pub fn network_type(&self) -> &str {
        &self.network_type
    }

    /// Declared scope, empty if never assigned.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn set_scope(&mut self, scope: impl Into<String>) {
        self.scope = scope.into();
    }

    /// Whether a delete of this network is in progress.
    pub fn in_delete(&self) -> bool {
        self.in_delete
    }

    pub fn set_in_delete(&mut self, in_delete: bool) {
        self.in_delete = in_delete;
    }

    /// Configuration-only templates never carry endpoints.
    pub fn config_only(&self) -> bool {
        self.config_only
    }

    pub fn set_config_only(&mut self, config_only: bool) {
        self.config_only = config_only;
    }

    /// Cached endpoint count, if the listing found one.
    pub fn endpoint_count(&self) -> Option<&EndpointCount> {
        self.endpoint_count.as_ref()
    }

    pub fn set_endpoint_count(&mut self, ec: Option<EndpointCount>) {
        self.endpoint_count = ec;
    }

    /// The cached count, or a fresh (unstored) one keyed to this network.
    pub fn endpoint_count_or_new(&self) -> EndpointCount {
        self.endpoint_count
            .clone()
            .unwrap_or_else(|| EndpointCount::new(self.to_ref()))
    }

    /// Identity handle for back-references.
    pub fn to_ref(&self) -> NetworkRef {
        NetworkRef {
            id: self.id.clone(),
            name: self.name.clone(),
            scope: self.scope.clone(),
        }
    }

    /// A copy that is never written to or deleted from a store.
    pub fn into_transient(mut self) -> Self {
        self.transient = true;
        self
    }
}

impl KvObject for Network {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Network
    }

    fn key(&self) -> Vec<String> {
        vec![NETWORK_KEY_PREFIX.to_string(), self.id.clone()]
    }

    fn key_prefix(&self) -> Vec<String> {
        vec![NETWORK_KEY_PREFIX.to_string()]
    }

    fn value(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    fn set_value(&mut self, value: &[u8]) -> Result<()> {
        let decoded: Network = serde_json::from_slice(value)?;
        self.id = decoded.id;
        self.name = decoded.name;
        self.network_type = decoded.network_type;
        self.scope = decoded.scope;
        self.in_delete = decoded.in_delete;
        self.config_only = decoded.config_only;
        Ok(())
    }

    fn index(&self) -> u64 {
        self.index
    }

    fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    fn data_scope(&self) -> &str {
        if self.scope.is_empty() {
            LOCAL_SCOPE
        } else {
            &self.scope
        }
    }

    fn skip(&self) -> bool {
        self.transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let n = Network::new("n1", "frontend", "bridge", "local");
        assert_eq!(n.key(), vec!["network", "n1"]);
        assert_eq!(n.key_prefix(), vec!["network"]);
        assert_eq!(n.kind(), ObjectKind::Network);
    }

    #[test]
    fn test_value_roundtrip_keeps_flags() {
        let mut n = Network::new("n1", "frontend", "overlay", "global");
        n.set_in_delete(true);
        n.set_config_only(true);

        let mut decoded = Network::default();
        decoded.set_value(&n.value().unwrap()).unwrap();
        assert_eq!(decoded.id(), "n1");
        assert_eq!(decoded.network_type(), "overlay");
        assert_eq!(decoded.scope(), "global");
        assert!(decoded.in_delete());
        assert!(decoded.config_only());
    }

    #[test]
    fn test_missing_scope_defaults_to_local() {
        let mut n = Network::default();
        n.set_value(br#"{"id":"n1","name":"x","networkType":"bridge"}"#).unwrap();
        assert_eq!(n.scope(), "");
        assert_eq!(n.data_scope(), LOCAL_SCOPE);
        assert!(!n.in_delete());
    }

    #[test]
    fn test_set_value_keeps_index() {
        let mut n = Network::new("n1", "a", "bridge", "local");
        n.set_index(7);
        let encoded = n.value().unwrap();
        n.set_value(&encoded).unwrap();
        assert_eq!(n.index(), 7);
    }

    #[test]
    fn test_endpoint_count_or_new_uses_network_identity() {
        let n = Network::new("n1", "a", "bridge", "global");
        let ec = n.endpoint_count_or_new();
        assert_eq!(ec.network().id, "n1");
        assert_eq!(ec.data_scope(), "global");
        assert!(!ec.exists());
    }

    #[test]
    fn test_transient_skips_persistence() {
        let n = Network::new("n1", "a", "bridge", "local");
        assert!(!n.skip());
        assert!(n.into_transient().skip());
    }
}
