// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Scoped key-value stores and the versioned-object contract.
//!
//! Two layers:
//!
//! - [`KvBackend`]: the raw backend contract (bytes in, bytes out, with a
//!   monotonic index per key for optimistic concurrency). Implemented by
//!   [`MemoryBackend`] and by anything a deployment plugs in.
//! - [`DataStore`]: a backend bound to one scope name, speaking in terms of
//!   [`KvObject`]s (networks, endpoints, endpoint counts).
//!
//! # Key Layout
//!
//! ```text
//! docker/network/v1.0/network/<nid>/
//! docker/network/v1.0/endpoint/<nid>/<eid>/
//! docker/network/v1.0/endpoint_count/<nid>/
//! ```

mod memory;

pub use memory::MemoryBackend;

use crate::config::ScopeConfig;
use crate::error::{Result, StoreError};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Node-local scope.
pub const LOCAL_SCOPE: &str = "local";
/// Cluster-wide scope.
pub const GLOBAL_SCOPE: &str = "global";
/// Cluster-wide scope managed by the orchestrator.
pub const SWARM_SCOPE: &str = "swarm";

/// Root segments every key starts with.
pub const ROOT_CHAIN: [&str; 3] = ["docker", "network", "v1.0"];
/// Prefix segment for network objects.
pub const NETWORK_KEY_PREFIX: &str = "network";
/// Prefix segment for endpoint objects.
pub const ENDPOINT_KEY_PREFIX: &str = "endpoint";
/// Prefix segment for endpoint count objects.
pub const ENDPOINT_COUNT_KEY_PREFIX: &str = "endpoint_count";

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Build a full store key from path segments.
///
/// ```
/// use network_store::datastore::key;
/// assert_eq!(key(&["network", "n1"]), "docker/network/v1.0/network/n1/");
/// ```
pub fn key<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = ROOT_CHAIN.join("/");
    for segment in segments {
        out.push('/');
        out.push_str(segment.as_ref());
    }
    out.push('/');
    out
}

/// Kind of a persisted object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Network,
    Endpoint,
    EndpointCount,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Network => write!(f, "network"),
            ObjectKind::Endpoint => write!(f, "endpoint"),
            ObjectKind::EndpointCount => write!(f, "endpoint_count"),
        }
    }
}

/// A persisted, versioned object.
///
/// `index` is the backend version the object was last read or written at;
/// zero means the object has never been stored, so a put must create it.
pub trait KvObject: Send + Sync {
    /// What kind of record this is.
    fn kind(&self) -> ObjectKind;

    /// Path segments identifying this object.
    fn key(&self) -> Vec<String>;

    /// Path segments shared by all siblings of this object.
    fn key_prefix(&self) -> Vec<String>;

    /// Serialized value.
    fn value(&self) -> Result<Vec<u8>>;

    /// Overwrite the persisted fields from a serialized value.
    fn set_value(&mut self, value: &[u8]) -> Result<()>;

    /// Backend version last observed.
    fn index(&self) -> u64;

    /// Record the backend version.
    fn set_index(&mut self, index: u64);

    /// Scope whose store holds this object.
    fn data_scope(&self) -> &str;

    /// Whether the object has been stored before.
    fn exists(&self) -> bool {
        self.index() != 0
    }

    /// Transient copies are never written or deleted.
    fn skip(&self) -> bool {
        false
    }
}

/// A raw key/value pair as stored by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    pub key: String,
    pub value: Vec<u8>,
    pub last_index: u64,
}

/// Contract a key-value backend must satisfy.
///
/// Errors: a missing key is `StoreError::KeyNotFound` (including a `list`
/// with no matches), a version mismatch is `StoreError::KeyModified`.
pub trait KvBackend: Send + Sync + 'static {
    /// Fetch a single key.
    fn get(&self, key: &str) -> BoxFuture<'_, KvPair>;

    /// Write `value` if the stored index equals `previous`.
    ///
    /// `previous == None` means the key must not exist yet. Returns the new index.
    fn atomic_put(&self, key: &str, value: Vec<u8>, previous: Option<u64>) -> BoxFuture<'_, u64>;

    /// Delete `key` if its stored index equals `previous`.
    fn atomic_delete(&self, key: &str, previous: u64) -> BoxFuture<'_, ()>;

    /// All pairs whose key starts with `prefix`.
    fn list(&self, prefix: &str) -> BoxFuture<'_, Vec<KvPair>>;

    /// Stream the value of `key` every time it changes.
    ///
    /// The current value (if any) is delivered first. The stream ends when
    /// `stop` flips to `true` or the backend is closed.
    fn watch(&self, key: &str, stop: watch::Receiver<bool>) -> BoxFuture<'_, mpsc::Receiver<KvPair>>;

    /// Whether `watch` is available.
    fn supports_watch(&self) -> bool {
        true
    }

    /// Release backend resources.
    fn close(&self) {}
}

/// A backend store bound to one scope.
#[derive(Clone)]
pub struct DataStore {
    scope: String,
    backend: Arc<dyn KvBackend>,
}

impl fmt::Debug for DataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStore")
            .field("scope", &self.scope)
            .field("watchable", &self.watchable())
            .finish()
    }
}

/// Open a store for `scope` from its configuration.
pub fn new_data_store(scope: &str, cfg: &ScopeConfig) -> Result<DataStore> {
    let backend: Arc<dyn KvBackend> = match cfg.provider.as_str() {
        "memory" | "inmem" => match &cfg.bucket {
            Some(bucket) => Arc::new(MemoryBackend::shared(bucket)),
            None => Arc::new(MemoryBackend::new()),
        },
        other => {
            return Err(StoreError::Config(format!(
                "unsupported store provider {other:?} for scope {scope:?}"
            )))
        }
    };
    debug!(scope, provider = %cfg.provider, bucket = ?cfg.bucket, "Opened data store");
    Ok(DataStore::new(scope, backend))
}

impl DataStore {
    /// Bind a backend to a scope.
    pub fn new(scope: impl Into<String>, backend: Arc<dyn KvBackend>) -> Self {
        Self {
            scope: scope.into(),
            backend,
        }
    }

    /// Scope this store serves.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Whether change notifications are available.
    pub fn watchable(&self) -> bool {
        self.backend.supports_watch()
    }

    /// Read `key` into `obj`, updating its value and index.
    pub async fn get_object<T: KvObject + ?Sized>(&self, key: &str, obj: &mut T) -> Result<()> {
        let pair = self.backend.get(key).await?;
        obj.set_value(&pair.value)?;
        obj.set_index(pair.last_index);
        Ok(())
    }

    /// Versioned write. On success `obj` carries the new index.
    pub async fn put_object_atomic<T: KvObject + ?Sized>(&self, obj: &mut T) -> Result<()> {
        if obj.skip() {
            return Ok(());
        }
        let value = obj.value()?;
        let previous = obj.exists().then(|| obj.index());
        let index = self
            .backend
            .atomic_put(&key(&obj.key()), value, previous)
            .await?;
        obj.set_index(index);
        Ok(())
    }

    /// Versioned delete at the object's current index.
    pub async fn delete_object_atomic<T: KvObject + ?Sized>(&self, obj: &T) -> Result<()> {
        if obj.skip() {
            return Ok(());
        }
        self.backend.atomic_delete(&key(&obj.key()), obj.index()).await
    }

    /// Decode every object under `prefix`, cloning `proto` for each.
    ///
    /// The prototype carries context the stored value does not (for example
    /// an endpoint's network reference).
    pub async fn list<T: KvObject + Clone>(&self, prefix: &str, proto: &T) -> Result<Vec<T>> {
        let pairs = self.backend.list(prefix).await?;
        let mut out = Vec::with_capacity(pairs.len());
        for pair in pairs {
            out.push(decode(proto, &pair)?);
        }
        Ok(out)
    }

    /// Like [`list`](Self::list) but keyed by the stored key with leading
    /// and trailing `/` trimmed.
    pub async fn map<T: KvObject + Clone>(
        &self,
        prefix: &str,
        proto: &T,
    ) -> Result<HashMap<String, T>> {
        let pairs = self.backend.list(prefix).await?;
        let mut out = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let obj = decode(proto, &pair)?;
            out.insert(pair.key.trim_matches('/').to_string(), obj);
        }
        Ok(out)
    }

    /// Watch `obj` for changes, delivering decoded copies.
    pub async fn watch<T>(&self, obj: &T, stop: watch::Receiver<bool>) -> Result<mpsc::Receiver<T>>
    where
        T: KvObject + Clone + 'static,
    {
        if !self.watchable() {
            return Err(StoreError::WatchUnsupported(self.scope.clone()));
        }

        let mut raw = self.backend.watch(&key(&obj.key()), stop).await?;
        let (tx, rx) = mpsc::channel(1);
        let proto = obj.clone();
        let scope = self.scope.clone();

        tokio::spawn(async move {
            while let Some(pair) = raw.recv().await {
                match decode(&proto, &pair) {
                    Ok(decoded) => {
                        if tx.send(decoded).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(scope = %scope, key = %pair.key, error = %e, "Dropping undecodable watch value");
                    }
                }
            }
        });

        Ok(rx)
    }

    /// Close the underlying backend.
    pub fn close(&self) {
        self.backend.close();
    }
}

fn decode<T: KvObject + Clone>(proto: &T, pair: &KvPair) -> Result<T> {
    let mut obj = proto.clone();
    obj.set_value(&pair.value)?;
    obj.set_index(pair.last_index);
    Ok(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EndpointCount, Network};

    fn network(id: &str) -> Network {
        Network::new(id, format!("net-{id}"), "bridge", GLOBAL_SCOPE)
    }

    #[test]
    fn test_key_has_root_and_trailing_separator() {
        assert_eq!(key(&["network", "abc"]), "docker/network/v1.0/network/abc/");
        assert_eq!(key::<&str>(&[]), "docker/network/v1.0/");
    }

    #[test]
    fn test_object_kind_display() {
        assert_eq!(ObjectKind::Network.to_string(), "network");
        assert_eq!(ObjectKind::Endpoint.to_string(), "endpoint");
        assert_eq!(ObjectKind::EndpointCount.to_string(), "endpoint_count");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let cfg = ScopeConfig {
            provider: "consul".to_string(),
            bucket: None,
        };
        let err = new_data_store("global", &cfg).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn test_put_get_roundtrip_tracks_index() {
        let store = new_data_store(GLOBAL_SCOPE, &ScopeConfig::memory()).unwrap();
        let mut n = network("n1");
        assert!(!n.exists());

        store.put_object_atomic(&mut n).await.unwrap();
        assert!(n.exists());
        let first = n.index();

        let mut read = Network::default();
        store.get_object(&key(&n.key()), &mut read).await.unwrap();
        assert_eq!(read.id(), "n1");
        assert_eq!(read.index(), first);
    }

    #[tokio::test]
    async fn test_put_with_stale_index_conflicts() {
        let store = new_data_store(GLOBAL_SCOPE, &ScopeConfig::memory()).unwrap();
        let mut n = network("n1");
        store.put_object_atomic(&mut n).await.unwrap();

        let mut stale = n.clone();
        store.put_object_atomic(&mut n).await.unwrap();

        let err = store.put_object_atomic(&mut stale).await.unwrap_err();
        assert!(matches!(err, StoreError::KeyModified));
    }

    #[tokio::test]
    async fn test_create_over_existing_conflicts() {
        let store = new_data_store(GLOBAL_SCOPE, &ScopeConfig::memory()).unwrap();
        let mut a = network("n1");
        let mut b = network("n1");
        store.put_object_atomic(&mut a).await.unwrap();

        let err = store.put_object_atomic(&mut b).await.unwrap_err();
        assert!(matches!(err, StoreError::KeyModified));
    }

    #[tokio::test]
    async fn test_skip_objects_are_not_persisted() {
        let store = new_data_store(GLOBAL_SCOPE, &ScopeConfig::memory()).unwrap();
        let mut n = network("n1").into_transient();
        store.put_object_atomic(&mut n).await.unwrap();

        let mut read = Network::default();
        let err = store.get_object(&key(&n.key()), &mut read).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_map_trims_separators() {
        let store = new_data_store(GLOBAL_SCOPE, &ScopeConfig::memory()).unwrap();
        let n = network("n1");
        let mut ec = EndpointCount::new(n.to_ref());
        store.put_object_atomic(&mut ec).await.unwrap();

        let map = store
            .map(&key(&[ENDPOINT_COUNT_KEY_PREFIX]), &EndpointCount::default())
            .await
            .unwrap();
        assert!(map.contains_key("docker/network/v1.0/endpoint_count/n1"));
    }

    #[tokio::test]
    async fn test_list_empty_prefix_is_not_found() {
        let store = new_data_store(LOCAL_SCOPE, &ScopeConfig::memory()).unwrap();
        let err = store
            .list(&key(&[NETWORK_KEY_PREFIX]), &Network::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_watch_delivers_decoded_updates() {
        let store = new_data_store(GLOBAL_SCOPE, &ScopeConfig::memory()).unwrap();
        let n = network("n1");
        let mut ec = EndpointCount::new(n.to_ref());
        store.put_object_atomic(&mut ec).await.unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut rx = store.watch(&ec, stop_rx).await.unwrap();

        // Current value first
        let first = rx.recv().await.unwrap();
        assert_eq!(first.count(), 0);

        ec.set_count(3);
        store.put_object_atomic(&mut ec).await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.count(), 3);
        assert_eq!(second.network().id, "n1");

        stop_tx.send(true).unwrap();
        assert!(rx.recv().await.is_none());
    }
}
