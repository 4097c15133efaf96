// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process versioned key-value backend.
//!
//! Every successful write bumps a per-bucket counter and stamps the key with
//! the new value, which gives the same optimistic-concurrency behaviour as a
//! networked store. Watches are fed from a broadcast of every change.
//!
//! Buckets opened with [`MemoryBackend::shared`] under the same name share
//! their keys, so several controllers in one process can act as nodes of the
//! same cluster.

use super::{BoxFuture, KvBackend, KvPair};
use crate::error::StoreError;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::trace;

/// Capacity of the change broadcast. Lagging watchers resynchronize by
/// re-reading the key.
const CHANGE_BUFFER: usize = 256;

#[derive(Default)]
struct Entries {
    items: BTreeMap<String, (Vec<u8>, u64)>,
    last_index: u64,
}

struct Bucket {
    entries: Mutex<Entries>,
    changes: broadcast::Sender<String>,
}

impl Bucket {
    fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            entries: Mutex::new(Entries::default()),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self, key: &str) -> Option<KvPair> {
        self.lock().items.get(key).map(|(value, index)| KvPair {
            key: key.to_string(),
            value: value.clone(),
            last_index: *index,
        })
    }
}

fn shared_buckets() -> &'static Mutex<HashMap<String, Arc<Bucket>>> {
    static BUCKETS: OnceLock<Mutex<HashMap<String, Arc<Bucket>>>> = OnceLock::new();
    BUCKETS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// In-memory [`KvBackend`].
///
/// Each handle has its own close signal: closing one handle ends that
/// handle's watches without affecting other handles on the same bucket.
pub struct MemoryBackend {
    bucket: Arc<Bucket>,
    closed_tx: watch::Sender<bool>,
}

impl MemoryBackend {
    /// A private, empty backend.
    pub fn new() -> Self {
        Self::with_bucket(Arc::new(Bucket::new()))
    }

    /// A handle onto the process-wide bucket called `name`.
    pub fn shared(name: &str) -> Self {
        let bucket = {
            let mut buckets = shared_buckets()
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                buckets
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(Bucket::new())),
            )
        };
        Self::with_bucket(bucket)
    }

    /// Another handle onto this handle's bucket.
    pub fn handle(&self) -> Self {
        Self::with_bucket(Arc::clone(&self.bucket))
    }

    fn with_bucket(bucket: Arc<Bucket>) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self { bucket, closed_tx }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.bucket.lock().items.len()
    }

    /// Whether the bucket holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this handle has been closed.
    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::backend("memory", "store is closed"));
        }
        Ok(())
    }

    fn put_now(&self, key: &str, value: Vec<u8>, previous: Option<u64>) -> Result<u64, StoreError> {
        self.check_open()?;
        let index = {
            let mut entries = self.bucket.lock();
            match (entries.items.get(key), previous) {
                (Some(_), None) => return Err(StoreError::KeyModified),
                (None, Some(_)) => return Err(StoreError::KeyNotFound),
                (Some((_, current)), Some(prev)) if *current != prev => {
                    return Err(StoreError::KeyModified)
                }
                _ => {}
            }
            entries.last_index += 1;
            let index = entries.last_index;
            entries.items.insert(key.to_string(), (value, index));
            index
        };
        trace!(key, index, "memory put");
        let _ = self.bucket.changes.send(key.to_string());
        Ok(index)
    }

    fn delete_now(&self, key: &str, previous: u64) -> Result<(), StoreError> {
        self.check_open()?;
        {
            let mut entries = self.bucket.lock();
            match entries.items.get(key) {
                None => return Err(StoreError::KeyNotFound),
                Some((_, current)) if *current != previous => return Err(StoreError::KeyModified),
                Some(_) => {}
            }
            entries.items.remove(key);
        }
        trace!(key, previous, "memory delete");
        let _ = self.bucket.changes.send(key.to_string());
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> BoxFuture<'_, KvPair> {
        let key = key.to_string();
        Box::pin(async move {
            self.check_open()?;
            self.bucket.read(&key).ok_or(StoreError::KeyNotFound)
        })
    }

    fn atomic_put(&self, key: &str, value: Vec<u8>, previous: Option<u64>) -> BoxFuture<'_, u64> {
        let key = key.to_string();
        Box::pin(async move { self.put_now(&key, value, previous) })
    }

    fn atomic_delete(&self, key: &str, previous: u64) -> BoxFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move { self.delete_now(&key, previous) })
    }

    fn list(&self, prefix: &str) -> BoxFuture<'_, Vec<KvPair>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            self.check_open()?;
            let entries = self.bucket.lock();
            let pairs: Vec<KvPair> = entries
                .items
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, (value, index))| KvPair {
                    key: k.clone(),
                    value: value.clone(),
                    last_index: *index,
                })
                .collect();
            if pairs.is_empty() {
                return Err(StoreError::KeyNotFound);
            }
            Ok(pairs)
        })
    }

    fn watch(&self, key: &str, mut stop: watch::Receiver<bool>) -> BoxFuture<'_, mpsc::Receiver<KvPair>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check_open()?;
            let bucket = Arc::clone(&self.bucket);
            let mut changes = bucket.changes.subscribe();
            let mut closed = self.closed_tx.subscribe();
            let (tx, rx) = mpsc::channel(1);

            tokio::spawn(async move {
                // Current value first
                let mut last_sent = None;
                if let Some(pair) = bucket.read(&key) {
                    last_sent = Some(pair.last_index);
                    if tx.send(pair).await.is_err() {
                        return;
                    }
                }

                loop {
                    if *stop.borrow() || *closed.borrow() {
                        break;
                    }
                    tokio::select! {
                        _ = stop.changed() => {
                            // Sender dropped counts as stop
                            if stop.has_changed().is_err() || *stop.borrow() {
                                break;
                            }
                        }
                        _ = closed.changed() => break,
                        changed = changes.recv() => {
                            let relevant = match changed {
                                Ok(changed_key) => changed_key == key,
                                Err(broadcast::error::RecvError::Lagged(_)) => true,
                                Err(broadcast::error::RecvError::Closed) => break,
                            };
                            if !relevant {
                                continue;
                            }
                            let Some(pair) = bucket.read(&key) else {
                                continue;
                            };
                            if last_sent == Some(pair.last_index) {
                                continue;
                            }
                            last_sent = Some(pair.last_index);
                            if tx.send(pair).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                trace!(key = %key, "memory watch ended");
            });

            Ok(rx)
        })
    }

    fn close(&self) {
        // No receiver may be alive yet; send_replace stores the flag anyway.
        self.closed_tx.send_replace(true);
    }
}
