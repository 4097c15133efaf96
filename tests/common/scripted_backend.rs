//! Scripted KvBackend for exercising conflict handling.
//!
//! Every delete conflicts until the configured number of conflicts is used
//! up. Every get reports a higher index than the last, as if another writer
//! kept touching the key.

use network_store::datastore::BoxFuture;
use network_store::{KvBackend, KvPair, StoreError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

pub struct ConflictingBackend {
    value: Vec<u8>,
    conflicts_left: AtomicUsize,
    index: AtomicU64,
    delete_indexes: Mutex<Vec<u64>>,
    gets: AtomicUsize,
    last_read: AtomicU64,
}

#[allow(dead_code)]
impl ConflictingBackend {
    /// `value` is returned by every get; `conflicts` deletes fail first.
    pub fn new(value: Vec<u8>, conflicts: usize) -> Self {
        Self {
            value,
            conflicts_left: AtomicUsize::new(conflicts),
            index: AtomicU64::new(1),
            delete_indexes: Mutex::new(Vec::new()),
            gets: AtomicUsize::new(0),
            last_read: AtomicU64::new(0),
        }
    }

    /// Index passed to each delete attempt, in order.
    pub fn delete_indexes(&self) -> Vec<u64> {
        self.delete_indexes.lock().unwrap().clone()
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Index handed out by the most recent get.
    pub fn last_read_index(&self) -> u64 {
        self.last_read.load(Ordering::SeqCst)
    }
}

impl KvBackend for ConflictingBackend {
    fn get(&self, key: &str) -> BoxFuture<'_, KvPair> {
        let key = key.to_string();
        Box::pin(async move {
            self.gets.fetch_add(1, Ordering::SeqCst);
            let last_index = self.index.fetch_add(1, Ordering::SeqCst) + 1;
            self.last_read.store(last_index, Ordering::SeqCst);
            Ok(KvPair {
                key,
                value: self.value.clone(),
                last_index,
            })
        })
    }

    fn atomic_put(&self, _key: &str, _value: Vec<u8>, _previous: Option<u64>) -> BoxFuture<'_, u64> {
        Box::pin(async move { Ok(self.index.fetch_add(1, Ordering::SeqCst) + 1) })
    }

    fn atomic_delete(&self, _key: &str, previous: u64) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.delete_indexes.lock().unwrap().push(previous);
            let conflicted = self
                .conflicts_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if conflicted {
                Err(StoreError::KeyModified)
            } else {
                Ok(())
            }
        })
    }

    fn list(&self, _prefix: &str) -> BoxFuture<'_, Vec<KvPair>> {
        Box::pin(async move { Err(StoreError::KeyNotFound) })
    }

    fn watch(&self, key: &str, _stop: watch::Receiver<bool>) -> BoxFuture<'_, mpsc::Receiver<KvPair>> {
        let key = key.to_string();
        Box::pin(async move { Err(StoreError::WatchUnsupported(key)) })
    }

    fn supports_watch(&self) -> bool {
        false
    }
}
