// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store registry: one [`DataStore`] per scope.
//!
//! Stores are kept in priority order. Multi-store searches visit them in
//! that order and the first store that answers wins.

use crate::config::StoreConfig;
use crate::datastore::{new_data_store, DataStore};
use crate::error::{Result, StoreError};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Holds the per-scope backend stores.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: RwLock<Vec<DataStore>>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<DataStore>> {
        self.stores.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<DataStore>> {
        self.stores.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the registry contents with one store per configured scope.
    ///
    /// Stores that were registered before are closed. If any store fails to
    /// open, the stores opened so far are closed and the registry is left
    /// empty.
    pub fn init(&self, config: &StoreConfig) -> Result<()> {
        let mut opened: Vec<DataStore> = Vec::with_capacity(config.scopes.len());

        for (scope, scope_cfg) in config.ordered_scopes() {
            match new_data_store(scope, scope_cfg) {
                Ok(store) => opened.push(store),
                Err(e) => {
                    warn!(scope, error = %e, "Failed to open data store");
                    for store in &opened {
                        store.close();
                    }
                    let replaced = std::mem::take(&mut *self.write());
                    close_replaced(&replaced);
                    return Err(e);
                }
            }
        }

        let scopes: Vec<String> = opened.iter().map(|s| s.scope().to_string()).collect();
        let replaced = std::mem::replace(&mut *self.write(), opened);
        close_replaced(&replaced);
        info!(?scopes, "Store registry initialized");
        Ok(())
    }

    /// Add a store, rejecting a second store for the same scope.
    pub fn register(&self, store: DataStore) -> Result<()> {
        let mut stores = self.write();
        if stores.iter().any(|s| s.scope() == store.scope()) {
            return Err(StoreError::DuplicateScope(store.scope().to_string()));
        }
        debug!(scope = %store.scope(), "Registered data store");
        stores.push(store);
        Ok(())
    }

    /// Store for `scope`, if one is registered.
    pub fn get(&self, scope: &str) -> Option<DataStore> {
        self.read().iter().find(|s| s.scope() == scope).cloned()
    }

    /// Every registered store, in priority order.
    pub fn all(&self) -> Vec<DataStore> {
        self.read().clone()
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no stores are registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Close every store.
    pub fn close_all(&self) {
        for store in self.all() {
            debug!(scope = %store.scope(), "Closing data store");
            store.close();
        }
    }
}

fn close_replaced(stores: &[DataStore]) {
    for store in stores {
        debug!(scope = %store.scope(), "Closing replaced data store");
        store.close();
    }
}
