// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Versioned object writes and deletes.
//!
//! Writes surface version conflicts to the caller. Deletes refresh the
//! object and retry with exponential backoff, giving up with
//! [`StoreError::RetriesExhausted`] after the configured number of attempts.

use super::NetworkController;
use crate::datastore::{key, DataStore, KvObject};
use crate::error::{Result, StoreError};
use crate::metrics;
use crate::model::EndpointCount;
use crate::svc_record::ServiceRecords;
use tracing::{debug, warn};

impl<R: ServiceRecords> NetworkController<R> {
    fn store_for<T: KvObject + ?Sized>(&self, obj: &T) -> Result<DataStore> {
        let scope = obj.data_scope();
        self.store(scope)
            .ok_or_else(|| StoreError::not_initialized(scope))
    }

    /// Versioned write of `obj` into the store for its scope.
    ///
    /// Returns [`StoreError::KeyModified`] unchanged so callers can refresh
    /// and retry.
    pub async fn update_to_store<T: KvObject + ?Sized>(&self, obj: &mut T) -> Result<()> {
        let store = self.store_for(obj)?;

        match store.put_object_atomic(obj).await {
            Ok(()) => {
                metrics::record_store_operation(store.scope(), "put", true);
                Ok(())
            }
            Err(StoreError::KeyModified) => {
                metrics::record_store_operation(store.scope(), "put", false);
                Err(StoreError::KeyModified)
            }
            Err(e) => {
                metrics::record_store_operation(store.scope(), "put", false);
                warn!(
                    scope = %store.scope(),
                    kind = %obj.kind(),
                    error = %e,
                    "Failed to update store"
                );
                Err(e)
            }
        }
    }

    /// Versioned delete of `obj`, refreshing and retrying on conflict.
    pub async fn delete_from_store<T: KvObject + ?Sized>(&self, obj: &mut T) -> Result<()> {
        let store = self.store_for(obj)?;
        let retry = self.inner.config.controller.delete_retry.retry_config();
        let obj_key = key(&obj.key());
        let mut conflicts = 0usize;

        loop {
            match store.delete_object_atomic(obj).await {
                Ok(()) => {
                    metrics::record_store_operation(store.scope(), "delete", true);
                    return Ok(());
                }
                Err(StoreError::KeyModified) => {
                    conflicts += 1;
                    metrics::record_delete_conflict(store.scope());

                    if !retry.should_retry(conflicts) {
                        metrics::record_delete_retries_exhausted(store.scope());
                        metrics::record_store_operation(store.scope(), "delete", false);
                        warn!(key = %obj_key, attempts = conflicts, "Giving up delete after repeated conflicts");
                        return Err(StoreError::RetriesExhausted {
                            key: obj_key,
                            attempts: conflicts,
                        });
                    }

                    if let Err(e) = store.get_object(&obj_key, obj).await {
                        debug!(key = %obj_key, error = %e, "Could not refresh object before delete retry");
                        metrics::record_store_operation(store.scope(), "delete", false);
                        return Err(e);
                    }

                    let delay = retry.delay_for_attempt(conflicts);
                    debug!(key = %obj_key, attempt = conflicts, ?delay, "Delete conflicted, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    metrics::record_store_operation(store.scope(), "delete", false);
                    return Err(e);
                }
            }
        }
    }

    /// Bump the network's endpoint count, creating it if absent.
    ///
    /// Returns the stored count.
    pub async fn increment_endpoint_count(&self, ec: &mut EndpointCount) -> Result<u64> {
        self.adjust_endpoint_count(ec, true).await
    }

    /// Lower the network's endpoint count, never below zero.
    pub async fn decrement_endpoint_count(&self, ec: &mut EndpointCount) -> Result<u64> {
        self.adjust_endpoint_count(ec, false).await
    }

    async fn adjust_endpoint_count(&self, ec: &mut EndpointCount, increment: bool) -> Result<u64> {
        let store = self.store_for(ec)?;
        let retry = self.inner.config.controller.delete_retry.retry_config();
        let ec_key = key(&ec.key());
        let mut conflicts = 0usize;

        loop {
            let count = if increment {
                ec.count() + 1
            } else {
                ec.count().saturating_sub(1)
            };
            ec.set_count(count);

            match self.update_to_store(ec).await {
                Ok(()) => return Ok(count),
                Err(StoreError::KeyModified) => {
                    conflicts += 1;
                    if !retry.should_retry(conflicts) {
                        return Err(StoreError::RetriesExhausted {
                            key: ec_key,
                            attempts: conflicts,
                        });
                    }
                    // Someone else moved the count; start over from theirs
                    store.get_object(&ec_key, ec).await?;
                    tokio::time::sleep(retry.delay_for_attempt(conflicts)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
