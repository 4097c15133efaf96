//! Shared test utilities for integration tests.
//!
//! This module provides:
//! - A recording ServiceRecords for asserting hook calls
//! - A scripted backend that conflicts on delete a set number of times
//! - Controller and polling helpers

pub mod mock_records;
pub mod scripted_backend;

pub use mock_records::*;
pub use scripted_backend::*;

use network_store::{NetworkController, ScopeConfig, StoreConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Config where `global` is the shared in-memory bucket `bucket`.
///
/// Bucket names must be unique per test: buckets are process-wide.
pub fn shared_config(bucket: &str) -> StoreConfig {
    StoreConfig::for_testing().with_scope("global", ScopeConfig::shared_memory(bucket))
}

/// A started controller on `config` recording its service-record calls.
pub async fn recording_controller(config: StoreConfig) -> NetworkController<RecordingServiceRecords> {
    let ctrl = NetworkController::with_service_records(config, Arc::new(RecordingServiceRecords::new()));
    ctrl.init_stores().await.expect("Failed to init stores");
    ctrl
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
