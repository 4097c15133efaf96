// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Store writes/deletes and version conflicts
//! - Join/leave events seen by the watch dispatcher
//! - Reconciler passes and the service-record changes they produce
//! - Maintenance walkers
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `netstore_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a store write or delete.
pub fn record_store_operation(scope: &str, operation: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "netstore_store_operations_total",
        "scope" => scope.to_string(),
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a version conflict seen while deleting.
pub fn record_delete_conflict(scope: &str) {
    counter!("netstore_delete_conflicts_total", "scope" => scope.to_string()).increment(1);
}

/// Record a delete that gave up after too many conflicts.
pub fn record_delete_retries_exhausted(scope: &str) {
    counter!("netstore_delete_retries_exhausted_total", "scope" => scope.to_string()).increment(1);
}

/// Record a join/leave event handled by the dispatcher.
///
/// `outcome` is `applied` or `ignored` (policy gate).
pub fn record_watch_event(event: &str, outcome: &str) {
    counter!(
        "netstore_watch_events_total",
        "event" => event.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Set the number of networks with an active watch.
pub fn set_watched_networks(count: usize) {
    gauge!("netstore_watched_networks").set(count as f64);
}

/// Record an attempt to establish a backend watch.
pub fn record_watch_start(scope: &str, outcome: &str) {
    counter!(
        "netstore_watch_starts_total",
        "scope" => scope.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record one reconciler pass.
pub fn record_reconcile(adds: usize, deletes: usize, duration: Duration) {
    counter!("netstore_reconcile_passes_total").increment(1);
    counter!("netstore_reconcile_adds_total").increment(adds as u64);
    counter!("netstore_reconcile_deletes_total").increment(deletes as u64);
    histogram!("netstore_reconcile_duration_seconds").record(duration.as_secs_f64());
}

/// Record a reconciler pass that was abandoned.
pub fn record_reconcile_skipped(reason: &str) {
    counter!("netstore_reconcile_skipped_total", "reason" => reason.to_string()).increment(1);
}

/// Record a listing that dropped a network with no endpoint count.
pub fn record_inconsistent_network(scope: &str) {
    counter!("netstore_inconsistent_networks_total", "scope" => scope.to_string()).increment(1);
}

/// Record a stale (half-deleted) network cleanup.
pub fn record_stale_network_cleanup(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("netstore_stale_network_cleanups_total", "status" => status).increment(1);
}

/// Record a special network re-populated into the working set.
pub fn record_special_network_populated(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("netstore_special_networks_populated_total", "status" => status).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // The metrics crate uses global state. Without a recorder installed these
    // calls are no-ops; we only check they don't panic on edge inputs.

    #[test]
    fn test_record_store_operation() {
        record_store_operation("global", "put", true);
        record_store_operation("local", "delete", false);
        record_store_operation("", "", true);
    }

    #[test]
    fn test_record_delete_counters() {
        record_delete_conflict("global");
        record_delete_retries_exhausted("global");
    }

    #[test]
    fn test_record_watch_metrics() {
        record_watch_event("join", "applied");
        record_watch_event("leave", "ignored");
        record_watch_start("global", "started");
        set_watched_networks(0);
        set_watched_networks(usize::MAX);
    }

    #[test]
    fn test_record_reconcile() {
        record_reconcile(0, 0, Duration::ZERO);
        record_reconcile(3, 1, Duration::from_millis(12));
        record_reconcile_skipped("list_failed");
    }

    #[test]
    fn test_record_maintenance() {
        record_inconsistent_network("global");
        record_stale_network_cleanup(true);
        record_stale_network_cleanup(false);
        record_special_network_populated(true);
    }
}
