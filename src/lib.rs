//! # Network Store
//!
//! Keeps container network state consistent across nodes that share a
//! key-value backend, and turns remote endpoint membership into local
//! service records.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────────────┐
//! │                           NetworkController                                │
//! │                                                                            │
//! │  join/leave ──► ┌────────────┐   first join   ┌──────────────────────────┐ │
//! │                 │ Dispatcher │───────────────►│ Reconciler (per network) │ │
//! │                 │ (1 task)   │                │ watch count → re-list →  │ │
//! │                 └─────┬──────┘                │ diff → svc records       │ │
//! │                       │                       └────────────┬─────────────┘ │
//! │                       ▼                                    ▼               │
//! │              ┌────────────────┐                 ┌──────────────────┐       │
//! │              │ ServiceRecords │◄────────────────│  StoreRegistry   │       │
//! │              └────────────────┘                 │ local/global/... │       │
//! │                                                 └──────────────────┘       │
//! └────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Store Sync
//!
//! Every persisted object carries a version index. Writes are
//! compare-and-swap; deletes refresh and retry with backoff a bounded
//! number of times.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use network_store::{NetworkController, StoreConfig};
//! use network_store::model::{Endpoint, Network};
//!
//! #[tokio::main]
//! async fn main() {
//!     let ctrl = NetworkController::new(StoreConfig::default());
//!     ctrl.init_stores().await.expect("Failed to open stores");
//!
//!     let network = Network::new("n1", "front", "overlay", "global");
//!     let endpoint = Endpoint::new("e1", "web", &network);
//!     ctrl.watch_svc_record(&network, &endpoint).await.expect("dispatcher running");
//!
//!     ctrl.shutdown().await;
//! }
//! ```

pub mod config;
pub mod controller;
pub mod datastore;
pub mod error;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod resilience;
pub mod svc_record;

// Re-exports for convenience
pub use config::{ControllerSettings, DeleteRetryConfig, ScopeConfig, StoreConfig};
pub use controller::{diff_remote_endpoints, EndpointDiff, NetworkController, NetworkLifecycle};
pub use datastore::{DataStore, KvBackend, KvObject, KvPair, MemoryBackend};
pub use error::{Result, StoreError};
pub use registry::StoreRegistry;
pub use svc_record::{NoOpServiceRecords, ServiceRecordTable, ServiceRecords};
