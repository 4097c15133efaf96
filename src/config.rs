// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the network store.
//!
//! Configuration is consumed once by
//! [`NetworkController::init_stores()`](crate::NetworkController::init_stores)
//! and can be constructed programmatically or deserialized from YAML/JSON.
//!
//! # Configuration Structure
//!
//! ```text
//! StoreConfig
//! ├── scopes: {scope -> ScopeConfig}   # One backend store per scope
//! │   ├── provider: String             # "memory" (alias "inmem")
//! │   └── bucket: Option<String>       # Shared namespace name
//! └── controller: ControllerSettings
//!     ├── distributed_control: bool
//!     ├── multihost_drivers: [String]
//!     ├── special_drivers: [String]
//!     └── delete_retry: DeleteRetryConfig
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! scopes:
//!   local:
//!     provider: memory
//!   global:
//!     provider: memory
//!     bucket: "cluster-a"
//!
//! controller:
//!   distributed_control: false
//!   delete_retry:
//!     max_attempts: 16
//!     initial_delay: "10ms"
//!     max_delay: "1s"
//! ```
//!
//! An empty `scopes` map is legal: the registry stays empty and every scope
//! lookup returns `None`.

use crate::datastore::LOCAL_SCOPE;
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// The top-level config object passed to `NetworkController::new()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend store configuration per scope name.
    #[serde(default)]
    pub scopes: HashMap<String, ScopeConfig>,

    /// Watch/policy settings for the controller.
    #[serde(default)]
    pub controller: ControllerSettings,
}

impl StoreConfig {
    /// Create a config with private in-memory `local` and `global` scopes.
    pub fn for_testing() -> Self {
        let mut scopes = HashMap::new();
        scopes.insert(LOCAL_SCOPE.to_string(), ScopeConfig::memory());
        scopes.insert(
            crate::datastore::GLOBAL_SCOPE.to_string(),
            ScopeConfig::memory(),
        );
        Self {
            scopes,
            controller: ControllerSettings {
                delete_retry: DeleteRetryConfig::testing(),
                ..Default::default()
            },
        }
    }

    /// Add (or replace) a scope.
    pub fn with_scope(mut self, scope: impl Into<String>, cfg: ScopeConfig) -> Self {
        self.scopes.insert(scope.into(), cfg);
        self
    }

    /// Scopes in store priority order: `local` first, then by name.
    ///
    /// Lookups that search every store (endpoint by id, listings) visit
    /// stores in this order.
    pub fn ordered_scopes(&self) -> Vec<(&str, &ScopeConfig)> {
        let mut scopes: Vec<(&str, &ScopeConfig)> = self
            .scopes
            .iter()
            .map(|(scope, cfg)| (scope.as_str(), cfg))
            .collect();
        scopes.sort_by(|(a, _), (b, _)| {
            (*a != LOCAL_SCOPE, *a).cmp(&(*b != LOCAL_SCOPE, *b))
        });
        scopes
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ScopeConfig: one backend store
// ═══════════════════════════════════════════════════════════════════════════════

/// Backend configuration for a single scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Backend provider name.
    pub provider: String,

    /// Named namespace inside the provider.
    ///
    /// Stores opened with the same provider and bucket see the same keys,
    /// which is how several controllers in one process share a backend.
    /// `None` gives the store a private namespace.
    #[serde(default)]
    pub bucket: Option<String>,
}

impl ScopeConfig {
    /// A private in-memory store.
    pub fn memory() -> Self {
        Self {
            provider: "memory".to_string(),
            bucket: None,
        }
    }

    /// An in-memory store shared by every scope opened on `bucket`.
    pub fn shared_memory(bucket: impl Into<String>) -> Self {
        Self {
            provider: "memory".to_string(),
            bucket: Some(bucket.into()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ControllerSettings
// ═══════════════════════════════════════════════════════════════════════════════

/// Policy settings for the watch coordinator and maintenance walkers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Whether this node is the distributed-control authority.
    ///
    /// When `false`, join/leave events for swarm-scoped networks on
    /// multi-host drivers are ignored.
    #[serde(default)]
    pub distributed_control: bool,

    /// Drivers whose networks span hosts.
    #[serde(default = "default_multihost_drivers")]
    pub multihost_drivers: Vec<String>,

    /// Drivers whose networks are re-populated into the working set at startup.
    #[serde(default = "default_special_drivers")]
    pub special_drivers: Vec<String>,

    /// Retry budget for atomic deletes that hit version conflicts.
    #[serde(default)]
    pub delete_retry: DeleteRetryConfig,
}

fn default_multihost_drivers() -> Vec<String> {
    vec!["overlay".to_string()]
}

fn default_special_drivers() -> Vec<String> {
    vec!["host".to_string(), "null".to_string()]
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            distributed_control: false,
            multihost_drivers: default_multihost_drivers(),
            special_drivers: default_special_drivers(),
            delete_retry: DeleteRetryConfig::default(),
        }
    }
}

impl ControllerSettings {
    /// Check if a driver spans hosts.
    pub fn is_multihost_driver(&self, driver: &str) -> bool {
        self.multihost_drivers.iter().any(|d| d == driver)
    }

    /// Check if a driver is in the special set.
    pub fn is_special_driver(&self, driver: &str) -> bool {
        self.special_drivers.iter().any(|d| d == driver)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DeleteRetryConfig
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded retry for delete-on-conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRetryConfig {
    /// Maximum conflicting attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first retry (humantime, e.g. "10ms").
    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,

    /// Ceiling for the exponential backoff (humantime).
    #[serde(default = "default_max_delay")]
    pub max_delay: String,
}

fn default_max_attempts() -> usize {
    16
}

fn default_initial_delay() -> String {
    "10ms".to_string()
}

fn default_max_delay() -> String {
    "1s".to_string()
}

impl Default for DeleteRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
        }
    }
}

impl DeleteRetryConfig {
    /// Near-zero delays so tests don't sleep.
    pub fn testing() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: "1ms".to_string(),
            max_delay: "5ms".to_string(),
        }
    }

    /// Parse the initial delay, falling back to 10ms.
    pub fn initial_delay_duration(&self) -> Duration {
        humantime::parse_duration(&self.initial_delay).unwrap_or(Duration::from_millis(10))
    }

    /// Parse the max delay, falling back to 1s.
    pub fn max_delay_duration(&self) -> Duration {
        humantime::parse_duration(&self.max_delay).unwrap_or(Duration::from_secs(1))
    }

    /// Backoff schedule for the delete loop.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_delay: self.initial_delay_duration(),
            max_delay: self.max_delay_duration(),
            backoff_factor: 2.0,
        }
    }
}
