// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the network store.
//!
//! Errors fall into two groups: conditions that are a normal part of running
//! against a shared key-value backend (missing keys, version conflicts) and
//! conditions that abort the operation that hit them.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `KeyNotFound` | No | Benign: "no data here", multi-store searches move on |
//! | `KeyModified` | Yes | Optimistic-concurrency conflict, re-read and retry |
//! | `Backend` | Yes | Transport or backend failure for one store |
//! | `StoreNotInitialized` | No | The object's scope has no registered store |
//! | `EndpointNotFound` | No | Every store was searched without success |
//! | `NoSuchNetwork` | No | Network id not present in any store |
//! | `RetriesExhausted` | No | Delete kept conflicting past the retry budget |
//! | `DuplicateScope` | No | A second store was registered for a scope |
//! | `WatchUnsupported` | No | The store cannot deliver change notifications |
//! | `Serialization` | No | Stored value could not be encoded/decoded |
//! | `Config` | No | Configuration invalid |
//! | `DispatcherNotRunning` | No | Watch events sent before `init_stores()` |
//! | `Shutdown` | No | Controller is shutting down |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Use [`StoreError::is_retryable()`] to decide whether an operation should
//! be retried and [`StoreError::is_not_found()`] to detect the benign
//! "nothing stored under this key" outcome.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while talking to the scoped stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No value stored under the requested key (or prefix).
    #[error("key not found in store")]
    KeyNotFound,

    /// The stored version no longer matches the version the writer last read.
    ///
    /// Expected under concurrent writers on different nodes.
    #[error("key has been modified")]
    KeyModified,

    /// The object's declared scope has no registered store.
    #[error("datastore for scope {scope:?} is not initialized")]
    StoreNotInitialized { scope: String },

    /// An endpoint lookup exhausted every store.
    ///
    /// `errors` holds the per-store failures other than "not found".
    #[error("could not find endpoint {id}: {errors:?}")]
    EndpointNotFound { id: String, errors: Vec<String> },

    /// Network id not present in any store.
    #[error("network {0} not found")]
    NoSuchNetwork(String),

    /// Atomic delete kept hitting version conflicts.
    #[error("gave up deleting {key} after {attempts} conflicting attempts")]
    RetriesExhausted { key: String, attempts: usize },

    /// A store is already registered for this scope.
    #[error("a store is already registered for scope {0:?}")]
    DuplicateScope(String),

    /// The store for this scope does not deliver change notifications.
    #[error("store for scope {0:?} does not support watch")]
    WatchUnsupported(String),

    /// Backend or transport failure other than not-found or conflict.
    #[error("backend error ({scope}): {message}")]
    Backend { scope: String, message: String },

    /// Stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Join/leave events were submitted before the dispatcher was started.
    #[error("watch dispatcher is not running")]
    DispatcherNotRunning,

    /// Shutdown in progress.
    #[error("shutdown in progress")]
    Shutdown,

    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Create a backend error for a scope.
    pub fn backend(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            scope: scope.into(),
            message: message.into(),
        }
    }

    /// Create a store-not-initialized error for a scope.
    pub fn not_initialized(scope: impl Into<String>) -> Self {
        Self::StoreNotInitialized {
            scope: scope.into(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::KeyModified => true,
            Self::Backend { .. } => true,
            Self::KeyNotFound => false,
            Self::StoreNotInitialized { .. } => false,
            Self::EndpointNotFound { .. } => false,
            Self::NoSuchNetwork(_) => false,
            Self::RetriesExhausted { .. } => false,
            Self::DuplicateScope(_) => false,
            Self::WatchUnsupported(_) => false,
            Self::Serialization(_) => false,
            Self::Config(_) => false,
            Self::DispatcherNotRunning => false,
            Self::Shutdown => false,
            Self::Internal(_) => false,
        }
    }

    /// Check if this error only means "nothing stored here".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound)
    }
}
