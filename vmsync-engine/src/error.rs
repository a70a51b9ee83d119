//! Sync error types.

use thiserror::Error;

use crate::provider::ProviderError;
use crate::registry::RegistryError;

/// Errors raised by the reconciliation engine.
///
/// The `List*`, `ClusterGroup`, `Cluster` and `Schema` variants are fatal to
/// a sync run. `Ambiguous` and `Registry` are scoped to a single VM.
#[derive(Debug, Error)]
pub enum SyncError {
    /// More than one registry record claims to be the same VM.
    #[error("ambiguous match in cluster {cluster}: {count} registry VMs for {key}")]
    Ambiguous {
        cluster: String,
        key: String,
        count: usize,
    },

    /// A registry call failed.
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),

    /// Required custom fields or the cluster type could not be ensured.
    #[error("schema bootstrap failed: {0}")]
    Schema(#[source] RegistryError),

    #[error("failed to list datacenters: {0}")]
    ListDatacenters(#[source] ProviderError),

    #[error("failed to list clusters of datacenter {datacenter}: {source}")]
    ListClusters {
        datacenter: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to list VMs of cluster {cluster}: {source}")]
    ListVms {
        cluster: String,
        #[source]
        source: ProviderError,
    },

    #[error("failed to ensure cluster group for datacenter {datacenter}: {source}")]
    ClusterGroup {
        datacenter: String,
        #[source]
        source: RegistryError,
    },

    #[error("failed to ensure cluster {cluster}: {source}")]
    Cluster {
        cluster: String,
        #[source]
        source: RegistryError,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;
