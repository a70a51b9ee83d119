//! Provider contract implemented by every inventory source.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Cluster, Datacenter, Vm};

/// Errors raised by provider adapters.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Could not reach the provider.
    #[error("transport: {0}")]
    Transport(String),

    /// Provider rejected the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider answered with a non-success status.
    #[error("api returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Provider answered with something we could not interpret.
    #[error("decode: {0}")]
    Decode(String),
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// A source of VM topology (hypervisor manager, cluster manager, or another
/// registry).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name of the provider, used as the durable `vmprovider` tag.
    fn name(&self) -> &str;

    /// List all datacenters managed by this provider.
    async fn list_datacenters(&self) -> Result<Vec<Datacenter>>;

    /// List the clusters of a datacenter.
    async fn list_clusters(&self, datacenter_id: &str) -> Result<Vec<Cluster>>;

    /// List the VMs of a cluster with their NICs and addresses resolved.
    async fn list_cluster_vms(&self, cluster_id: &str) -> Result<Vec<Vm>>;
}
