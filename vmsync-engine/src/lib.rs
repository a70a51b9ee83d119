//! vmsync reconciliation engine.
//!
//! Reads datacenters, clusters, VMs and NICs from a [`Provider`] and applies
//! the creates, updates and retirements needed for a [`Registry`] to match.

pub mod error;
pub mod model;
pub mod provider;
pub mod reconciler;
pub mod registry;
pub mod sync;

pub use error::{Result, SyncError};
pub use model::{Cluster, Datacenter, Nic, Vm, VmStatus};
pub use provider::{Provider, ProviderError};
pub use registry::{MemoryRegistry, Registry, RegistryError};
pub use sync::{DEFAULT_GRACE_PERIOD_DAYS, SyncConfig, SyncReport, SyncService, VmOutcome};
