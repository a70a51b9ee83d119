//! Pruner - retires registry VMs that disappeared from the provider.
//!
//! `active`/`offline` records missing from the provider snapshot move to
//! `decommissioning`. Once a record has been decommissioning for longer than
//! the grace period (measured from the registry's `last_updated`) it is
//! deleted. A VM that reappears before deletion is left to the updater.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::model::{Vm, VmStatus};
use crate::registry::{
    Registry, RegistryCluster, RegistryError, RegistryVm, VMPROVIDER_FIELD, VmFilter, VmUpdate,
};

/// What to do with one registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneDecision {
    /// No `vmid`, or tagged by another provider.
    Unmanaged,
    /// Still reported by the provider.
    Present,
    Decommission,
    Delete,
    /// Decommissioning, grace period not yet over.
    Waiting,
    /// Decommissioning without a `last_updated` timestamp.
    MissingTimestamp,
    /// Registry-only status (`planned`, `staged`, `failed`) or one outside
    /// `VmStatus`.
    Ignored,
}

/// Decide the prune transition for a record.
pub fn decide(
    record: &RegistryVm,
    provider: &str,
    present: &HashSet<&str>,
    now: DateTime<Utc>,
    grace: Duration,
) -> PruneDecision {
    let Some(vmid) = record.vmid() else {
        return PruneDecision::Unmanaged;
    };
    if record.vmprovider().as_deref() != Some(provider) {
        return PruneDecision::Unmanaged;
    }
    if present.contains(vmid.as_str()) {
        return PruneDecision::Present;
    }

    match record.status {
        Some(VmStatus::Active | VmStatus::Offline) => PruneDecision::Decommission,
        Some(VmStatus::Decommissioning) => match record.last_updated {
            Some(since) if now - since > grace => PruneDecision::Delete,
            Some(_) => PruneDecision::Waiting,
            None => PruneDecision::MissingTimestamp,
        },
        Some(VmStatus::Planned | VmStatus::Staged | VmStatus::Failed) | None => {
            PruneDecision::Ignored
        }
    }
}

/// Transitions applied during one prune pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PruneSummary {
    pub decommissioned: usize,
    pub deleted: usize,
    pub failed: usize,
}

pub struct Pruner {
    registry: Arc<dyn Registry>,
    provider: String,
    grace: Duration,
}

impl Pruner {
    pub fn new(registry: Arc<dyn Registry>, provider: impl Into<String>, grace: Duration) -> Self {
        Self {
            registry,
            provider: provider.into(),
            grace,
        }
    }

    /// Prune the provider's records in `cluster` against the full provider
    /// snapshot of that cluster.
    ///
    /// Only the search is fatal to the pass; per-record failures are logged
    /// and counted.
    pub async fn prune(
        &self,
        cluster: &RegistryCluster,
        snapshot: &[Vm],
        now: DateTime<Utc>,
    ) -> Result<PruneSummary, RegistryError> {
        let filter = VmFilter::new()
            .in_cluster(cluster.id)
            .custom_field(VMPROVIDER_FIELD, &self.provider);
        let records = self.registry.search_vms(&filter).await?;
        let present: HashSet<&str> = snapshot.iter().map(|vm| vm.id.as_str()).collect();

        let mut summary = PruneSummary::default();
        for record in &records {
            match decide(record, &self.provider, &present, now, self.grace) {
                PruneDecision::Decommission => {
                    let mut update = VmUpdate::new(&record.name);
                    update.status = Some(VmStatus::Decommissioning);
                    match self.registry.update_vm(record.id, &update).await {
                        Ok(()) => {
                            info!(cluster = %cluster.name, vm = %record.name, "Decommissioning VM");
                            summary.decommissioned += 1;
                        }
                        Err(e) => {
                            error!(cluster = %cluster.name, vm = %record.name, error = %e, "Failed to decommission VM");
                            summary.failed += 1;
                        }
                    }
                }
                PruneDecision::Delete => match self.registry.delete_vm(record.id).await {
                    Ok(()) => {
                        info!(cluster = %cluster.name, vm = %record.name, "Deleted VM after grace period");
                        summary.deleted += 1;
                    }
                    Err(e) => {
                        error!(cluster = %cluster.name, vm = %record.name, error = %e, "Failed to delete VM");
                        summary.failed += 1;
                    }
                },
                PruneDecision::Waiting => {
                    debug!(cluster = %cluster.name, vm = %record.name, "VM decommissioning, grace period not over")
                }
                PruneDecision::MissingTimestamp => {
                    warn!(cluster = %cluster.name, vm = %record.name, "Decommissioning VM has no last_updated, skipping")
                }
                PruneDecision::Unmanaged | PruneDecision::Present | PruneDecision::Ignored => {}
            }
        }
        Ok(summary)
    }
}
