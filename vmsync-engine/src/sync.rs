//! Sync orchestrator.
//!
//! One pass walks the provider topology datacenter → cluster → VM, one call
//! at a time, and leaves the registry matching the provider.

use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{Result, SyncError};
use crate::model::{Cluster, Datacenter, Vm};
use crate::provider::Provider;
use crate::reconciler::{Pruner, SchemaBootstrapper, VmCreator, VmMatcher, VmUpdater};
use crate::registry::{
    ClusterType, Identity, NewCluster, NewClusterGroup, Registry, RegistryCluster,
};

/// Default time a VM stays decommissioning before it is deleted.
pub const DEFAULT_GRACE_PERIOD_DAYS: i64 = 30;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between decommissioning and deletion.
    pub grace_period: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::days(DEFAULT_GRACE_PERIOD_DAYS),
        }
    }
}

/// Counters of one sync pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub clusters: usize,
    pub vms_seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub decommissioned: usize,
    pub deleted: usize,
    /// Prune writes that failed; a failed prune search counts once.
    pub prune_failed: usize,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} clusters, {} VMs ({} created, {} updated, {} unchanged, {} failed), {} decommissioned, {} deleted, {} prune failures",
            self.clusters,
            self.vms_seen,
            self.created,
            self.updated,
            self.unchanged,
            self.failed,
            self.decommissioned,
            self.deleted,
            self.prune_failed
        )
    }
}

/// Result of reconciling one provider VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Drives a full reconciliation pass of one provider into the registry.
pub struct SyncService {
    registry: Arc<dyn Registry>,
    provider: Arc<dyn Provider>,
    config: SyncConfig,
    matcher: VmMatcher,
    creator: VmCreator,
    updater: VmUpdater,
    pruner: Pruner,
}

impl SyncService {
    pub fn new(registry: Arc<dyn Registry>, provider: Arc<dyn Provider>, config: SyncConfig) -> Self {
        let name = provider.name().to_string();
        Self {
            matcher: VmMatcher::new(registry.clone(), &name),
            creator: VmCreator::new(registry.clone(), &name),
            updater: VmUpdater::new(registry.clone(), &name),
            pruner: Pruner::new(registry.clone(), &name, config.grace_period),
            registry,
            provider,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one pass. Errors are fatal; per-VM failures only show up in the
    /// report.
    pub async fn run(&self) -> Result<SyncReport> {
        let provider = self.provider.name();
        info!(provider = %provider, "Starting sync");

        let cluster_type = SchemaBootstrapper::new(self.registry.clone(), provider)
            .bootstrap()
            .await
            .map_err(SyncError::Schema)?;

        let datacenters = self
            .provider
            .list_datacenters()
            .await
            .map_err(SyncError::ListDatacenters)?;

        let mut report = SyncReport::default();
        for datacenter in &datacenters {
            self.sync_datacenter(datacenter, &cluster_type, &mut report)
                .await?;
        }

        info!(provider = %provider, "Sync finished: {}", report);
        Ok(report)
    }

    async fn sync_datacenter(
        &self,
        datacenter: &Datacenter,
        cluster_type: &ClusterType,
        report: &mut SyncReport,
    ) -> Result<()> {
        info!(datacenter = %datacenter.name, "Syncing datacenter");
        let group = self
            .registry
            .ensure_cluster_group(NewClusterGroup {
                name: datacenter.name.clone(),
                description: datacenter.description.clone(),
                custom_fields: self.identity(&datacenter.id),
            })
            .await
            .map_err(|source| SyncError::ClusterGroup {
                datacenter: datacenter.name.clone(),
                source,
            })?;

        let clusters = self
            .provider
            .list_clusters(&datacenter.id)
            .await
            .map_err(|source| SyncError::ListClusters {
                datacenter: datacenter.name.clone(),
                source,
            })?;

        for cluster in &clusters {
            let registry_cluster = self
                .registry
                .ensure_cluster(NewCluster {
                    name: cluster.name.clone(),
                    group_id: group.id,
                    type_id: cluster_type.id,
                    description: cluster.description.clone(),
                    custom_fields: self.identity(&cluster.id),
                })
                .await
                .map_err(|source| SyncError::Cluster {
                    cluster: cluster.name.clone(),
                    source,
                })?;
            self.sync_cluster(cluster, &registry_cluster, report).await?;
        }
        Ok(())
    }

    async fn sync_cluster(
        &self,
        cluster: &Cluster,
        registry_cluster: &RegistryCluster,
        report: &mut SyncReport,
    ) -> Result<()> {
        let vms = self
            .provider
            .list_cluster_vms(&cluster.id)
            .await
            .map_err(|source| SyncError::ListVms {
                cluster: cluster.name.clone(),
                source,
            })?;
        info!(cluster = %cluster.name, vms = vms.len(), "Syncing cluster");
        report.clusters += 1;

        for vm in &vms {
            report.vms_seen += 1;
            match self.sync_vm(registry_cluster, vm).await {
                Ok(VmOutcome::Created) => report.created += 1,
                Ok(VmOutcome::Updated) => report.updated += 1,
                Ok(VmOutcome::Unchanged) => report.unchanged += 1,
                Err(e) => {
                    error!(cluster = %cluster.name, vm = %vm.name, vmid = %vm.id, error = %e, "Failed to sync VM");
                    report.failed += 1;
                }
            }
        }

        match self.pruner.prune(registry_cluster, &vms, Utc::now()).await {
            Ok(summary) => {
                report.decommissioned += summary.decommissioned;
                report.deleted += summary.deleted;
                report.prune_failed += summary.failed;
            }
            Err(e) => {
                warn!(cluster = %cluster.name, error = %e, "Failed to prune cluster");
                report.prune_failed += 1;
            }
        }
        Ok(())
    }

    /// Match, then create or update a single VM.
    pub async fn sync_vm(&self, cluster: &RegistryCluster, vm: &Vm) -> Result<VmOutcome> {
        match self.matcher.find(cluster, vm).await? {
            None => {
                self.creator.create(cluster, vm).await?;
                Ok(VmOutcome::Created)
            }
            Some(record) => {
                let summary = self.updater.reconcile(&record, vm).await?;
                if summary.changed() {
                    Ok(VmOutcome::Updated)
                } else {
                    Ok(VmOutcome::Unchanged)
                }
            }
        }
    }

    fn identity(&self, id: &str) -> crate::registry::CustomFields {
        Identity::new(id, self.provider.name()).custom_fields()
    }
}
