//! VM matcher - correlates a provider VM with its registry record.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::model::Vm;
use crate::registry::{
    Identity, ObjectRef, Registry, RegistryCluster, RegistryVm, VMID_FIELD, VMPROVIDER_FIELD,
    VmFilter,
};

/// Finds the registry record of a provider VM: by identity tag first, then by
/// name. A record found by name is re-tagged so later passes match it by tag.
pub struct VmMatcher {
    registry: Arc<dyn Registry>,
    provider: String,
}

impl VmMatcher {
    pub fn new(registry: Arc<dyn Registry>, provider: impl Into<String>) -> Self {
        Self {
            registry,
            provider: provider.into(),
        }
    }

    /// Returns `Ok(None)` when the VM has no registry counterpart.
    pub async fn find(&self, cluster: &RegistryCluster, vm: &Vm) -> Result<Option<RegistryVm>> {
        if let Some(record) = self.find_by_identity(cluster, vm).await? {
            return Ok(Some(record));
        }

        let filter = VmFilter::new().in_cluster(cluster.id).named(&vm.name);
        let mut by_name = self.registry.search_vms(&filter).await?;
        by_name.retain(|r| r.name == vm.name);
        match by_name.as_slice() {
            [] => Ok(None),
            [record] => {
                let mut record = record.clone();
                self.retag(&mut record, vm).await?;
                Ok(Some(record))
            }
            records => Err(SyncError::Ambiguous {
                cluster: cluster.name.clone(),
                key: format!("name {}", vm.name),
                count: records.len(),
            }),
        }
    }

    async fn find_by_identity(
        &self,
        cluster: &RegistryCluster,
        vm: &Vm,
    ) -> Result<Option<RegistryVm>> {
        let filter = VmFilter::new()
            .in_cluster(cluster.id)
            .custom_field(VMID_FIELD, &vm.id)
            .custom_field(VMPROVIDER_FIELD, &self.provider);
        let mut hits = self.registry.search_vms(&filter).await?;

        // Registry-side filters may be substring matches
        hits.retain(|r| {
            r.vmid().as_deref() == Some(vm.id.as_str())
                && r.vmprovider().as_deref() == Some(self.provider.as_str())
        });

        match hits.len() {
            0 => Ok(None),
            1 => {
                debug!(cluster = %cluster.name, vm = %vm.name, vmid = %vm.id, "Matched by identity");
                Ok(hits.pop())
            }
            count => Err(SyncError::Ambiguous {
                cluster: cluster.name.clone(),
                key: format!("vmid {}", vm.id),
                count,
            }),
        }
    }

    async fn retag(&self, record: &mut RegistryVm, vm: &Vm) -> Result<()> {
        let fields = Identity::new(&vm.id, &self.provider).custom_fields();
        info!(
            vm = %vm.name,
            vmid = %vm.id,
            registry_id = record.id,
            "Matched by name, stamping identity"
        );
        self.registry
            .set_custom_fields(ObjectRef::vm(record.id), &fields)
            .await?;
        record.custom_fields.extend(fields);
        Ok(())
    }
}
