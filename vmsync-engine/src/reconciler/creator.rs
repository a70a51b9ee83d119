//! VM creator - registers provider VMs that have no registry record yet.

use std::sync::Arc;

use tracing::{info, warn};

use super::interface::{NicChanges, create_interface};
use crate::error::Result;
use crate::model::Vm;
use crate::registry::{Identity, NewVm, ObjectRef, Registry, RegistryCluster, RegistryVm};

pub struct VmCreator {
    registry: Arc<dyn Registry>,
    provider: String,
}

impl VmCreator {
    pub fn new(registry: Arc<dyn Registry>, provider: impl Into<String>) -> Self {
        Self {
            registry,
            provider: provider.into(),
        }
    }

    /// Create the VM record tagged with its identity, then one interface per
    /// NIC with its addresses.
    ///
    /// NIC failures are logged and counted; the VM record itself must be
    /// created and tagged or an error is returned before any NIC is touched.
    pub async fn create(
        &self,
        cluster: &RegistryCluster,
        vm: &Vm,
    ) -> Result<(RegistryVm, NicChanges)> {
        let identity = Identity::new(&vm.id, &self.provider);
        let req = NewVm {
            name: vm.name.clone(),
            cluster_id: cluster.id,
            status: vm.status,
            memory_mb: vm.memory_mb,
            disk_gb: vm.disk_gb,
            vcpus: vm.vcpus,
            description: vm.description.clone(),
            custom_fields: identity.custom_fields(),
        };

        let mut record = self.registry.add_vm(req).await?;
        info!(cluster = %cluster.name, vm = %vm.name, vmid = %vm.id, registry_id = record.id, "Created VM");

        // Some registries drop custom fields on create
        if record.vmid().as_deref() != Some(vm.id.as_str())
            || record.vmprovider().as_deref() != Some(self.provider.as_str())
        {
            warn!(vm = %vm.name, registry_id = record.id, "Identity missing after create, stamping");
            let fields = identity.custom_fields();
            self.registry
                .set_custom_fields(ObjectRef::vm(record.id), &fields)
                .await?;
            record.custom_fields.extend(fields);
        }

        let mut changes = NicChanges::default();
        for nic in &vm.network {
            changes +=
                create_interface(self.registry.as_ref(), &self.provider, record.id, vm, nic).await;
        }
        Ok((record, changes))
    }
}
