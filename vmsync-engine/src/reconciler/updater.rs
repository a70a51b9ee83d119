//! VM updater - converges a matched registry record with its provider VM.

use std::sync::Arc;

use tracing::{error, info};

use super::interface::{NicChanges, attach_addresses, create_interface, missing_addresses};
use crate::error::Result;
use crate::model::{Nic, Vm};
use crate::registry::{
    InterfaceUpdate, Registry, RegistryInterface, RegistryIp, RegistryVm, VmUpdate,
};

/// VCPU counts closer than this are considered equal.
const VCPU_EPSILON: f64 = 1e-6;

/// Writes issued while reconciling one VM.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Scalar fields changed by the VM update, empty when none was sent.
    pub fields: Vec<&'static str>,
    pub nics: NicChanges,
}

impl UpdateSummary {
    /// Whether anything was written to the registry.
    pub fn changed(&self) -> bool {
        !self.fields.is_empty() || self.nics.has_writes()
    }
}

/// Build the update for a registry record, or `None` when it already
/// matches the provider VM.
///
/// Only changed fields are set; the name is always carried and a differing
/// name alone is enough to trigger an update.
pub fn diff_vm(record: &RegistryVm, vm: &Vm) -> Option<VmUpdate> {
    let mut update = VmUpdate::new(&vm.name);
    if record.status != Some(vm.status) {
        update.status = Some(vm.status);
    }
    if record.memory_mb != Some(vm.memory_mb) {
        update.memory_mb = Some(vm.memory_mb);
    }
    if record.disk_gb != Some(vm.disk_gb) {
        update.disk_gb = Some(vm.disk_gb);
    }
    if (record.vcpus.unwrap_or(0.0) - vm.vcpus).abs() > VCPU_EPSILON {
        update.vcpus = Some(vm.vcpus);
    }

    if update.changed_fields().is_empty() && record.name == vm.name {
        None
    } else {
        Some(update)
    }
}

/// MAC update for an interface: only when the provider reports a MAC that
/// differs from the registry's, ignoring case.
pub fn mac_update(interface: &RegistryInterface, nic: &Nic) -> Option<InterfaceUpdate> {
    let mac = nic.mac.as_deref().filter(|mac| !mac.is_empty())?;
    match interface.mac_address.as_deref() {
        Some(current) if current.eq_ignore_ascii_case(mac) => None,
        _ => Some(InterfaceUpdate {
            mac_address: Some(mac.to_string()),
        }),
    }
}

/// The registry interface tagged with the NIC's provider ID.
pub fn find_interface<'a>(
    interfaces: &'a [RegistryInterface],
    nic_id: &str,
) -> Option<&'a RegistryInterface> {
    interfaces
        .iter()
        .find(|i| i.vmid().as_deref() == Some(nic_id))
}

pub struct VmUpdater {
    registry: Arc<dyn Registry>,
    provider: String,
}

impl VmUpdater {
    pub fn new(registry: Arc<dyn Registry>, provider: impl Into<String>) -> Self {
        Self {
            registry,
            provider: provider.into(),
        }
    }

    /// Reconcile scalar fields, then interfaces and addresses.
    ///
    /// A failed VM update or interface listing is returned; failures on
    /// single interfaces or addresses are logged and counted.
    pub async fn reconcile(&self, record: &RegistryVm, vm: &Vm) -> Result<UpdateSummary> {
        let mut summary = UpdateSummary::default();

        if let Some(update) = diff_vm(record, vm) {
            let mut fields = update.changed_fields();
            if record.name != vm.name {
                fields.insert(0, "name");
            }
            info!(vm = %vm.name, registry_id = record.id, fields = ?fields, "Updating VM");
            self.registry.update_vm(record.id, &update).await?;
            summary.fields = fields;
        }

        if vm.network.is_empty() {
            return Ok(summary);
        }
        let interfaces = self.registry.list_interfaces(record.id).await?;
        let addresses = self.registry.list_ip_addresses(record.id).await?;

        for nic in &vm.network {
            summary.nics += match find_interface(&interfaces, &nic.id) {
                Some(interface) => self.update_interface(vm, interface, nic, &addresses).await,
                None => {
                    create_interface(self.registry.as_ref(), &self.provider, record.id, vm, nic)
                        .await
                }
            };
        }
        Ok(summary)
    }

    async fn update_interface(
        &self,
        vm: &Vm,
        interface: &RegistryInterface,
        nic: &Nic,
        addresses: &[RegistryIp],
    ) -> NicChanges {
        let mut changes = NicChanges::default();

        if let Some(update) = mac_update(interface, nic) {
            match self.registry.update_interface(interface.id, &update).await {
                Ok(()) => {
                    info!(
                        vm = %vm.name,
                        nic = %nic.name,
                        mac = ?update.mac_address,
                        "Updated interface MAC"
                    );
                    changes.interfaces_updated += 1;
                }
                Err(e) => {
                    error!(vm = %vm.name, nic = %nic.name, error = %e, "Failed to update interface");
                    changes.failures += 1;
                }
            }
        }

        let missing = missing_addresses(addresses, interface.id, &nic.ips);
        changes += attach_addresses(
            self.registry.as_ref(),
            &self.provider,
            interface.id,
            vm,
            nic,
            &missing,
        )
        .await;
        changes
    }
}
