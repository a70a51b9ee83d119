//! Interface and address writes shared by the creator and the updater.

use std::collections::HashSet;
use std::ops::AddAssign;

use tracing::{error, info};

use crate::model::{Nic, Vm};
use crate::registry::{Identity, NewInterface, NewIpAddress, Registry, RegistryIp};

/// Interface/address writes issued for one VM.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NicChanges {
    pub interfaces_created: usize,
    pub interfaces_updated: usize,
    pub addresses_attached: usize,
    /// Interface or address writes that failed and were skipped.
    pub failures: usize,
}

impl NicChanges {
    /// Whether any write reached the registry.
    pub fn has_writes(&self) -> bool {
        self.interfaces_created + self.interfaces_updated + self.addresses_attached > 0
    }
}

impl AddAssign for NicChanges {
    fn add_assign(&mut self, other: Self) {
        self.interfaces_created += other.interfaces_created;
        self.interfaces_updated += other.interfaces_updated;
        self.addresses_attached += other.addresses_attached;
        self.failures += other.failures;
    }
}

/// Addresses from `wanted` not yet assigned to `interface_id`, in provider
/// order and without duplicates.
pub fn missing_addresses(attached: &[RegistryIp], interface_id: u64, wanted: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = attached
        .iter()
        .filter(|ip| ip.interface_id == Some(interface_id))
        .map(|ip| ip.address.as_str())
        .collect();
    wanted
        .iter()
        .filter(|address| seen.insert(address.as_str()))
        .cloned()
        .collect()
}

/// Create a registry interface tagged with the NIC's provider ID, then
/// attach all of its addresses. Failures are logged and counted.
pub(crate) async fn create_interface(
    registry: &dyn Registry,
    provider: &str,
    vm_id: u64,
    vm: &Vm,
    nic: &Nic,
) -> NicChanges {
    let mut changes = NicChanges::default();
    let req = NewInterface {
        vm_id,
        name: nic.name.clone(),
        mac_address: nic.mac.clone().filter(|mac| !mac.is_empty()),
        description: nic.description.clone(),
        custom_fields: Identity::new(&nic.id, provider).custom_fields(),
    };

    match registry.add_interface(req).await {
        Ok(interface) => {
            info!(vm = %vm.name, nic = %nic.name, nic_id = %nic.id, "Created interface");
            changes.interfaces_created += 1;
            let addresses = missing_addresses(&[], interface.id, &nic.ips);
            changes += attach_addresses(registry, provider, interface.id, vm, nic, &addresses).await;
        }
        Err(e) => {
            error!(vm = %vm.name, nic = %nic.name, nic_id = %nic.id, error = %e, "Failed to create interface");
            changes.failures += 1;
        }
    }
    changes
}

/// Create and assign each address to the interface. A failing address does
/// not stop the rest.
pub(crate) async fn attach_addresses(
    registry: &dyn Registry,
    provider: &str,
    interface_id: u64,
    vm: &Vm,
    nic: &Nic,
    addresses: &[String],
) -> NicChanges {
    let mut changes = NicChanges::default();
    for address in addresses {
        let req = NewIpAddress {
            address: address.clone(),
            interface_id,
            custom_fields: Identity::new(&nic.id, provider).custom_fields(),
        };
        match registry.add_ip_address(req).await {
            Ok(_) => {
                info!(vm = %vm.name, nic = %nic.name, ip = %address, "Attached address");
                changes.addresses_attached += 1;
            }
            Err(e) => {
                error!(vm = %vm.name, nic = %nic.name, ip = %address, error = %e, "Failed to attach address");
                changes.failures += 1;
            }
        }
    }
    changes
}
