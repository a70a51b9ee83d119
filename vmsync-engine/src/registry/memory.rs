//! In-memory registry.
//!
//! Behaves like the NetBox-backed registry for everything the engine relies
//! on: filtered and paginated VM search, cascading VM deletes, custom field
//! merging and a `last_updated` timestamp bumped on every VM write. Every
//! write is recorded as a [`Mutation`] and selected operations can be made to
//! fail with a [`Fault`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::error::{RegistryError, Result};
use super::types::*;
use super::Registry;

const DEFAULT_PAGE_SIZE: usize = 50;

/// A write performed against the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    AddVm { id: u64, name: String },
    UpdateVm { id: u64, update: VmUpdate },
    DeleteVm { id: u64 },
    AddInterface { id: u64, vm_id: u64, name: String },
    UpdateInterface { id: u64, update: InterfaceUpdate },
    AddIpAddress { id: u64, interface_id: u64, address: String },
    SetCustomFields { object: ObjectRef, fields: CustomFields },
    AddCustomField { name: String },
    AddClusterType { name: String },
    AddClusterGroup { name: String },
    AddCluster { name: String },
}

/// An operation that should fail with [`RegistryError::Internal`], or
/// misbehave the way some registries do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Creating a VM with this name.
    AddVm(String),
    /// Updating the VM with this ID.
    UpdateVm(u64),
    /// Creating an interface with this name.
    AddInterface(String),
    /// Creating this IP address.
    AddIpAddress(String),
    /// Any VM search.
    SearchVms,
    /// Creating any custom field.
    AddCustomField,
    /// Creating any cluster.
    AddCluster,
    /// VM creation succeeds but silently drops the custom fields.
    DropVmCustomFields,
}

struct State {
    next_id: u64,
    page_size: usize,
    vms: BTreeMap<u64, RegistryVm>,
    interfaces: BTreeMap<u64, RegistryInterface>,
    ips: BTreeMap<u64, RegistryIp>,
    custom_fields: BTreeMap<String, CustomFieldSpec>,
    cluster_types: BTreeMap<u64, (ClusterType, CustomFields)>,
    cluster_groups: BTreeMap<u64, (ClusterGroup, CustomFields)>,
    clusters: BTreeMap<u64, (RegistryCluster, CustomFields)>,
    faults: Vec<Fault>,
    mutations: Vec<Mutation>,
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn fail_if(&self, fault: &Fault) -> Result<()> {
        if self.faults.contains(fault) {
            return Err(RegistryError::Internal(format!("injected fault: {:?}", fault)));
        }
        Ok(())
    }
}

/// Registry kept entirely in memory.
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a registry returning at most `page_size` VMs per search page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 0,
                page_size: page_size.max(1),
                vms: BTreeMap::new(),
                interfaces: BTreeMap::new(),
                ips: BTreeMap::new(),
                custom_fields: BTreeMap::new(),
                cluster_types: BTreeMap::new(),
                cluster_groups: BTreeMap::new(),
                clusters: BTreeMap::new(),
                faults: Vec::new(),
                mutations: Vec::new(),
            }),
        }
    }

    pub async fn inject_fault(&self, fault: Fault) {
        self.state.lock().await.faults.push(fault);
    }

    pub async fn clear_faults(&self) {
        self.state.lock().await.faults.clear();
    }

    /// Writes recorded since creation or the last [`clear_mutations`](Self::clear_mutations).
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().await.mutations.clone()
    }

    pub async fn clear_mutations(&self) {
        self.state.lock().await.mutations.clear();
    }

    /// All VMs, ordered by ID.
    pub async fn vms(&self) -> Vec<RegistryVm> {
        self.state.lock().await.vms.values().cloned().collect()
    }

    /// Names of all custom fields defined in the registry.
    pub async fn custom_field_names(&self) -> Vec<String> {
        self.state.lock().await.custom_fields.keys().cloned().collect()
    }

    /// Custom fields stored on a cluster type.
    pub async fn cluster_type_fields(&self, name: &str) -> Option<CustomFields> {
        let state = self.state.lock().await;
        state
            .cluster_types
            .values()
            .find(|(ct, _)| ct.name == name)
            .map(|(_, fields)| fields.clone())
    }

    /// Overwrite the `last_updated` timestamp of a VM.
    pub async fn set_last_updated(&self, vm_id: u64, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let vm = state
            .vms
            .get_mut(&vm_id)
            .ok_or_else(|| RegistryError::NotFound(format!("vm {}", vm_id)))?;
        vm.last_updated = Some(at);
        Ok(())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn search_vms_page(
        &self,
        filter: &VmFilter,
        page: Option<&PageToken>,
    ) -> Result<Page<RegistryVm>> {
        let state = self.state.lock().await;
        state.fail_if(&Fault::SearchVms)?;

        let offset = match page {
            Some(token) => token
                .0
                .parse::<usize>()
                .map_err(|_| RegistryError::Decode(format!("bad page token: {}", token.0)))?,
            None => 0,
        };
        let matching: Vec<&RegistryVm> =
            state.vms.values().filter(|vm| filter.matches(vm)).collect();
        let end = (offset + state.page_size).min(matching.len());
        let items: Vec<RegistryVm> = matching
            .get(offset..end)
            .map(|slice| slice.iter().map(|vm| (*vm).clone()).collect())
            .unwrap_or_default();
        let next = (end < matching.len()).then(|| PageToken(end.to_string()));

        Ok(Page { items, next })
    }

    async fn get_vm(&self, id: u64) -> Result<Option<RegistryVm>> {
        Ok(self.state.lock().await.vms.get(&id).cloned())
    }

    async fn add_vm(&self, req: NewVm) -> Result<RegistryVm> {
        let mut state = self.state.lock().await;
        state.fail_if(&Fault::AddVm(req.name.clone()))?;
        if !state.clusters.contains_key(&req.cluster_id) {
            return Err(RegistryError::Api {
                status: 400,
                message: format!("cluster {} does not exist", req.cluster_id),
            });
        }

        let custom_fields = if state.faults.contains(&Fault::DropVmCustomFields) {
            CustomFields::new()
        } else {
            req.custom_fields
        };
        let id = state.allocate_id();
        let vm = RegistryVm {
            id,
            name: req.name,
            cluster_id: Some(req.cluster_id),
            status: Some(req.status),
            memory_mb: Some(req.memory_mb),
            disk_gb: Some(req.disk_gb),
            vcpus: Some(req.vcpus),
            description: req.description,
            custom_fields,
            last_updated: Some(Utc::now()),
        };
        state.vms.insert(id, vm.clone());
        state.mutations.push(Mutation::AddVm {
            id,
            name: vm.name.clone(),
        });
        Ok(vm)
    }

    async fn update_vm(&self, id: u64, update: &VmUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        state.fail_if(&Fault::UpdateVm(id))?;

        let vm = state
            .vms
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(format!("vm {}", id)))?;
        vm.name = update.name.clone();
        if let Some(status) = update.status {
            vm.status = Some(status);
        }
        if let Some(memory) = update.memory_mb {
            vm.memory_mb = Some(memory);
        }
        if let Some(disk) = update.disk_gb {
            vm.disk_gb = Some(disk);
        }
        if let Some(vcpus) = update.vcpus {
            vm.vcpus = Some(vcpus);
        }
        vm.last_updated = Some(Utc::now());
        state.mutations.push(Mutation::UpdateVm {
            id,
            update: update.clone(),
        });
        Ok(())
    }

    async fn delete_vm(&self, id: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.vms.remove(&id).is_none() {
            return Err(RegistryError::NotFound(format!("vm {}", id)));
        }

        let interface_ids: Vec<u64> = state
            .interfaces
            .values()
            .filter(|i| i.vm_id == id)
            .map(|i| i.id)
            .collect();
        state.interfaces.retain(|_, i| i.vm_id != id);
        state
            .ips
            .retain(|_, ip| !ip.interface_id.is_some_and(|i| interface_ids.contains(&i)));
        state.mutations.push(Mutation::DeleteVm { id });
        Ok(())
    }

    async fn list_interfaces(&self, vm_id: u64) -> Result<Vec<RegistryInterface>> {
        let state = self.state.lock().await;
        Ok(state
            .interfaces
            .values()
            .filter(|i| i.vm_id == vm_id)
            .cloned()
            .collect())
    }

    async fn add_interface(&self, req: NewInterface) -> Result<RegistryInterface> {
        let mut state = self.state.lock().await;
        state.fail_if(&Fault::AddInterface(req.name.clone()))?;
        if !state.vms.contains_key(&req.vm_id) {
            return Err(RegistryError::Api {
                status: 400,
                message: format!("virtual machine {} does not exist", req.vm_id),
            });
        }

        let id = state.allocate_id();
        let interface = RegistryInterface {
            id,
            vm_id: req.vm_id,
            name: req.name,
            mac_address: req.mac_address,
            description: req.description,
            custom_fields: req.custom_fields,
        };
        state.interfaces.insert(id, interface.clone());
        state.mutations.push(Mutation::AddInterface {
            id,
            vm_id: interface.vm_id,
            name: interface.name.clone(),
        });
        Ok(interface)
    }

    async fn update_interface(&self, id: u64, update: &InterfaceUpdate) -> Result<()> {
        let mut state = self.state.lock().await;
        let interface = state
            .interfaces
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(format!("interface {}", id)))?;
        if let Some(mac) = &update.mac_address {
            interface.mac_address = Some(mac.clone());
        }
        state.mutations.push(Mutation::UpdateInterface {
            id,
            update: update.clone(),
        });
        Ok(())
    }

    async fn list_ip_addresses(&self, vm_id: u64) -> Result<Vec<RegistryIp>> {
        let state = self.state.lock().await;
        Ok(state
            .ips
            .values()
            .filter(|ip| {
                ip.interface_id
                    .and_then(|i| state.interfaces.get(&i))
                    .is_some_and(|i| i.vm_id == vm_id)
            })
            .cloned()
            .collect())
    }

    async fn add_ip_address(&self, req: NewIpAddress) -> Result<RegistryIp> {
        let mut state = self.state.lock().await;
        state.fail_if(&Fault::AddIpAddress(req.address.clone()))?;
        if !state.interfaces.contains_key(&req.interface_id) {
            return Err(RegistryError::Api {
                status: 400,
                message: format!("interface {} does not exist", req.interface_id),
            });
        }

        let id = state.allocate_id();
        let ip = RegistryIp {
            id,
            address: req.address,
            interface_id: Some(req.interface_id),
            description: String::new(),
            custom_fields: req.custom_fields,
        };
        state.ips.insert(id, ip.clone());
        state.mutations.push(Mutation::AddIpAddress {
            id,
            interface_id: req.interface_id,
            address: ip.address.clone(),
        });
        Ok(ip)
    }

    async fn set_custom_fields(&self, object: ObjectRef, fields: &CustomFields) -> Result<()> {
        let mut state = self.state.lock().await;
        let not_found = || RegistryError::NotFound(format!("{:?} {}", object.kind, object.id));
        let target = match object.kind {
            ObjectType::VirtualMachine => {
                let vm = state.vms.get_mut(&object.id).ok_or_else(not_found)?;
                vm.last_updated = Some(Utc::now());
                &mut vm.custom_fields
            }
            ObjectType::VmInterface => {
                &mut state
                    .interfaces
                    .get_mut(&object.id)
                    .ok_or_else(not_found)?
                    .custom_fields
            }
            ObjectType::IpAddress => {
                &mut state.ips.get_mut(&object.id).ok_or_else(not_found)?.custom_fields
            }
            ObjectType::Cluster => &mut state.clusters.get_mut(&object.id).ok_or_else(not_found)?.1,
            ObjectType::ClusterGroup => {
                &mut state
                    .cluster_groups
                    .get_mut(&object.id)
                    .ok_or_else(not_found)?
                    .1
            }
            ObjectType::ClusterType => {
                &mut state
                    .cluster_types
                    .get_mut(&object.id)
                    .ok_or_else(not_found)?
                    .1
            }
        };
        target.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        state.mutations.push(Mutation::SetCustomFields {
            object,
            fields: fields.clone(),
        });
        Ok(())
    }

    async fn custom_field_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.lock().await.custom_fields.contains_key(name))
    }

    async fn add_custom_field(&self, spec: &CustomFieldSpec) -> Result<()> {
        let mut state = self.state.lock().await;
        state.fail_if(&Fault::AddCustomField)?;
        if state.custom_fields.contains_key(&spec.name) {
            return Err(RegistryError::Api {
                status: 400,
                message: format!("custom field {} already exists", spec.name),
            });
        }
        state.custom_fields.insert(spec.name.clone(), spec.clone());
        state.mutations.push(Mutation::AddCustomField {
            name: spec.name.clone(),
        });
        Ok(())
    }

    async fn get_cluster_type(&self, name: &str) -> Result<Option<ClusterType>> {
        let state = self.state.lock().await;
        Ok(state
            .cluster_types
            .values()
            .find(|(ct, _)| ct.name == name)
            .map(|(ct, _)| ct.clone()))
    }

    async fn add_cluster_type(
        &self,
        name: &str,
        custom_fields: &CustomFields,
    ) -> Result<ClusterType> {
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        let cluster_type = ClusterType {
            id,
            name: name.to_string(),
        };
        state
            .cluster_types
            .insert(id, (cluster_type.clone(), custom_fields.clone()));
        state.mutations.push(Mutation::AddClusterType {
            name: name.to_string(),
        });
        Ok(cluster_type)
    }

    async fn get_cluster_group(&self, name: &str) -> Result<Option<ClusterGroup>> {
        let state = self.state.lock().await;
        Ok(state
            .cluster_groups
            .values()
            .find(|(group, _)| group.name == name)
            .map(|(group, _)| group.clone()))
    }

    async fn add_cluster_group(&self, req: NewClusterGroup) -> Result<ClusterGroup> {
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        let group = ClusterGroup {
            id,
            name: req.name,
            description: req.description,
        };
        state
            .cluster_groups
            .insert(id, (group.clone(), req.custom_fields));
        state.mutations.push(Mutation::AddClusterGroup {
            name: group.name.clone(),
        });
        Ok(group)
    }

    async fn get_cluster(&self, name: &str, group_id: u64) -> Result<Option<RegistryCluster>> {
        let state = self.state.lock().await;
        Ok(state
            .clusters
            .values()
            .find(|(c, _)| c.name == name && c.group_id == Some(group_id))
            .map(|(c, _)| c.clone()))
    }

    async fn add_cluster(&self, req: NewCluster) -> Result<RegistryCluster> {
        let mut state = self.state.lock().await;
        state.fail_if(&Fault::AddCluster)?;
        let id = state.allocate_id();
        let cluster = RegistryCluster {
            id,
            name: req.name,
            group_id: Some(req.group_id),
            type_id: Some(req.type_id),
        };
        state
            .clusters
            .insert(id, (cluster.clone(), req.custom_fields));
        state.mutations.push(Mutation::AddCluster {
            name: cluster.name.clone(),
        });
        Ok(cluster)
    }
}
