//! Shared test utilities for vmsync-engine integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use vmsync_engine::provider::Result as ProviderResult;
use vmsync_engine::registry::{
    CustomFields, Identity, NewCluster, NewClusterGroup, NewVm, RegistryCluster,
};
use vmsync_engine::{
    Cluster, Datacenter, MemoryRegistry, Nic, Provider, ProviderError, Registry, SyncConfig,
    SyncService, Vm, VmStatus,
};

pub const PROVIDER: &str = "Proxmox";
pub const DATACENTER: &str = "Proxmox";
pub const CLUSTER: &str = "pve";

/// Provider serving a fixed topology: one datacenter with one cluster whose
/// VM list can be swapped between passes.
pub struct StaticProvider {
    vms: Mutex<BTreeMap<String, Vec<Vm>>>,
    fail_clusters: Mutex<bool>,
}

impl StaticProvider {
    pub fn new(vms: Vec<Vm>) -> Self {
        Self {
            vms: Mutex::new(BTreeMap::from([(CLUSTER.to_string(), vms)])),
            fail_clusters: Mutex::new(false),
        }
    }

    pub fn set_vms(&self, vms: Vec<Vm>) {
        self.vms.lock().unwrap().insert(CLUSTER.to_string(), vms);
    }

    pub fn fail_cluster_listing(&self) {
        *self.fail_clusters.lock().unwrap() = true;
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn list_datacenters(&self) -> ProviderResult<Vec<Datacenter>> {
        Ok(vec![Datacenter {
            id: DATACENTER.into(),
            name: DATACENTER.into(),
            description: "Proxmox Clusters".into(),
        }])
    }

    async fn list_clusters(&self, _datacenter_id: &str) -> ProviderResult<Vec<Cluster>> {
        if *self.fail_clusters.lock().unwrap() {
            return Err(ProviderError::Transport("connection refused".into()));
        }
        Ok(vec![Cluster {
            id: CLUSTER.into(),
            name: CLUSTER.into(),
            description: String::new(),
        }])
    }

    async fn list_cluster_vms(&self, cluster_id: &str) -> ProviderResult<Vec<Vm>> {
        Ok(self
            .vms
            .lock()
            .unwrap()
            .get(cluster_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory registry and static provider wired into a sync service.
pub struct Harness {
    pub registry: Arc<MemoryRegistry>,
    pub provider: Arc<StaticProvider>,
    pub service: SyncService,
}

impl Harness {
    pub fn new(vms: Vec<Vm>) -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let provider = Arc::new(StaticProvider::new(vms));
        let service = SyncService::new(registry.clone(), provider.clone(), SyncConfig::default());
        Self {
            registry,
            provider,
            service,
        }
    }

    /// Create the cluster group and cluster the sync pass would create, so
    /// records can be seeded before the first pass.
    pub async fn seed_cluster(&self) -> RegistryCluster {
        let ct = self
            .registry
            .ensure_cluster_type(PROVIDER, &CustomFields::new())
            .await
            .unwrap();
        let group = self
            .registry
            .ensure_cluster_group(NewClusterGroup {
                name: DATACENTER.into(),
                description: String::new(),
                custom_fields: CustomFields::new(),
            })
            .await
            .unwrap();
        self.registry
            .ensure_cluster(NewCluster {
                name: CLUSTER.into(),
                group_id: group.id,
                type_id: ct.id,
                description: String::new(),
                custom_fields: CustomFields::new(),
            })
            .await
            .unwrap()
    }

    /// Add a registry VM directly, bypassing the engine.
    pub async fn seed_vm(&self, cluster: &RegistryCluster, name: &str, vmid: Option<&str>) -> u64 {
        let custom_fields = vmid
            .map(|id| Identity::new(id, PROVIDER).custom_fields())
            .unwrap_or_default();
        self.registry
            .add_vm(NewVm {
                name: name.into(),
                cluster_id: cluster.id,
                status: VmStatus::Active,
                memory_mb: 2048,
                disk_gb: 32,
                vcpus: 2.0,
                description: String::new(),
                custom_fields,
            })
            .await
            .unwrap()
            .id
    }
}

pub fn nic(id: &str, mac: &str, ips: &[&str]) -> Nic {
    Nic {
        id: id.into(),
        name: id.into(),
        mac: Some(mac.into()),
        ips: ips.iter().map(|ip| ip.to_string()).collect(),
        description: String::new(),
    }
}

pub fn vm(id: &str, name: &str, network: Vec<Nic>) -> Vm {
    Vm {
        id: id.into(),
        name: name.into(),
        description: String::new(),
        memory_mb: 2048,
        disk_gb: 32,
        vcpus: 2.0,
        status: VmStatus::Active,
        network,
    }
}
