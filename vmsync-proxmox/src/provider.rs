//! Proxmox VE as a VM source.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use vmsync_engine::provider::{ProviderError, Result};
use vmsync_engine::{Cluster, Datacenter, Nic, Provider, Vm, VmStatus};

use crate::client::PveClient;
use crate::models::*;

/// Provider name tagged on synced records.
pub const PROVIDER_NAME: &str = "Proxmox";

const DATACENTER_ID: &str = "Proxmox";
const DATACENTER_DESCRIPTION: &str = "Proxmox Clusters";

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

pub struct ProxmoxProvider {
    client: PveClient,
}

impl ProxmoxProvider {
    /// Connect to the PVE API at `url` and check the credentials.
    pub async fn connect(url: &str, token_id: &str, secret: &str, insecure_tls: bool) -> Result<Self> {
        let client = PveClient::new(url, token_id, secret, insecure_tls)?;
        let version: Version = client.get("/version").await?;
        info!(
            version = %version.version,
            release = version.release.as_deref().unwrap_or(""),
            "Connected to Proxmox VE"
        );
        Ok(Self { client })
    }

    /// Enrich a summary VM with its config and guest agent data.
    async fn load_details(&self, resource: &VmResource, vm: &mut Vm) -> Result<()> {
        let base = format!("/nodes/{}/{}/{}", resource.node, resource.kind, resource.vmid);
        let config: VmConfig = self.client.get(&format!("{}/config", base)).await?;

        if let Some(memory) = config.text("memory").as_deref().and_then(parse_memory) {
            vm.memory_mb = memory;
        }
        if let Some(description) = config.text("description") {
            vm.description = description;
        }
        vm.network = nics_from_config(&config);

        if resource.kind == "qemu" && resource.is_running() && !vm.network.is_empty() {
            match self
                .client
                .get::<AgentNetwork>(&format!("{}/agent/network-get-interfaces", base))
                .await
            {
                Ok(agent) => apply_agent_network(&mut vm.network, &agent),
                // No agent installed or not running yet
                Err(e) => debug!(vm = %vm.name, error = %e, "Guest agent unavailable"),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for ProxmoxProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list_datacenters(&self) -> Result<Vec<Datacenter>> {
        Ok(vec![Datacenter {
            id: DATACENTER_ID.to_string(),
            name: DATACENTER_ID.to_string(),
            description: DATACENTER_DESCRIPTION.to_string(),
        }])
    }

    async fn list_clusters(&self, _datacenter_id: &str) -> Result<Vec<Cluster>> {
        let status: Vec<ClusterStatusEntry> = self.client.get("/cluster/status").await?;
        let cluster = cluster_from_status(status)
            .ok_or_else(|| ProviderError::Decode("cluster status lists no cluster or node".into()))?;
        Ok(vec![cluster])
    }

    async fn list_cluster_vms(&self, _cluster_id: &str) -> Result<Vec<Vm>> {
        let resources: Vec<VmResource> = self
            .client
            .get_with("/cluster/resources", &[("type", "vm")])
            .await?;

        let mut vms = Vec::with_capacity(resources.len());
        for resource in resources.iter().filter(|r| !r.is_template()) {
            let mut vm = vm_from_resource(resource);
            if let Err(e) = self.load_details(resource, &mut vm).await {
                warn!(vm = %vm.name, vmid = resource.vmid, error = %e, "Failed to load VM details");
            }
            vms.push(vm);
        }
        Ok(vms)
    }
}

/// The cluster entry of `/cluster/status`, or the first node of a standalone
/// installation.
fn cluster_from_status(entries: Vec<ClusterStatusEntry>) -> Option<Cluster> {
    let idx = entries
        .iter()
        .position(|e| e.kind == "cluster")
        .or_else(|| entries.iter().position(|e| e.kind == "node"))?;
    let entry = entries.into_iter().nth(idx)?;
    Some(Cluster {
        id: entry.id,
        name: entry.name,
        description: String::new(),
    })
}

/// Summary fields of a VM from its resource row.
fn vm_from_resource(resource: &VmResource) -> Vm {
    Vm {
        id: resource.vmid.to_string(),
        name: resource.display_name(),
        description: resource.kind.clone(),
        memory_mb: resource.maxmem.unwrap_or(0) / MIB,
        disk_gb: resource.maxdisk.unwrap_or(0) / GIB,
        vcpus: resource.maxcpu.unwrap_or(0.0),
        status: if resource.is_running() {
            VmStatus::Active
        } else {
            VmStatus::Offline
        },
        network: Vec::new(),
    }
}

/// Memory in MiB from a config value such as `2048` or `current=2048`.
fn parse_memory(value: &str) -> Option<u64> {
    parse_property_string(value)
        .into_iter()
        .find(|(key, _)| key.is_empty() || key == "current")
        .and_then(|(_, v)| v.parse().ok())
}

/// Split a PVE property string (`virtio=BC:24:11:..,bridge=vmbr0`) into
/// pairs. A value without key gets an empty key.
fn parse_property_string(value: &str) -> Vec<(String, String)> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (String::new(), part.to_string()),
        })
        .collect()
}

fn is_mac(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// NICs from the `netN` keys of a VM config, ordered by index.
///
/// QEMU NICs carry the MAC as value of the model key (`virtio=MAC`),
/// containers as `hwaddr=MAC`. Static container addresses (`ip=`, `ip6=`)
/// are taken as the NIC's addresses.
fn nics_from_config(config: &VmConfig) -> Vec<Nic> {
    let mut keys: Vec<(u32, &String)> = config
        .0
        .keys()
        .filter_map(|key| {
            key.strip_prefix("net")
                .and_then(|idx| idx.parse().ok())
                .map(|idx| (idx, key))
        })
        .collect();
    keys.sort();

    keys.into_iter()
        .filter_map(|(_, key)| {
            let raw = config.text(key)?;
            let props = parse_property_string(&raw);
            let mac = props
                .iter()
                .find(|(k, _)| k == "hwaddr" || k == "macaddr")
                .or_else(|| props.iter().find(|(_, v)| is_mac(v)))
                .map(|(_, v)| v.clone());
            let name = props
                .iter()
                .find(|(k, _)| k == "name")
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| key.clone());
            let ips = props
                .iter()
                .filter(|(k, v)| (k == "ip" || k == "ip6") && v.contains('/'))
                .map(|(_, v)| v.clone())
                .collect();
            Some(Nic {
                id: key.clone(),
                name,
                mac,
                ips,
                description: raw,
            })
        })
        .collect()
}

/// Name and addresses of each NIC from the guest agent interface with the
/// same MAC.
fn apply_agent_network(nics: &mut [Nic], agent: &AgentNetwork) {
    for nic in nics.iter_mut() {
        let Some(mac) = nic.mac.as_deref() else {
            continue;
        };
        let Some(iface) = agent.result.iter().find(|i| {
            i.hardware_address
                .as_deref()
                .is_some_and(|hw| hw.eq_ignore_ascii_case(mac))
        }) else {
            continue;
        };
        nic.name = iface.name.clone();
        nic.ips = iface.ip_addresses.iter().map(AgentIp::cidr).collect();
    }
}
