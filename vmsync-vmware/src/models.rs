//! vSphere Automation API payloads.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DatacenterSummary {
    pub datacenter: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSummary {
    pub cluster: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmSummary {
    pub vm: String,
    pub name: String,
    pub power_state: String,
    #[serde(default)]
    pub cpu_count: Option<u32>,
    #[serde(rename = "memory_size_MiB", default)]
    pub memory_size_mib: Option<u64>,
}

/// `GET /api/vcenter/vm/{vm}`. Disks and NICs are keyed by device key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmInfo {
    #[serde(default)]
    pub disks: BTreeMap<String, Disk>,
    #[serde(default)]
    pub nics: BTreeMap<String, NicInfo>,
}

impl VmInfo {
    /// Total disk capacity in GB (10^9 bytes).
    pub fn disk_gb(&self) -> u64 {
        self.disks.values().filter_map(|d| d.capacity).sum::<u64>() / 1_000_000_000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Disk {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub capacity: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NicInfo {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub backing: NicBacking,
}

impl NicInfo {
    /// e.g. `VMXNET3 CONNECTED to STANDARD_PORTGROUP/network-12`.
    pub fn description(&self) -> String {
        format!(
            "{} {} to {}/{}",
            self.kind,
            self.state,
            self.backing.kind,
            self.backing.network.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NicBacking {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub network: Option<String>,
}

/// One entry of `GET /api/vcenter/vm/{vm}/guest/networking/interfaces`.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestInterface {
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub ip: Option<GuestIpConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GuestIpConfig {
    #[serde(default)]
    pub ip_addresses: Vec<GuestIp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestIp {
    pub ip_address: String,
    pub prefix_length: u8,
}
