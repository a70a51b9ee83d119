//! Provider-side topology: datacenters, clusters, VMs and their NICs.
//!
//! These values are rebuilt on every provider fetch and never cached.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a VM, as understood by the registry.
///
/// Providers only report `Active` or `Offline`; the remaining states are
/// registry-side and `Decommissioning` is driven by the pruner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Offline,
    Active,
    Planned,
    Staged,
    Failed,
    Decommissioning,
}

impl VmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Offline => "offline",
            VmStatus::Active => "active",
            VmStatus::Planned => "planned",
            VmStatus::Staged => "staged",
            VmStatus::Failed => "failed",
            VmStatus::Decommissioning => "decommissioning",
        }
    }

    /// States that a provider can still vouch for.
    pub fn is_provider_visible(&self) -> bool {
        matches!(self, VmStatus::Active | VmStatus::Offline)
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VmStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offline" => Ok(VmStatus::Offline),
            "active" => Ok(VmStatus::Active),
            "planned" => Ok(VmStatus::Planned),
            "staged" => Ok(VmStatus::Staged),
            "failed" => Ok(VmStatus::Failed),
            "decommissioning" => Ok(VmStatus::Decommissioning),
            other => Err(format!("unknown VM status: {}", other)),
        }
    }
}

/// Top-level grouping of a provider. Maps to a registry cluster group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datacenter {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A cluster inside a datacenter. Maps to a registry cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A virtual machine as reported by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    /// Provider-native ID, stamped into the registry as `vmid`.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Memory in MiB.
    pub memory_mb: u64,
    /// Disk space in GB.
    pub disk_gb: u64,
    pub vcpus: f64,
    pub status: VmStatus,
    #[serde(default)]
    pub network: Vec<Nic>,
}

/// A network interface of a provider VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    /// Provider-native interface ID, stamped on the registry interface as `vmid`.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mac: Option<String>,
    /// Addresses in CIDR notation, e.g. `10.0.0.5/24`.
    #[serde(default)]
    pub ips: Vec<String>,
    #[serde(default)]
    pub description: String,
}
