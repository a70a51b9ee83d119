//! Proxmox VE API payloads.
//!
//! Every PVE response wraps its payload in `{"data": ...}`. Numbers are not
//! always numbers: depending on version and endpoint, flags and sizes come
//! back as JSON strings, so the lenient fields below accept both.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Version {
    pub version: String,
    #[serde(default)]
    pub release: Option<String>,
}

/// One row of `/cluster/status`: either the cluster itself or a node.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterStatusEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
}

/// A VM row of `/cluster/resources?type=vm`.
#[derive(Debug, Clone, Deserialize)]
pub struct VmResource {
    /// `qemu/100` or `lxc/101`.
    pub id: String,
    /// `qemu` or `lxc`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(deserialize_with = "lenient_u64")]
    pub vmid: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub node: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub maxmem: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub maxdisk: Option<u64>,
    #[serde(default, deserialize_with = "lenient_opt_f64")]
    pub maxcpu: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub template: Option<u64>,
}

impl VmResource {
    pub fn is_template(&self) -> bool {
        self.template.unwrap_or(0) != 0
    }

    pub fn is_running(&self) -> bool {
        self.status == "running"
    }

    /// Display name; unnamed guests fall back to their VMID.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}-{}", self.kind, self.vmid),
        }
    }
}

/// VM configuration. Its keys depend on the hardware (`net0`, `scsi1`, ...),
/// so it is kept as a map.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct VmConfig(pub BTreeMap<String, Value>);

impl VmConfig {
    /// A config value as text, whether PVE sent it as a string or a number.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Response of the guest agent's `network-get-interfaces`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentNetwork {
    #[serde(default)]
    pub result: Vec<AgentInterface>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentInterface {
    pub name: String,
    #[serde(rename = "hardware-address", default)]
    pub hardware_address: Option<String>,
    #[serde(rename = "ip-addresses", default)]
    pub ip_addresses: Vec<AgentIp>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentIp {
    #[serde(rename = "ip-address")]
    pub ip_address: String,
    #[serde(default)]
    pub prefix: Option<u8>,
}

impl AgentIp {
    /// The address in CIDR notation. Without a prefix the address is taken
    /// as a host route.
    pub fn cidr(&self) -> String {
        let prefix = self
            .prefix
            .unwrap_or(if self.ip_address.contains(':') { 128 } else { 32 });
        format!("{}/{}", self.ip_address, prefix)
    }
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    lenient_opt_u64(d)?.ok_or_else(|| serde::de::Error::custom("expected an integer"))
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
