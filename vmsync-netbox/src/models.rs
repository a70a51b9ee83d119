//! NetBox REST API payloads.
//!
//! Only the fields vmsync reads or writes are modelled; everything else in
//! the NetBox responses is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use vmsync_engine::registry::{
    ClusterGroup, ClusterType, CustomFields, RegistryCluster, RegistryInterface, RegistryIp,
    RegistryVm,
};
use vmsync_engine::VmStatus;

/// Content type of VM interfaces, used to assign IP addresses.
pub const VM_INTERFACE_TYPE: &str = "virtualization.vminterface";

/// A page of list results.
#[derive(Debug, Clone, Deserialize)]
pub struct Paginated<T> {
    #[serde(default)]
    pub count: u64,
    /// Absolute URL of the next page.
    pub next: Option<String>,
    pub results: Vec<T>,
}

/// Nested object reference (`{"id": 1, "name": "..."}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NestedRef {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub url: String,
}

/// Choice field (`{"value": "active", "label": "Active"}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Choice {
    pub value: String,
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct VirtualMachine {
    pub id: u64,
    pub name: String,
    pub cluster: Option<NestedRef>,
    pub status: Option<Choice>,
    pub memory: Option<u64>,
    pub disk: Option<u64>,
    #[serde(default, deserialize_with = "decimal")]
    pub vcpus: Option<f64>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_map")]
    pub custom_fields: CustomFields,
    pub last_updated: Option<DateTime<Utc>>,
}

impl VirtualMachine {
    /// `None` for a missing status or a choice vmsync does not model
    /// (`paused`, site-specific `FIELD_CHOICES`).
    pub fn status(&self) -> Option<VmStatus> {
        self.status.as_ref().and_then(|s| s.value.parse().ok())
    }
}

impl From<VirtualMachine> for RegistryVm {
    fn from(vm: VirtualMachine) -> Self {
        RegistryVm {
            id: vm.id,
            status: vm.status(),
            name: vm.name,
            cluster_id: vm.cluster.map(|c| c.id),
            memory_mb: vm.memory,
            disk_gb: vm.disk,
            vcpus: vm.vcpus,
            description: vm.description,
            custom_fields: vm.custom_fields,
            last_updated: vm.last_updated,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmInterface {
    pub id: u64,
    pub virtual_machine: NestedRef,
    pub name: String,
    pub mac_address: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_map")]
    pub custom_fields: CustomFields,
}

impl From<VmInterface> for RegistryInterface {
    fn from(i: VmInterface) -> Self {
        RegistryInterface {
            id: i.id,
            vm_id: i.virtual_machine.id,
            name: i.name,
            mac_address: i.mac_address,
            description: i.description,
            custom_fields: i.custom_fields,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpAddress {
    pub id: u64,
    pub address: String,
    pub assigned_object_type: Option<String>,
    pub assigned_object_id: Option<u64>,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "nullable_map")]
    pub custom_fields: CustomFields,
}

impl From<IpAddress> for RegistryIp {
    fn from(ip: IpAddress) -> Self {
        let interface_id = match ip.assigned_object_type.as_deref() {
            Some(VM_INTERFACE_TYPE) => ip.assigned_object_id,
            _ => None,
        };
        RegistryIp {
            id: ip.id,
            address: ip.address,
            interface_id,
            description: ip.description,
            custom_fields: ip.custom_fields,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NbClusterGroup {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub display: String,
    #[serde(default)]
    pub description: String,
}

impl From<NbClusterGroup> for ClusterGroup {
    fn from(g: NbClusterGroup) -> Self {
        ClusterGroup {
            id: g.id,
            name: g.name,
            description: g.description,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NbClusterType {
    pub id: u64,
    pub name: String,
}

impl From<NbClusterType> for ClusterType {
    fn from(t: NbClusterType) -> Self {
        ClusterType {
            id: t.id,
            name: t.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NbCluster {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub group: Option<NestedRef>,
    #[serde(rename = "type")]
    pub cluster_type: Option<NestedRef>,
}

impl From<NbCluster> for RegistryCluster {
    fn from(c: NbCluster) -> Self {
        RegistryCluster {
            id: c.id,
            name: c.name,
            group_id: c.group.map(|g| g.id),
            type_id: c.cluster_type.map(|t| t.id),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NbCustomField {
    pub id: u64,
    pub name: String,
}

/// Response carrying only an ID, used for writes whose body is not needed.
#[derive(Debug, Clone, Deserialize)]
pub struct Created {
    pub id: u64,
}

// =============================================================================
// Request bodies
// =============================================================================

#[derive(Debug, Serialize)]
pub struct VmBody<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<&'a CustomFields>,
}

#[derive(Debug, Serialize)]
pub struct InterfaceBody<'a> {
    pub virtual_machine: u64,
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<&'a str>,
    pub description: &'a str,
    pub custom_fields: &'a CustomFields,
}

#[derive(Debug, Serialize)]
pub struct InterfacePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct IpAddressBody<'a> {
    pub address: &'a str,
    pub assigned_object_type: &'static str,
    pub assigned_object_id: u64,
    pub custom_fields: &'a CustomFields,
}

#[derive(Debug, Serialize)]
pub struct CustomFieldsPatch<'a> {
    pub custom_fields: &'a CustomFields,
}

#[derive(Debug, Serialize)]
pub struct CustomFieldBody<'a> {
    pub name: &'a str,
    pub label: &'a str,
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub object_types: Vec<&'static str>,
    pub ui_editable: &'static str,
    pub filter_logic: &'static str,
}

/// Cluster type and cluster group creation.
#[derive(Debug, Serialize)]
pub struct NamedBody<'a> {
    pub name: &'a str,
    pub slug: String,
    pub description: &'a str,
    pub custom_fields: &'a CustomFields,
}

#[derive(Debug, Serialize)]
pub struct ClusterBody<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub cluster_type: u64,
    pub group: u64,
    pub description: &'a str,
    pub custom_fields: &'a CustomFields,
}

/// NetBox slug for a name: lowercase ASCII alphanumerics, `-` and `_`.
///
/// A name with no ASCII alphanumerics gets a stable hash of the name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        return format!("x-{:08x}", fnv1a(name.trim()));
    }
    slug.to_string()
}

/// 32-bit FNV-1a, stable across builds and platforms.
fn fnv1a(s: &str) -> u32 {
    s.bytes().fold(0x811c_9dc5, |hash, b| {
        (hash ^ u32::from(b)).wrapping_mul(0x0100_0193)
    })
}

/// DRF renders decimals as numbers or strings depending on settings.
fn decimal<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn nullable_map<'de, D>(deserializer: D) -> Result<CustomFields, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<CustomFields>::deserialize(deserializer)?.unwrap_or_default())
}
