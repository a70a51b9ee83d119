//! Registry records and request DTOs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::VmStatus;

/// Custom field holding the provider-native ID of a VM or interface.
pub const VMID_FIELD: &str = "vmid";
/// Custom field holding the provider name.
pub const VMPROVIDER_FIELD: &str = "vmprovider";

/// Custom field values keyed by field name.
pub type CustomFields = BTreeMap<String, Value>;

/// Read a custom field as a non-empty string.
///
/// Numbers are rendered as text; null, empty strings and other JSON types
/// count as unset.
pub fn custom_field_str(fields: &CustomFields, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Cross-system identity stamped on registry objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub vmid: String,
    pub provider: String,
}

impl Identity {
    pub fn new(vmid: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            vmid: vmid.into(),
            provider: provider.into(),
        }
    }

    /// The `vmid`/`vmprovider` pair as custom field values.
    pub fn custom_fields(&self) -> CustomFields {
        let mut fields = CustomFields::new();
        fields.insert(VMID_FIELD.to_string(), Value::String(self.vmid.clone()));
        fields.insert(
            VMPROVIDER_FIELD.to_string(),
            Value::String(self.provider.clone()),
        );
        fields
    }
}

// =============================================================================
// Object references
// =============================================================================

/// Kinds of registry objects the engine touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    VirtualMachine,
    VmInterface,
    IpAddress,
    Cluster,
    ClusterGroup,
    ClusterType,
}

impl ObjectType {
    /// Registry content type (`app_label.model`).
    pub fn content_type(&self) -> &'static str {
        match self {
            ObjectType::VirtualMachine => "virtualization.virtualmachine",
            ObjectType::VmInterface => "virtualization.vminterface",
            ObjectType::IpAddress => "ipam.ipaddress",
            ObjectType::Cluster => "virtualization.cluster",
            ObjectType::ClusterGroup => "virtualization.clustergroup",
            ObjectType::ClusterType => "virtualization.clustertype",
        }
    }
}

/// A typed reference to a single registry object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub kind: ObjectType,
    pub id: u64,
}

impl ObjectRef {
    pub fn vm(id: u64) -> Self {
        Self {
            kind: ObjectType::VirtualMachine,
            id,
        }
    }

    pub fn interface(id: u64) -> Self {
        Self {
            kind: ObjectType::VmInterface,
            id,
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// A VM record held by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryVm {
    pub id: u64,
    pub name: String,
    pub cluster_id: Option<u64>,
    /// `None` when the registry holds a status outside `VmStatus`.
    pub status: Option<VmStatus>,
    pub memory_mb: Option<u64>,
    pub disk_gb: Option<u64>,
    pub vcpus: Option<f64>,
    pub description: String,
    pub custom_fields: CustomFields,
    pub last_updated: Option<DateTime<Utc>>,
}

impl RegistryVm {
    pub fn vmid(&self) -> Option<String> {
        custom_field_str(&self.custom_fields, VMID_FIELD)
    }

    pub fn vmprovider(&self) -> Option<String> {
        custom_field_str(&self.custom_fields, VMPROVIDER_FIELD)
    }
}

/// A VM interface record.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryInterface {
    pub id: u64,
    pub vm_id: u64,
    pub name: String,
    pub mac_address: Option<String>,
    pub description: String,
    pub custom_fields: CustomFields,
}

impl RegistryInterface {
    pub fn vmid(&self) -> Option<String> {
        custom_field_str(&self.custom_fields, VMID_FIELD)
    }
}

/// An IP address record, optionally assigned to a VM interface.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryIp {
    pub id: u64,
    /// Address in CIDR notation.
    pub address: String,
    pub interface_id: Option<u64>,
    pub description: String,
    pub custom_fields: CustomFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterGroup {
    pub id: u64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterType {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryCluster {
    pub id: u64,
    pub name: String,
    pub group_id: Option<u64>,
    pub type_id: Option<u64>,
}

// =============================================================================
// Request DTOs
// =============================================================================

/// Request to create a VM record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVm {
    pub name: String,
    pub cluster_id: u64,
    pub status: VmStatus,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub vcpus: f64,
    pub description: String,
    pub custom_fields: CustomFields,
}

/// Partial VM update. `name` is always sent; every other field only when it
/// changed.
#[derive(Debug, Clone, PartialEq)]
pub struct VmUpdate {
    pub name: String,
    pub status: Option<VmStatus>,
    pub memory_mb: Option<u64>,
    pub disk_gb: Option<u64>,
    pub vcpus: Option<f64>,
}

impl VmUpdate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: None,
            memory_mb: None,
            disk_gb: None,
            vcpus: None,
        }
    }

    /// Names of the optional fields carried by this update.
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.status.is_some() {
            fields.push("status");
        }
        if self.memory_mb.is_some() {
            fields.push("memory");
        }
        if self.disk_gb.is_some() {
            fields.push("disk");
        }
        if self.vcpus.is_some() {
            fields.push("vcpus");
        }
        fields
    }
}

/// Request to create a VM interface.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInterface {
    pub vm_id: u64,
    pub name: String,
    pub mac_address: Option<String>,
    pub description: String,
    pub custom_fields: CustomFields,
}

/// Partial interface update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterfaceUpdate {
    pub mac_address: Option<String>,
}

/// Request to create an IP address assigned to a VM interface.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIpAddress {
    pub address: String,
    pub interface_id: u64,
    pub custom_fields: CustomFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewClusterGroup {
    pub name: String,
    pub description: String,
    pub custom_fields: CustomFields,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCluster {
    pub name: String,
    pub group_id: u64,
    pub type_id: u64,
    pub description: String,
    pub custom_fields: CustomFields,
}

/// Definition of a custom field the engine depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFieldSpec {
    pub name: String,
    pub label: String,
    pub read_only: bool,
    pub object_types: Vec<ObjectType>,
}

// =============================================================================
// Search
// =============================================================================

/// Filter for VM searches. All set criteria must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmFilter {
    pub cluster_id: Option<u64>,
    pub name: Option<String>,
    pub custom_fields: BTreeMap<String, String>,
}

impl VmFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_cluster(mut self, cluster_id: u64) -> Self {
        self.cluster_id = Some(cluster_id);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn custom_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_fields.insert(field.into(), value.into());
        self
    }

    /// Evaluate the filter against a record.
    pub fn matches(&self, vm: &RegistryVm) -> bool {
        if let Some(cluster_id) = self.cluster_id {
            if vm.cluster_id != Some(cluster_id) {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if &vm.name != name {
                return false;
            }
        }
        self.custom_fields.iter().all(|(field, value)| {
            custom_field_str(&vm.custom_fields, field).as_deref() == Some(value.as_str())
        })
    }
}

/// Opaque continuation pointer for paginated searches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(pub String);

/// One page of search results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageToken>,
}
