//! Schema bootstrap - custom fields and the provider's cluster type.

use std::sync::Arc;

use tracing::{error, info};

use crate::registry::{
    ClusterType, CustomFieldSpec, CustomFields, ObjectType, Registry, RegistryError,
    VMID_FIELD, VMPROVIDER_FIELD,
};

/// Object types carrying the identity custom fields.
const IDENTITY_OBJECT_TYPES: [ObjectType; 6] = [
    ObjectType::VirtualMachine,
    ObjectType::IpAddress,
    ObjectType::Cluster,
    ObjectType::ClusterGroup,
    ObjectType::VmInterface,
    ObjectType::ClusterType,
];

/// Custom fields the engine relies on.
pub fn required_custom_fields() -> Vec<CustomFieldSpec> {
    vec![
        CustomFieldSpec {
            name: VMID_FIELD.to_string(),
            label: "Provider VM ID".to_string(),
            read_only: true,
            object_types: IDENTITY_OBJECT_TYPES.to_vec(),
        },
        CustomFieldSpec {
            name: VMPROVIDER_FIELD.to_string(),
            label: "Virtualization Provider".to_string(),
            read_only: true,
            object_types: IDENTITY_OBJECT_TYPES.to_vec(),
        },
    ]
}

/// Ensures the registry schema exists before a sync pass.
pub struct SchemaBootstrapper {
    registry: Arc<dyn Registry>,
    provider: String,
}

impl SchemaBootstrapper {
    pub fn new(registry: Arc<dyn Registry>, provider: impl Into<String>) -> Self {
        Self {
            registry,
            provider: provider.into(),
        }
    }

    /// Ensure both custom fields and the provider's cluster type.
    ///
    /// Every field is attempted even if an earlier one fails; the first
    /// error is returned.
    pub async fn bootstrap(&self) -> Result<ClusterType, RegistryError> {
        let mut first_error = None;
        for spec in required_custom_fields() {
            match self.registry.ensure_custom_field(&spec).await {
                Ok(true) => info!(field = %spec.name, "Custom field created"),
                Ok(false) => {}
                Err(e) => {
                    error!(field = %spec.name, error = %e, "Failed to ensure custom field");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut tags = CustomFields::new();
        tags.insert(
            VMPROVIDER_FIELD.to_string(),
            serde_json::Value::String(self.provider.clone()),
        );
        self.registry.ensure_cluster_type(&self.provider, &tags).await
    }
}
