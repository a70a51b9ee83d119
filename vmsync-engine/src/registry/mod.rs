//! Registry contract.
//!
//! The trait abstracts the inventory-of-record so the engine works with
//! domain records instead of HTTP calls. Get-or-create helpers and
//! exhaustive pagination are provided on top of the primitive operations.

pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use tracing::info;

pub use error::{RegistryError, Result};
pub use memory::{Fault, MemoryRegistry, Mutation};
pub use types::*;

#[async_trait]
pub trait Registry: Send + Sync {
    // -------------------------------------------------------------------------
    // Virtual machines
    // -------------------------------------------------------------------------

    /// Fetch one page of VMs matching `filter`. `page` is the continuation
    /// pointer returned by the previous page, `None` for the first one.
    async fn search_vms_page(
        &self,
        filter: &VmFilter,
        page: Option<&PageToken>,
    ) -> Result<Page<RegistryVm>>;

    /// Get a VM by ID.
    async fn get_vm(&self, id: u64) -> Result<Option<RegistryVm>>;

    /// Create a VM.
    async fn add_vm(&self, req: NewVm) -> Result<RegistryVm>;

    /// Apply a partial update to a VM.
    async fn update_vm(&self, id: u64, update: &VmUpdate) -> Result<()>;

    /// Delete a VM. Interfaces and addresses go with it.
    async fn delete_vm(&self, id: u64) -> Result<()>;

    // -------------------------------------------------------------------------
    // Interfaces and addresses
    // -------------------------------------------------------------------------

    /// List the interfaces of a VM.
    async fn list_interfaces(&self, vm_id: u64) -> Result<Vec<RegistryInterface>>;

    /// Create a VM interface.
    async fn add_interface(&self, req: NewInterface) -> Result<RegistryInterface>;

    /// Apply a partial update to an interface.
    async fn update_interface(&self, id: u64, update: &InterfaceUpdate) -> Result<()>;

    /// List the IP addresses assigned to any interface of a VM.
    async fn list_ip_addresses(&self, vm_id: u64) -> Result<Vec<RegistryIp>>;

    /// Create an IP address assigned to an interface.
    async fn add_ip_address(&self, req: NewIpAddress) -> Result<RegistryIp>;

    /// Merge custom field values into an object.
    async fn set_custom_fields(&self, object: ObjectRef, fields: &CustomFields) -> Result<()>;

    // -------------------------------------------------------------------------
    // Schema and classification
    // -------------------------------------------------------------------------

    async fn custom_field_exists(&self, name: &str) -> Result<bool>;

    async fn add_custom_field(&self, spec: &CustomFieldSpec) -> Result<()>;

    async fn get_cluster_type(&self, name: &str) -> Result<Option<ClusterType>>;

    async fn add_cluster_type(
        &self,
        name: &str,
        custom_fields: &CustomFields,
    ) -> Result<ClusterType>;

    async fn get_cluster_group(&self, name: &str) -> Result<Option<ClusterGroup>>;

    async fn add_cluster_group(&self, req: NewClusterGroup) -> Result<ClusterGroup>;

    /// Get a cluster by name within a cluster group.
    async fn get_cluster(&self, name: &str, group_id: u64) -> Result<Option<RegistryCluster>>;

    async fn add_cluster(&self, req: NewCluster) -> Result<RegistryCluster>;

    // -------------------------------------------------------------------------
    // Provided
    // -------------------------------------------------------------------------

    /// Fetch every VM matching `filter`, following continuation pointers
    /// until the result set is exhausted.
    async fn search_vms(&self, filter: &VmFilter) -> Result<Vec<RegistryVm>> {
        let mut vms = Vec::new();
        let mut page = self.search_vms_page(filter, None).await?;
        loop {
            let Page { items, next } = page;
            vms.extend(items);
            match next {
                Some(token) => page = self.search_vms_page(filter, Some(&token)).await?,
                None => break,
            }
        }
        Ok(vms)
    }

    /// Create a custom field unless it already exists. Returns `true` when
    /// the field was created.
    async fn ensure_custom_field(&self, spec: &CustomFieldSpec) -> Result<bool> {
        if self.custom_field_exists(&spec.name).await? {
            return Ok(false);
        }
        info!(field = %spec.name, "Creating custom field");
        self.add_custom_field(spec).await?;
        Ok(true)
    }

    async fn ensure_cluster_type(
        &self,
        name: &str,
        custom_fields: &CustomFields,
    ) -> Result<ClusterType> {
        if let Some(existing) = self.get_cluster_type(name).await? {
            return Ok(existing);
        }
        info!(cluster_type = %name, "Creating cluster type");
        self.add_cluster_type(name, custom_fields).await
    }

    async fn ensure_cluster_group(&self, req: NewClusterGroup) -> Result<ClusterGroup> {
        if let Some(existing) = self.get_cluster_group(&req.name).await? {
            return Ok(existing);
        }
        info!(cluster_group = %req.name, "Creating cluster group");
        self.add_cluster_group(req).await
    }

    async fn ensure_cluster(&self, req: NewCluster) -> Result<RegistryCluster> {
        if let Some(existing) = self.get_cluster(&req.name, req.group_id).await? {
            return Ok(existing);
        }
        info!(cluster = %req.name, group_id = req.group_id, "Creating cluster");
        self.add_cluster(req).await
    }
}
