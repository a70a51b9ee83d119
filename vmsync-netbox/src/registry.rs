//! `Registry` implementation on top of the NetBox REST API.

use async_trait::async_trait;
use vmsync_engine::registry::{
    ClusterGroup, ClusterType, CustomFieldSpec, CustomFields, InterfaceUpdate, NewCluster,
    NewClusterGroup, NewInterface, NewIpAddress, NewVm, ObjectRef, ObjectType, Page, PageToken,
    Registry, RegistryCluster, RegistryError, RegistryInterface, RegistryIp, RegistryVm, Result,
    VmFilter, VmUpdate,
};

use crate::client::NetBoxClient;
use crate::models::*;

pub(crate) const VMS: &str = "virtualization/virtual-machines/";
pub(crate) const INTERFACES: &str = "virtualization/interfaces/";
pub(crate) const IP_ADDRESSES: &str = "ipam/ip-addresses/";
pub(crate) const CLUSTERS: &str = "virtualization/clusters/";
pub(crate) const CLUSTER_GROUPS: &str = "virtualization/cluster-groups/";
pub(crate) const CLUSTER_TYPES: &str = "virtualization/cluster-types/";
const CUSTOM_FIELDS: &str = "extras/custom-fields/";

const SEARCH_PAGE_SIZE: u32 = 100;

/// Numeric suffixes tried before giving up on a taken slug.
const MAX_SLUG_SUFFIX: u32 = 100;

fn object_path(kind: ObjectType) -> &'static str {
    match kind {
        ObjectType::VirtualMachine => VMS,
        ObjectType::VmInterface => INTERFACES,
        ObjectType::IpAddress => IP_ADDRESSES,
        ObjectType::Cluster => CLUSTERS,
        ObjectType::ClusterGroup => CLUSTER_GROUPS,
        ObjectType::ClusterType => CLUSTER_TYPES,
    }
}

/// Query parameters for a VM search.
fn vm_query(filter: &VmFilter) -> Vec<(String, String)> {
    let mut query = vec![("limit".to_string(), SEARCH_PAGE_SIZE.to_string())];
    if let Some(cluster_id) = filter.cluster_id {
        query.push(("cluster_id".to_string(), cluster_id.to_string()));
    }
    if let Some(name) = &filter.name {
        query.push(("name".to_string(), name.clone()));
    }
    for (field, value) in &filter.custom_fields {
        query.push((format!("cf_{}", field), value.clone()));
    }
    query
}

impl NetBoxClient {
    /// A slug for `name` that no object on `path` uses yet.
    ///
    /// Names that differ only in case or punctuation ("DC 1", "dc-1")
    /// slugify alike; later ones get a `-2`, `-3`, ... suffix.
    async fn free_slug(&self, path: &str, name: &str) -> Result<String> {
        let base = slugify(name);
        for n in 1..=MAX_SLUG_SUFFIX {
            let candidate = if n == 1 {
                base.clone()
            } else {
                format!("{}-{}", base, n)
            };
            let page: Paginated<serde_json::Value> = self
                .list_page(path, &[("slug", candidate.as_str()), ("limit", "1")])
                .await?;
            if page.results.is_empty() {
                return Ok(candidate);
            }
        }
        Err(RegistryError::Api {
            status: 400,
            message: format!("no free slug for {:?} on {}", name, path),
        })
    }
}

#[async_trait]
impl Registry for NetBoxClient {
    async fn search_vms_page(
        &self,
        filter: &VmFilter,
        page: Option<&PageToken>,
    ) -> Result<Page<RegistryVm>> {
        let page: Paginated<VirtualMachine> = match page {
            Some(token) => self.next_page(&token.0).await?,
            None => self.list_page(VMS, &vm_query(filter)).await?,
        };
        Ok(Page {
            items: page.results.into_iter().map(RegistryVm::from).collect(),
            next: page.next.map(PageToken),
        })
    }

    async fn get_vm(&self, id: u64) -> Result<Option<RegistryVm>> {
        let vm: Option<VirtualMachine> = self.get(&format!("{}{}/", VMS, id)).await?;
        Ok(vm.map(RegistryVm::from))
    }

    async fn add_vm(&self, req: NewVm) -> Result<RegistryVm> {
        let body = VmBody {
            name: &req.name,
            cluster: Some(req.cluster_id),
            status: Some(req.status.as_str()),
            memory: Some(req.memory_mb),
            disk: Some(req.disk_gb),
            vcpus: Some(req.vcpus),
            description: Some(&req.description),
            custom_fields: Some(&req.custom_fields),
        };
        let vm: VirtualMachine = self.post(VMS, &body).await?;
        Ok(vm.into())
    }

    async fn update_vm(&self, id: u64, update: &VmUpdate) -> Result<()> {
        let body = VmBody {
            name: &update.name,
            cluster: None,
            status: update.status.map(|s| s.as_str()),
            memory: update.memory_mb,
            disk: update.disk_gb,
            vcpus: update.vcpus,
            description: None,
            custom_fields: None,
        };
        self.patch(&format!("{}{}/", VMS, id), &body).await
    }

    async fn delete_vm(&self, id: u64) -> Result<()> {
        self.delete(&format!("{}{}/", VMS, id)).await
    }

    async fn list_interfaces(&self, vm_id: u64) -> Result<Vec<RegistryInterface>> {
        let interfaces: Vec<VmInterface> = self
            .list(INTERFACES, &[("virtual_machine_id", vm_id)])
            .await?;
        Ok(interfaces.into_iter().map(Into::into).collect())
    }

    async fn add_interface(&self, req: NewInterface) -> Result<RegistryInterface> {
        let body = InterfaceBody {
            virtual_machine: req.vm_id,
            name: &req.name,
            mac_address: req.mac_address.as_deref(),
            description: &req.description,
            custom_fields: &req.custom_fields,
        };
        let interface: VmInterface = self.post(INTERFACES, &body).await?;
        Ok(interface.into())
    }

    async fn update_interface(&self, id: u64, update: &InterfaceUpdate) -> Result<()> {
        let body = InterfacePatch {
            mac_address: update.mac_address.as_deref(),
        };
        self.patch(&format!("{}{}/", INTERFACES, id), &body).await
    }

    async fn list_ip_addresses(&self, vm_id: u64) -> Result<Vec<RegistryIp>> {
        let ips: Vec<IpAddress> = self
            .list(IP_ADDRESSES, &[("virtual_machine_id", vm_id)])
            .await?;
        Ok(ips.into_iter().map(Into::into).collect())
    }

    async fn add_ip_address(&self, req: NewIpAddress) -> Result<RegistryIp> {
        let body = IpAddressBody {
            address: &req.address,
            assigned_object_type: VM_INTERFACE_TYPE,
            assigned_object_id: req.interface_id,
            custom_fields: &req.custom_fields,
        };
        let ip: IpAddress = self.post(IP_ADDRESSES, &body).await?;
        Ok(ip.into())
    }

    async fn set_custom_fields(&self, object: ObjectRef, fields: &CustomFields) -> Result<()> {
        let path = format!("{}{}/", object_path(object.kind), object.id);
        self.patch(&path, &CustomFieldsPatch {
            custom_fields: fields,
        })
        .await
    }

    async fn custom_field_exists(&self, name: &str) -> Result<bool> {
        let page: Paginated<NbCustomField> =
            self.list_page(CUSTOM_FIELDS, &[("name", name)]).await?;
        Ok(page.results.iter().any(|f| f.name == name))
    }

    async fn add_custom_field(&self, spec: &CustomFieldSpec) -> Result<()> {
        let body = CustomFieldBody {
            name: &spec.name,
            label: &spec.label,
            field_type: "text",
            object_types: spec.object_types.iter().map(|t| t.content_type()).collect(),
            ui_editable: if spec.read_only { "no" } else { "yes" },
            filter_logic: "exact",
        };
        let _: Created = self.post(CUSTOM_FIELDS, &body).await?;
        Ok(())
    }

    async fn get_cluster_type(&self, name: &str) -> Result<Option<ClusterType>> {
        let types: Vec<NbClusterType> = self.list(CLUSTER_TYPES, &[("name", name)]).await?;
        Ok(types.into_iter().find(|t| t.name == name).map(Into::into))
    }

    async fn add_cluster_type(
        &self,
        name: &str,
        custom_fields: &CustomFields,
    ) -> Result<ClusterType> {
        let body = NamedBody {
            name,
            slug: self.free_slug(CLUSTER_TYPES, name).await?,
            description: "",
            custom_fields,
        };
        let cluster_type: NbClusterType = self.post(CLUSTER_TYPES, &body).await?;
        Ok(cluster_type.into())
    }

    async fn get_cluster_group(&self, name: &str) -> Result<Option<ClusterGroup>> {
        let groups: Vec<NbClusterGroup> = self.list(CLUSTER_GROUPS, &[("name", name)]).await?;
        Ok(groups.into_iter().find(|g| g.name == name).map(Into::into))
    }

    async fn add_cluster_group(&self, req: NewClusterGroup) -> Result<ClusterGroup> {
        let body = NamedBody {
            name: &req.name,
            slug: self.free_slug(CLUSTER_GROUPS, &req.name).await?,
            description: &req.description,
            custom_fields: &req.custom_fields,
        };
        let group: NbClusterGroup = self.post(CLUSTER_GROUPS, &body).await?;
        Ok(group.into())
    }

    async fn get_cluster(&self, name: &str, group_id: u64) -> Result<Option<RegistryCluster>> {
        let group_id = group_id.to_string();
        let clusters: Vec<NbCluster> = self
            .list(CLUSTERS, &[("name", name), ("group_id", group_id.as_str())])
            .await?;
        Ok(clusters
            .into_iter()
            .map(RegistryCluster::from)
            .find(|c| c.name == name))
    }

    async fn add_cluster(&self, req: NewCluster) -> Result<RegistryCluster> {
        let body = ClusterBody {
            name: &req.name,
            cluster_type: req.type_id,
            group: req.group_id,
            description: &req.description,
            custom_fields: &req.custom_fields,
        };
        let cluster: NbCluster = self.post(CLUSTERS, &body).await?;
        Ok(cluster.into())
    }
}
