//! NetBox as a VM source.
//!
//! Datacenters are cluster groups and clusters are NetBox clusters. With a
//! query filter, the groups and clusters of every VM matching the filter
//! are added even when the group or cluster itself does not match.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::{info, warn};
use vmsync_engine::provider::{ProviderError, Result};
use vmsync_engine::registry::RegistryError;
use vmsync_engine::{Cluster, Datacenter, Nic, Provider, Vm, VmStatus};

use crate::client::NetBoxClient;
use crate::models::*;
use crate::registry::{CLUSTER_GROUPS, CLUSTERS, INTERFACES, IP_ADDRESSES, VMS};

/// Provider name tagged on synced records.
pub const PROVIDER_NAME: &str = "Netbox";

/// A cluster found through a filtered VM, with the ID of its group.
#[derive(Debug, Clone)]
struct DerivedCluster {
    group_id: String,
    cluster: Cluster,
}

pub struct NetBoxProvider {
    client: NetBoxClient,
    filter: Vec<(String, String)>,
    derived_datacenters: Vec<Datacenter>,
    derived_clusters: Vec<DerivedCluster>,
}

impl NetBoxProvider {
    /// Create the provider. `filter` is a NetBox query string such as
    /// `tag=prod&site=fra1`.
    pub async fn new(client: NetBoxClient, filter: Option<&str>) -> Result<Self> {
        let mut provider = Self {
            client,
            filter: parse_filter(filter.unwrap_or_default()),
            derived_datacenters: Vec::new(),
            derived_clusters: Vec::new(),
        };
        if !provider.filter.is_empty() {
            provider.derive_groups_and_clusters().await?;
        }
        Ok(provider)
    }

    fn query(&self, base: &[(&str, String)]) -> Vec<(String, String)> {
        base.iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .chain(self.filter.iter().cloned())
            .collect()
    }

    /// Collect the clusters and cluster groups of all filtered VMs.
    async fn derive_groups_and_clusters(&mut self) -> Result<()> {
        let vms: Vec<VirtualMachine> = self
            .client
            .list(VMS, &self.filter)
            .await
            .map_err(provider_error)?;
        let cluster_ids: BTreeMap<u64, ()> = vms
            .iter()
            .filter_map(|vm| vm.cluster.as_ref().map(|c| (c.id, ())))
            .collect();

        let mut groups = BTreeMap::new();
        for cluster_id in cluster_ids.keys() {
            let cluster: Option<NbCluster> = self
                .client
                .get(&format!("{}{}/", CLUSTERS, cluster_id))
                .await
                .map_err(provider_error)?;
            let Some(cluster) = cluster else {
                warn!(cluster_id, "Cluster of filtered VM not found");
                continue;
            };
            let Some(group) = cluster.group else {
                warn!(cluster = %cluster.name, "Cluster of filtered VM has no group, skipping");
                continue;
            };
            self.derived_clusters.push(DerivedCluster {
                group_id: group.id.to_string(),
                cluster: Cluster {
                    id: cluster.id.to_string(),
                    name: cluster.name,
                    description: cluster.description,
                },
            });
            groups.insert(group.id, group);
        }

        self.derived_datacenters = groups
            .into_values()
            .map(|g| Datacenter {
                id: g.id.to_string(),
                name: g.name,
                description: g.display,
            })
            .collect();
        info!(
            datacenters = self.derived_datacenters.len(),
            clusters = self.derived_clusters.len(),
            "Derived topology from filtered VMs"
        );
        Ok(())
    }

    /// Interfaces and addresses of a VM as provider NICs.
    async fn load_network(&self, vm_id: u64) -> std::result::Result<Vec<Nic>, RegistryError> {
        let interfaces: Vec<VmInterface> = self
            .client
            .list(INTERFACES, &[("virtual_machine_id", vm_id)])
            .await?;
        let ips: Vec<IpAddress> = self
            .client
            .list(IP_ADDRESSES, &[("virtual_machine_id", vm_id)])
            .await?;

        let mut by_interface: HashMap<u64, Vec<String>> = HashMap::new();
        for ip in ips {
            if ip.assigned_object_type.as_deref() != Some(VM_INTERFACE_TYPE) {
                continue;
            }
            if let Some(interface_id) = ip.assigned_object_id {
                by_interface.entry(interface_id).or_default().push(ip.address);
            }
        }

        Ok(interfaces
            .into_iter()
            .map(|i| Nic {
                id: i.id.to_string(),
                ips: by_interface.remove(&i.id).unwrap_or_default(),
                name: i.name,
                mac: i.mac_address,
                description: i.description,
            })
            .collect())
    }
}

#[async_trait]
impl Provider for NetBoxProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list_datacenters(&self) -> Result<Vec<Datacenter>> {
        let groups: Vec<NbClusterGroup> = self
            .client
            .list(CLUSTER_GROUPS, &self.filter)
            .await
            .map_err(provider_error)?;
        let mut datacenters: Vec<Datacenter> = groups
            .into_iter()
            .map(|g| Datacenter {
                id: g.id.to_string(),
                name: g.name,
                description: g.description,
            })
            .collect();

        for derived in &self.derived_datacenters {
            if !datacenters.iter().any(|dc| dc.id == derived.id) {
                datacenters.push(derived.clone());
            }
        }
        Ok(datacenters)
    }

    async fn list_clusters(&self, datacenter_id: &str) -> Result<Vec<Cluster>> {
        let query = self.query(&[("group_id", datacenter_id.to_string())]);
        let found: Vec<NbCluster> = self
            .client
            .list(CLUSTERS, &query)
            .await
            .map_err(provider_error)?;
        let mut clusters: Vec<Cluster> = found
            .into_iter()
            .map(|c| Cluster {
                id: c.id.to_string(),
                name: c.name,
                description: c.description,
            })
            .collect();

        for derived in &self.derived_clusters {
            if derived.group_id == datacenter_id
                && !clusters.iter().any(|c| c.id == derived.cluster.id)
            {
                clusters.push(derived.cluster.clone());
            }
        }
        Ok(clusters)
    }

    async fn list_cluster_vms(&self, cluster_id: &str) -> Result<Vec<Vm>> {
        // A cluster matching the filter contributes all of its VMs
        let matching: Paginated<NbCluster> = self
            .client
            .list_page(CLUSTERS, &self.query(&[("id", cluster_id.to_string())]))
            .await
            .map_err(provider_error)?;
        let base = [("cluster_id", cluster_id.to_string())];
        let query = if matching.count > 0 {
            vec![("cluster_id".to_string(), cluster_id.to_string())]
        } else {
            self.query(&base)
        };

        let found: Vec<VirtualMachine> = self
            .client
            .list(VMS, &query)
            .await
            .map_err(provider_error)?;

        let mut vms = Vec::with_capacity(found.len());
        for vm in found {
            let network = match self.load_network(vm.id).await {
                Ok(network) => network,
                Err(e) => {
                    warn!(vm = %vm.name, error = %e, "Failed to load interfaces");
                    Vec::new()
                }
            };
            vms.push(Vm {
                id: vm.id.to_string(),
                // Statuses vmsync does not model read as offline on the source side
                status: vm.status().unwrap_or(VmStatus::Offline),
                name: vm.name,
                description: vm.description,
                memory_mb: vm.memory.unwrap_or(0),
                disk_gb: vm.disk.unwrap_or(0),
                vcpus: vm.vcpus.unwrap_or(0.0),
                network,
            });
        }
        Ok(vms)
    }
}

/// Split a query string into key/value pairs. Keys without a value are
/// dropped.
fn parse_filter(filter: &str) -> Vec<(String, String)> {
    filter
        .trim()
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub(crate) fn provider_error(e: RegistryError) -> ProviderError {
    match e {
        RegistryError::Api { status, message } if status == 401 || status == 403 => {
            ProviderError::Auth(message)
        }
        RegistryError::Api { status, message } => ProviderError::Api { status, message },
        RegistryError::NotFound(what) => ProviderError::Api {
            status: 404,
            message: what,
        },
        RegistryError::Transport(message) | RegistryError::Internal(message) => {
            ProviderError::Transport(message)
        }
        RegistryError::Decode(message) => ProviderError::Decode(message),
    }
}
