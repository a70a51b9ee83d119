//! VMware vCenter as a VM source.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use vmsync_engine::provider::Result;
use vmsync_engine::{Cluster, Datacenter, Nic, Provider, Vm, VmStatus};

use crate::client::VcenterClient;
use crate::models::*;

/// Provider name tagged on synced records.
pub const PROVIDER_NAME: &str = "VMWare";

const POWERED_ON: &str = "POWERED_ON";

pub struct VmwareProvider {
    client: VcenterClient,
}

impl VmwareProvider {
    /// Connect to vCenter and open a session.
    pub async fn connect(url: &str, username: &str, password: &str, insecure_tls: bool) -> Result<Self> {
        info!(user = username, "Connecting to vCenter");
        let client = VcenterClient::new(url, username, password, insecure_tls)?;
        client.login().await?;
        Ok(Self { client })
    }

    async fn vm_info(&self, vm_id: &str) -> Result<VmInfo> {
        self.client
            .get(&format!("/vcenter/vm/{}", vm_id), &[] as &[(&str, &str)])
            .await
    }

    async fn guest_interfaces(&self, vm_id: &str) -> Result<Vec<GuestInterface>> {
        self.client
            .get(
                &format!("/vcenter/vm/{}/guest/networking/interfaces", vm_id),
                &[] as &[(&str, &str)],
            )
            .await
    }
}

#[async_trait]
impl Provider for VmwareProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn list_datacenters(&self) -> Result<Vec<Datacenter>> {
        let dcs: Vec<DatacenterSummary> = self
            .client
            .get("/vcenter/datacenter", &[] as &[(&str, &str)])
            .await?;
        Ok(dcs
            .into_iter()
            .map(|dc| Datacenter {
                id: dc.datacenter,
                name: dc.name,
                description: String::new(),
            })
            .collect())
    }

    async fn list_clusters(&self, datacenter_id: &str) -> Result<Vec<Cluster>> {
        let clusters: Vec<ClusterSummary> = self
            .client
            .get("/vcenter/cluster", &[("datacenters", datacenter_id)])
            .await?;
        Ok(clusters
            .into_iter()
            .map(|c| Cluster {
                id: c.cluster,
                name: c.name,
                description: String::new(),
            })
            .collect())
    }

    async fn list_cluster_vms(&self, cluster_id: &str) -> Result<Vec<Vm>> {
        let summaries: Vec<VmSummary> = self
            .client
            .get("/vcenter/vm", &[("clusters", cluster_id)])
            .await?;

        let mut vms = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let mut vm = vm_from_summary(&summary);
            let info = match self.vm_info(&summary.vm).await {
                Ok(info) => info,
                Err(e) => {
                    warn!(vm = %summary.name, error = %e, "Failed to get VM details");
                    vms.push(vm);
                    continue;
                }
            };
            let guest = match self.guest_interfaces(&summary.vm).await {
                Ok(guest) => guest,
                // Powered off or no VMware Tools
                Err(e) => {
                    debug!(vm = %summary.name, error = %e, "Guest networking unavailable");
                    Vec::new()
                }
            };
            vm.disk_gb = info.disk_gb();
            vm.network = nics_from_info(&info, &guest);
            vms.push(vm);
        }
        Ok(vms)
    }
}

fn vm_from_summary(summary: &VmSummary) -> Vm {
    Vm {
        id: summary.vm.clone(),
        name: summary.name.clone(),
        description: String::new(),
        memory_mb: summary.memory_size_mib.unwrap_or(0),
        disk_gb: 0,
        vcpus: summary.cpu_count.map(f64::from).unwrap_or(0.0),
        status: if summary.power_state == POWERED_ON {
            VmStatus::Active
        } else {
            VmStatus::Offline
        },
        network: Vec::new(),
    }
}

/// NICs of a VM keyed by device key, with the addresses the guest reports
/// for the same MAC.
fn nics_from_info(info: &VmInfo, guest: &[GuestInterface]) -> Vec<Nic> {
    info.nics
        .iter()
        .map(|(key, nic)| {
            let mac = nic.mac_address.as_deref().map(str::to_uppercase);
            let ips = nic
                .mac_address
                .as_deref()
                .map(|mac| {
                    guest
                        .iter()
                        .filter(|g| {
                            g.mac_address
                                .as_deref()
                                .is_some_and(|m| m.eq_ignore_ascii_case(mac))
                        })
                        .flat_map(|g| g.ip.iter().flat_map(|ip| ip.ip_addresses.iter()))
                        .map(|ip| format!("{}/{}", ip.ip_address, ip.prefix_length))
                        .collect()
                })
                .unwrap_or_default();
            Nic {
                id: key.clone(),
                name: nic.label.clone(),
                mac,
                ips,
                description: nic.description(),
            }
        })
        .collect()
}
