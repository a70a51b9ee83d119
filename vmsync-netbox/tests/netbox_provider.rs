//! NetBox as a VM source.

mod common;

use common::{MockNetBox, TOKEN};
use serde_json::json;
use vmsync_engine::{Provider, VmStatus};
use vmsync_netbox::{NetBoxClient, NetBoxProvider};

struct Topology {
    dc1: u64,
    dc2: u64,
    c1: u64,
    c2: u64,
}

/// dc1/c1 holds an active VM with one NIC; dc2/c2 holds an active and an
/// offline VM.
fn seed(server: &MockNetBox) -> Topology {
    let ct = server.insert(
        "virtualization/cluster-types",
        json!({"name": "Proxmox", "slug": "proxmox"}),
    );
    let dc1 = server.insert(
        "virtualization/cluster-groups",
        json!({"name": "dc1", "slug": "dc1", "description": "first"}),
    );
    let dc2 = server.insert(
        "virtualization/cluster-groups",
        json!({"name": "dc2", "slug": "dc2", "description": "second"}),
    );
    let c1 = server.insert(
        "virtualization/clusters",
        json!({"name": "c1", "group": dc1, "type": ct}),
    );
    let c2 = server.insert(
        "virtualization/clusters",
        json!({"name": "c2", "group": dc2, "type": ct}),
    );

    let web = server.insert(
        "virtualization/virtual-machines",
        json!({"name": "web", "cluster": c1, "status": "staged", "memory": 1024, "disk": 10, "vcpus": 2.0}),
    );
    let eth0 = server.insert(
        "virtualization/interfaces",
        json!({"name": "eth0", "virtual_machine": web, "mac_address": "AA:BB:CC:DD:EE:01"}),
    );
    server.insert(
        "virtualization/interfaces",
        json!({"name": "eth1", "virtual_machine": web}),
    );
    server.insert(
        "ipam/ip-addresses",
        json!({"address": "10.0.0.1/24", "assigned_object_type": "virtualization.vminterface", "assigned_object_id": eth0}),
    );
    server.insert(
        "ipam/ip-addresses",
        json!({"address": "10.0.0.2/24", "assigned_object_type": "virtualization.vminterface", "assigned_object_id": eth0}),
    );

    server.insert(
        "virtualization/virtual-machines",
        json!({"name": "app", "cluster": c2, "status": "active", "memory": 4096, "disk": 50, "vcpus": "4.00"}),
    );
    server.insert(
        "virtualization/virtual-machines",
        json!({"name": "old", "cluster": c2, "status": "offline", "memory": 512, "disk": 5, "vcpus": 1}),
    );

    Topology { dc1, dc2, c1, c2 }
}

#[tokio::test]
async fn test_unfiltered_topology() {
    let server = MockNetBox::spawn().await;
    let t = seed(&server);
    let client = NetBoxClient::new(&server.url, TOKEN).unwrap();
    let provider = NetBoxProvider::new(client, None).await.unwrap();

    assert_eq!(provider.name(), "Netbox");

    let datacenters = provider.list_datacenters().await.unwrap();
    let ids: Vec<_> = datacenters.iter().map(|dc| dc.id.clone()).collect();
    assert_eq!(ids, vec![t.dc1.to_string(), t.dc2.to_string()]);
    assert_eq!(datacenters[0].description, "first");

    let clusters = provider.list_clusters(&t.dc1.to_string()).await.unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].name, "c1");

    let vms = provider.list_cluster_vms(&t.c1.to_string()).await.unwrap();
    assert_eq!(vms.len(), 1);
    let web = &vms[0];
    assert_eq!(web.name, "web");
    assert_eq!(web.status, VmStatus::Staged);
    assert_eq!(web.memory_mb, 1024);
    assert_eq!(web.vcpus, 2.0);
    assert_eq!(web.network.len(), 2);
    assert_eq!(web.network[0].name, "eth0");
    assert_eq!(web.network[0].mac.as_deref(), Some("AA:BB:CC:DD:EE:01"));
    assert_eq!(web.network[0].ips, vec!["10.0.0.1/24", "10.0.0.2/24"]);
    assert!(web.network[1].ips.is_empty());
    assert_eq!(web.network[1].mac, None);

    let vms = provider.list_cluster_vms(&t.c2.to_string()).await.unwrap();
    assert_eq!(vms.len(), 2);
    assert_eq!(vms[0].vcpus, 4.0);
}

#[tokio::test]
async fn test_filter_derives_groups_and_clusters() {
    let server = MockNetBox::spawn().await;
    let t = seed(&server);
    let client = NetBoxClient::new(&server.url, TOKEN).unwrap();
    let provider = NetBoxProvider::new(client, Some("status=active"))
        .await
        .unwrap();

    // Groups never match the filter themselves; dc2 comes from the active VM
    let datacenters = provider.list_datacenters().await.unwrap();
    assert_eq!(datacenters.len(), 1);
    assert_eq!(datacenters[0].id, t.dc2.to_string());
    assert_eq!(datacenters[0].name, "dc2");

    assert!(provider.list_clusters(&t.dc1.to_string()).await.unwrap().is_empty());
    let clusters = provider.list_clusters(&t.dc2.to_string()).await.unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].id, t.c2.to_string());

    // The cluster does not match the filter, so the VMs are filtered
    let vms = provider.list_cluster_vms(&t.c2.to_string()).await.unwrap();
    assert_eq!(vms.len(), 1);
    assert_eq!(vms[0].name, "app");
    assert_eq!(vms[0].status, VmStatus::Active);
}

#[tokio::test]
async fn test_rejected_token_fails_listing() {
    let server = MockNetBox::spawn().await;
    let client = NetBoxClient::new(&server.url, "bad-token").unwrap();
    let provider = NetBoxProvider::new(client, None).await.unwrap();

    let err = provider.list_datacenters().await.unwrap_err();
    assert!(matches!(err, vmsync_engine::ProviderError::Auth(_)));
}
