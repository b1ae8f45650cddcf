use macvnet_core::{AllocationResult, WorkloadIdentity};
use macvnet_link::*;
use macvnet_netns::NetNs;
use std::net::Ipv4Addr;
use std::path::Path;

const NETNS: &str = "/var/run/netns/cni-1234";

fn allocation() -> AllocationResult {
    AllocationResult {
        app_net: "app-a".to_string(),
        use_ip_list: Vec::new(),
        ip_address: Ipv4Addr::new(10, 0, 1, 5),
        gateway: Ipv4Addr::new(10, 0, 1, 1),
        vlan_id: 42,
        prefix_length: 24,
    }
}

#[tokio::test]
async fn test_provision_configure_and_remove() {
    let backend = MockLinkBackend::new();
    backend.add_host_link("eth0.42", 1500).await;
    backend.add_namespace(NETNS).await;

    let provisioner = Provisioner::new(backend.clone());
    let netns = backend
        .open_namespace(Path::new(NETNS))
        .await
        .unwrap()
        .unwrap();

    let config = AttachmentConfig::new("eth0.42", WorkloadIdentity::new("default", "nginx-test"))
        .with_mtu(1400);
    let iface = provisioner.create(&config, "net1", &netns).await.unwrap();

    backend
        .configure_address(&netns, &iface.name, &InterfaceAddress::from(&allocation()))
        .await
        .unwrap();

    let link = backend.link_in(Path::new(NETNS), "net1").await.unwrap();
    assert!(link.up);
    assert_eq!(link.mtu, 1400);
    assert_eq!(link.address.unwrap().address, Ipv4Addr::new(10, 0, 1, 5));
    assert_eq!(link.address.unwrap().gateway, Ipv4Addr::new(10, 0, 1, 1));

    assert!(provisioner.delete(&netns, "net1").await.unwrap());
    assert!(backend.links_in(Path::new(NETNS)).await.is_empty());
}

#[tokio::test]
async fn test_namespace_gone() {
    let backend = MockLinkBackend::new();
    backend.add_namespace(NETNS).await;
    let netns = backend
        .open_namespace(Path::new(NETNS))
        .await
        .unwrap()
        .unwrap();

    backend.remove_namespace(Path::new(NETNS)).await;

    assert!(
        backend
            .open_namespace(Path::new(NETNS))
            .await
            .unwrap()
            .is_none()
    );
    assert!(matches!(
        backend.delete_link(&netns, "eth0").await,
        Err(macvnet_core::Error::Namespace { .. })
    ));
}

#[tokio::test]
#[ignore] // Requires root
async fn test_netlink_create_in_current_namespace() {
    let backend = NetlinkBackend::connect().unwrap();
    let uplink = backend.default_route_interface().await.unwrap();
    let netns = NetNs::current().unwrap();

    let provisioner = Provisioner::new(backend);
    let config = AttachmentConfig::new(uplink, WorkloadIdentity::new("default", "it"));
    let iface = provisioner
        .create(&config, "macvnet-it0", &netns)
        .await
        .unwrap();
    assert_eq!(iface.name, "macvnet-it0");

    assert!(provisioner.delete(&netns, "macvnet-it0").await.unwrap());
    assert!(!provisioner.delete(&netns, "macvnet-it0").await.unwrap());
}
