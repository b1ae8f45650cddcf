use macvnet_core::*;
use std::net::Ipv4Addr;
use std::path::PathBuf;

#[test]
fn test_runtime_payload_to_identity() {
    let conf = NetConf::from_slice(
        br#"{"cniVersion":"0.4.0","name":"vlan-net","type":"macvnet","master":"","mode":"bridge","mtu":0}"#,
    )
    .unwrap();
    let args = CniArgs::parse("IgnoreUnknown=1;K8S_POD_NAMESPACE=default;K8S_POD_NAME=nginx-test").unwrap();

    let identity = args.require_workload().unwrap();
    let attachment = AttachmentConfig::new("eth0", identity.clone())
        .with_mode(conf.macvlan_mode().unwrap())
        .with_mtu(conf.validate_mtu("eth0", 1500).unwrap());

    assert_eq!(attachment.mode, MacvlanMode::Bridge);
    assert_eq!(attachment.mtu, 0);
    assert_eq!(attachment.workload, identity);
    assert!(identity.infra_container_id.is_none());
}

#[test]
fn test_allocator_answer_to_result() {
    let allocation: AllocationResult = serde_json::from_str(
        r#"{"appNet":"app-a","useIpList":["10.0.1.2","10.0.1.3"],"ipAddress":"10.0.1.5","gateway":"10.0.1.1","vlanId":"42"}"#,
    )
    .unwrap();
    assert_eq!(allocation.vlan_uplink("eth0"), "eth0.42");

    let interface = InterfaceDescriptor {
        name: "net1".to_string(),
        mac: "82:e1:18:79:a4:5d".parse().unwrap(),
        sandbox: PathBuf::from("/proc/10491/ns/net"),
    };

    let result = CniResult::new("0.4.0", &interface, &allocation);
    assert_eq!(result.ips[0].address, "10.0.1.5/24");
    assert_eq!(result.ips[0].gateway, Ipv4Addr::new(10, 0, 1, 1));
    assert_eq!(result.interfaces[0].name, "net1");

    let mut out = Vec::new();
    result.write_to(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with('\n'));
    assert!(text.contains("\"cniVersion\": \"0.4.0\""));
}

#[test]
fn test_mac_serde() {
    let mac: MacAddr = serde_json::from_str("\"02:42:ac:11:00:02\"").unwrap();
    assert_eq!(serde_json::to_string(&mac).unwrap(), "\"02:42:ac:11:00:02\"");
    assert!(serde_json::from_str::<MacAddr>("\"02:42\"").is_err());
}

#[test]
fn test_error_codes_are_distinct_per_kind() {
    let errors = [
        Error::InvalidConfig { message: String::new() },
        Error::InvalidArgs { message: String::new() },
        Error::resolution("eth0.42", "no such device"),
        Error::allocation("allocate", "default/web", "503"),
        Error::provisioning("create", "mv00000000", "EEXIST"),
        Error::teardown("delete", "eth0", "EPERM"),
        Error::Namespace { message: String::new() },
    ];

    let mut codes: Vec<u32> = errors.iter().map(Error::cni_code).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());
}
