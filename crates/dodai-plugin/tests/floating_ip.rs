//! Floating IP association and instance metadata.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;

use dodai_plugin::{CreateFloatingIp, FloatingIp, FloatingIpUpdate, Network, Port, Subnet};
use dodai_test::RecordingDriver;

const VM: &str = "vm-1";
const VM_MAC: &str = "fa:16:3e:00:00:01";

struct Setup {
    h: Harness,
    external: Network,
    public_subnet: Subnet,
    vm_port: Port,
}

async fn setup() -> Setup {
    let h = harness_with(
        RecordingDriver::new(),
        FakeCompute::new().with_interface(VM, VM_MAC, SWITCH, 5),
        FakeMetadata::new().with_instance(VM),
        &[],
    );

    let mut external = create_network("public", None);
    external.external = true;
    let external = h.plugin.create_network(external).await.unwrap();
    let public_subnet = create_subnet(
        &h,
        &external,
        "192.0.2.0/24",
        Some("192.0.2.1"),
        &["192.0.2.53", "192.0.2.54"],
    )
    .await;

    let network = h
        .plugin
        .create_network(create_network("tenant-net", Some(100)))
        .await
        .unwrap();
    let private_subnet = create_subnet(&h, &network, "10.0.0.0/24", Some("10.0.0.1"), &[]).await;
    let vm_port = h
        .plugin
        .create_port(with_fixed_ip(
            compute_port(&network, VM, VM_MAC),
            &private_subnet,
            "10.0.0.5",
        ))
        .await
        .unwrap();

    Setup {
        h,
        external,
        public_subnet,
        vm_port,
    }
}

async fn allocate(s: &Setup, address: &str) -> FloatingIp {
    s.h.plugin
        .create_floating_ip(CreateFloatingIp {
            tenant_id: TENANT.to_string(),
            floating_network_id: s.external.id.clone(),
            subnet_id: s.public_subnet.id.clone(),
            floating_ip_address: address.parse().unwrap(),
        })
        .await
        .unwrap()
}

async fn associate(s: &Setup, floating_ip: &FloatingIp) -> FloatingIp {
    s.h.plugin
        .update_floating_ip(
            &floating_ip.id,
            FloatingIpUpdate {
                port_id: Some(s.vm_port.id.clone()),
                fixed_ip_address: None,
            },
        )
        .await
        .unwrap()
}

fn entry(s: &Setup, key: &str) -> serde_json::Value {
    let metadata = s.h.metadata.metadata(VM);
    let value = metadata
        .get(key)
        .unwrap_or_else(|| panic!("missing metadata key {}", key));
    serde_json::from_str(value).unwrap()
}

#[tokio::test]
async fn test_associate_publishes_metadata() {
    let s = setup().await;
    let floating_ip = allocate(&s, "192.0.2.10").await;
    let floating_port = s.h.plugin.get_port(&floating_ip.floating_port_id).await.unwrap();

    let associated = associate(&s, &floating_ip).await;

    assert_eq!(associated.fixed_port_id.as_deref(), Some(s.vm_port.id.as_str()));
    assert_eq!(associated.fixed_ip_address, Some("10.0.0.5".parse().unwrap()));
    assert_eq!(
        entry(&s, "floating_ip_1"),
        json!({
            "ip_address": "192.0.2.10",
            "mac_address": floating_port.mac_address,
            "netmask": "255.255.255.0",
            "gateway_ip": "192.0.2.1",
            "dnsnameservers": [{"address": "192.0.2.53"}, {"address": "192.0.2.54"}],
        })
    );
}

#[tokio::test]
async fn test_reassociate_overwrites_entry() {
    let s = setup().await;
    let floating_ip = allocate(&s, "192.0.2.10").await;

    associate(&s, &floating_ip).await;
    associate(&s, &floating_ip).await;

    let keys: Vec<String> = s.h.metadata.metadata(VM).into_keys().collect();
    assert_eq!(keys, vec!["floating_ip_1".to_string()]);
}

#[tokio::test]
async fn test_new_entry_goes_after_highest_index() {
    let s = setup().await;
    s.h.metadata.insert(
        VM,
        "floating_ip_4",
        &json!({"ip_address": "198.51.100.1"}).to_string(),
    );
    s.h.metadata.insert(VM, "role", "web");

    let first = allocate(&s, "192.0.2.10").await;
    let second = allocate(&s, "192.0.2.11").await;
    associate(&s, &first).await;
    associate(&s, &second).await;

    assert_eq!(entry(&s, "floating_ip_5")["ip_address"], "192.0.2.10");
    assert_eq!(entry(&s, "floating_ip_6")["ip_address"], "192.0.2.11");
    assert_eq!(entry(&s, "floating_ip_4")["ip_address"], "198.51.100.1");
}

#[tokio::test]
async fn test_disassociate_removes_entry() {
    let s = setup().await;
    let first = allocate(&s, "192.0.2.10").await;
    let second = allocate(&s, "192.0.2.11").await;
    associate(&s, &first).await;
    associate(&s, &second).await;

    let released = s
        .h
        .plugin
        .update_floating_ip(&first.id, FloatingIpUpdate::default())
        .await
        .unwrap();

    assert!(!released.is_associated());
    assert_eq!(released.fixed_ip_address, None);
    let keys: Vec<String> = s.h.metadata.metadata(VM).into_keys().collect();
    assert_eq!(keys, vec!["floating_ip_2".to_string()]);
}

#[tokio::test]
async fn test_disassociate_unassociated_is_port_not_found() {
    let s = setup().await;
    let floating_ip = allocate(&s, "192.0.2.10").await;

    let err = s
        .h
        .plugin
        .update_floating_ip(&floating_ip.id, FloatingIpUpdate::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "PortNotFound");
}

#[tokio::test]
async fn test_disassociate_with_missing_entry_succeeds() {
    let s = setup().await;
    let floating_ip = allocate(&s, "192.0.2.10").await;
    associate(&s, &floating_ip).await;
    s.h.metadata.remove(VM, "floating_ip_1");

    let released = s
        .h
        .plugin
        .update_floating_ip(&floating_ip.id, FloatingIpUpdate::default())
        .await
        .unwrap();
    assert!(!released.is_associated());
}

#[tokio::test]
async fn test_explicit_fixed_address_is_kept() {
    let s = setup().await;
    let floating_ip = allocate(&s, "192.0.2.10").await;

    let associated = s
        .h
        .plugin
        .update_floating_ip(
            &floating_ip.id,
            FloatingIpUpdate {
                port_id: Some(s.vm_port.id.clone()),
                fixed_ip_address: Some("10.0.0.99".parse().unwrap()),
            },
        )
        .await
        .unwrap();
    assert_eq!(associated.fixed_ip_address, Some("10.0.0.99".parse().unwrap()));
}

#[tokio::test]
async fn test_delete_floating_ip_releases_port() {
    let s = setup().await;
    let floating_ip = allocate(&s, "192.0.2.10").await;

    s.h.plugin.delete_floating_ip(&floating_ip.id).await.unwrap();

    assert_eq!(
        s.h.plugin
            .get_floating_ip(&floating_ip.id)
            .await
            .unwrap_err()
            .kind(),
        "FloatingIpNotFound"
    );
    assert_eq!(
        s.h.plugin
            .get_port(&floating_ip.floating_port_id)
            .await
            .unwrap_err()
            .kind(),
        "PortNotFound"
    );
    // The instance's own binding is untouched
    assert!(s.h.driver.binding(SWITCH, 5).is_some());
}

#[tokio::test]
async fn test_floating_ip_needs_external_network() {
    let s = setup().await;
    let err = s
        .h
        .plugin
        .create_floating_ip(CreateFloatingIp {
            tenant_id: TENANT.to_string(),
            floating_network_id: s.vm_port.network_id.clone(),
            subnet_id: s.public_subnet.id.clone(),
            floating_ip_address: "192.0.2.10".parse().unwrap(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "InvalidInput");
}

#[tokio::test]
async fn test_floating_port_cannot_be_deleted_on_its_own() {
    let s = setup().await;
    let floating_ip = allocate(&s, "192.0.2.10").await;

    let err = s
        .h
        .plugin
        .delete_port(&floating_ip.floating_port_id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "PortInUse");
    assert!(s.h.plugin.get_port(&floating_ip.floating_port_id).await.is_ok());

    s.h.plugin.delete_floating_ip(&floating_ip.id).await.unwrap();
    assert!(s
        .h
        .plugin
        .get_floating_ip(&floating_ip.id)
        .await
        .unwrap_err()
        .is_not_found());
    assert!(s
        .h
        .plugin
        .get_port(&floating_ip.floating_port_id)
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_floating_ip_outside_subnet_leaves_nothing() {
    let s = setup().await;
    let err = s
        .h
        .plugin
        .create_floating_ip(CreateFloatingIp {
            tenant_id: TENANT.to_string(),
            floating_network_id: s.external.id.clone(),
            subnet_id: s.public_subnet.id.clone(),
            floating_ip_address: "198.51.100.10".parse().unwrap(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "InvalidInput");
    assert!(s
        .h
        .plugin
        .get_ports(Some(s.external.id.as_str()))
        .await
        .unwrap()
        .is_empty());
}
