//! Shared fakes and harness for plugin integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use dodai_ofc_driver::{DriverKind, Dpid, PortNumber, VlanId};
use dodai_plugin::{
    ComputeError, ComputeInventory, ComputeResult, CreateNetwork, CreatePort, CreateSubnet,
    DodaiPlugin, FixedIp, InstanceMetadata, MemoryStore, Metadata, Network, PhysicalInterface,
    PluginConfig, Port, Subnet,
};
use dodai_test::RecordingDriver;

pub const TENANT: &str = "tenant-1";
pub const SWITCH: &str = "00:00:00:00:00:00:00:01";
pub const UPLINK: PortNumber = 48;

/// Compute inventory keyed by (device id, MAC).
#[derive(Default)]
pub struct FakeCompute {
    interfaces: Mutex<HashMap<(String, String), PhysicalInterface>>,
    lookups: AtomicUsize,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interface(self, device_id: &str, mac: &str, dpid: &str, port_no: PortNumber) -> Self {
        self.interfaces.lock().insert(
            (device_id.to_string(), mac.to_string()),
            PhysicalInterface {
                dpid: Dpid::new(dpid).unwrap(),
                port_no,
                mac_address: mac.to_string(),
            },
        );
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ComputeInventory for FakeCompute {
    async fn resolve_physical_interface(
        &self,
        _tenant_id: &str,
        device_id: &str,
        mac_address: &str,
    ) -> ComputeResult<PhysicalInterface> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.interfaces
            .lock()
            .get(&(device_id.to_string(), mac_address.to_string()))
            .cloned()
            .ok_or_else(|| ComputeError::interface_not_found(device_id, mac_address, "unknown NIC"))
    }
}

/// Per-instance metadata maps. Unknown instances are `InstanceNotFound`.
#[derive(Default)]
pub struct FakeMetadata {
    instances: Mutex<HashMap<String, Metadata>>,
}

impl FakeMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instance(self, instance_id: &str) -> Self {
        self.instances
            .lock()
            .insert(instance_id.to_string(), Metadata::new());
        self
    }

    pub fn insert(&self, instance_id: &str, key: &str, value: &str) {
        self.instances
            .lock()
            .entry(instance_id.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, instance_id: &str, key: &str) {
        if let Some(metadata) = self.instances.lock().get_mut(instance_id) {
            metadata.remove(key);
        }
    }

    pub fn metadata(&self, instance_id: &str) -> Metadata {
        self.instances
            .lock()
            .get(instance_id)
            .cloned()
            .unwrap_or_default()
    }

    fn not_found(instance_id: &str) -> ComputeError {
        ComputeError::InstanceNotFound {
            instance_id: instance_id.to_string(),
        }
    }
}

#[async_trait]
impl InstanceMetadata for FakeMetadata {
    async fn get_metadata(&self, _tenant_id: &str, instance_id: &str) -> ComputeResult<Metadata> {
        self.instances
            .lock()
            .get(instance_id)
            .cloned()
            .ok_or_else(|| Self::not_found(instance_id))
    }

    async fn set_metadata(
        &self,
        _tenant_id: &str,
        instance_id: &str,
        key: &str,
        value: &str,
    ) -> ComputeResult<()> {
        self.instances
            .lock()
            .get_mut(instance_id)
            .ok_or_else(|| Self::not_found(instance_id))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_metadata_key(
        &self,
        _tenant_id: &str,
        instance_id: &str,
        key: &str,
    ) -> ComputeResult<()> {
        self.instances
            .lock()
            .get_mut(instance_id)
            .ok_or_else(|| Self::not_found(instance_id))?
            .remove(key);
        Ok(())
    }
}

pub struct Harness {
    pub plugin: DodaiPlugin,
    pub driver: Arc<RecordingDriver>,
    pub store: Arc<MemoryStore>,
    pub compute: Arc<FakeCompute>,
    pub metadata: Arc<FakeMetadata>,
}

pub fn config(uncontrolled: &[&str]) -> PluginConfig {
    let mut config = PluginConfig::default();
    config.ofc.driver = DriverKind::Dummy;
    config.ofc.uncontrolled_network_names = uncontrolled.iter().map(|s| s.to_string()).collect();
    config
}

pub fn harness_with(
    driver: RecordingDriver,
    compute: FakeCompute,
    metadata: FakeMetadata,
    uncontrolled: &[&str],
) -> Harness {
    let driver = Arc::new(driver);
    let store = Arc::new(MemoryStore::new());
    let compute = Arc::new(compute);
    let metadata = Arc::new(metadata);
    let plugin = DodaiPlugin::new(
        &config(uncontrolled),
        store.clone(),
        driver.clone(),
        compute.clone(),
        metadata.clone(),
    );
    Harness {
        plugin,
        driver,
        store,
        compute,
        metadata,
    }
}

pub fn harness(compute: FakeCompute) -> Harness {
    harness_with(RecordingDriver::new(), compute, FakeMetadata::new(), &[])
}

pub fn create_network(name: &str, vlan: Option<u16>) -> CreateNetwork {
    CreateNetwork {
        name: name.to_string(),
        tenant_id: TENANT.to_string(),
        vlan_id: vlan.map(|v| VlanId::new(v).unwrap()),
        admin_state_up: true,
        ..Default::default()
    }
}

pub fn compute_port(network: &Network, device_id: &str, mac: &str) -> CreatePort {
    CreatePort {
        network_id: network.id.clone(),
        tenant_id: TENANT.to_string(),
        device_id: device_id.to_string(),
        device_owner: "compute:nova".to_string(),
        mac_address: Some(mac.to_string()),
        fixed_ips: Vec::new(),
    }
}

pub async fn create_subnet(
    harness: &Harness,
    network: &Network,
    cidr: &str,
    gateway: Option<&str>,
    dns: &[&str],
) -> Subnet {
    harness
        .plugin
        .create_subnet(CreateSubnet {
            network_id: network.id.clone(),
            tenant_id: TENANT.to_string(),
            cidr: cidr.to_string(),
            gateway_ip: gateway.map(|g| g.parse().unwrap()),
            dns_nameservers: dns.iter().map(|d| d.parse().unwrap()).collect(),
        })
        .await
        .unwrap()
}

pub fn with_fixed_ip(mut port: CreatePort, subnet: &Subnet, ip: &str) -> CreatePort {
    port.fixed_ips.push(FixedIp {
        subnet_id: subnet.id.clone(),
        ip_address: ip.parse().unwrap(),
    });
    port
}

pub async fn port_ids(harness: &Harness, network: &Network) -> Vec<String> {
    harness
        .plugin
        .get_ports(Some(&network.id))
        .await
        .unwrap()
        .into_iter()
        .map(|p: Port| p.id)
        .collect()
}
