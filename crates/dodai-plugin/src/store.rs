//! Persistence collaborator for networks, subnets, ports, floating IPs and
//! outer ports.

use async_trait::async_trait;
use dodai_ofc_driver::{Dpid, PortNumber, VlanId};
use dodai_ofc_orch::{OuterPort, OuterPortRegistry, RegistryError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::error::{PluginError, PluginResult};
use crate::types::{FloatingIp, Network, NetworkFilter, NetworkUpdate, Port, Subnet};

/// Record storage behind the plugin.
///
/// Every method is one atomic unit of work. Multi-row mutations (a network
/// with its VLAN uniqueness check, a network with its subnets, a floating IP
/// with its port links) either apply completely or not at all.
#[async_trait]
pub trait NetworkStore: OuterPortRegistry {
    /// Inserts the network unless another one already carries its VLAN.
    async fn create_network(&self, network: Network) -> PluginResult<Network>;
    async fn get_network(&self, id: &str) -> PluginResult<Network>;
    async fn get_network_by_vlan(&self, vlan: VlanId) -> PluginResult<Option<Network>>;
    async fn list_networks(&self, filter: &NetworkFilter) -> PluginResult<Vec<Network>>;
    async fn update_network(&self, id: &str, update: &NetworkUpdate) -> PluginResult<Network>;
    /// Removes the network and its subnets. Fails while ports remain.
    async fn delete_network(&self, id: &str) -> PluginResult<()>;

    async fn create_subnet(&self, subnet: Subnet) -> PluginResult<Subnet>;
    async fn get_subnet(&self, id: &str) -> PluginResult<Subnet>;

    async fn create_port(&self, port: Port) -> PluginResult<Port>;
    async fn get_port(&self, id: &str) -> PluginResult<Port>;
    async fn list_ports(&self, network_id: Option<&str>) -> PluginResult<Vec<Port>>;
    /// Removes the port and clears the fixed side of every floating IP bound
    /// to it, returning those floating IPs as they were before. Fails while
    /// the port holds a floating IP's address.
    async fn delete_port(&self, id: &str) -> PluginResult<Vec<FloatingIp>>;

    /// Inserts the floating IP together with the external-network port that
    /// holds its address.
    async fn create_floating_ip(
        &self,
        floating_port: Port,
        floating_ip: FloatingIp,
    ) -> PluginResult<FloatingIp>;
    async fn get_floating_ip(&self, id: &str) -> PluginResult<FloatingIp>;
    /// Sets or clears the fixed side of a floating IP.
    async fn update_floating_ip(
        &self,
        id: &str,
        fixed_ip_address: Option<IpAddr>,
        fixed_port_id: Option<String>,
    ) -> PluginResult<FloatingIp>;
    /// Removes the record and its floating port, returning the record.
    async fn delete_floating_ip(&self, id: &str) -> PluginResult<FloatingIp>;

    async fn list_outer_ports(&self) -> PluginResult<Vec<OuterPort>>;
    async fn create_outer_port(&self, dpid: Dpid, outer_port: PortNumber)
        -> PluginResult<OuterPort>;
    async fn get_outer_port(&self, id: u64) -> PluginResult<OuterPort>;
    async fn delete_outer_port(&self, id: u64) -> PluginResult<()>;
}

#[derive(Debug, Default)]
struct StoreState {
    networks: BTreeMap<String, Network>,
    subnets: BTreeMap<String, Subnet>,
    ports: BTreeMap<String, Port>,
    floating_ips: BTreeMap<String, FloatingIp>,
    outer_ports: BTreeMap<u64, OuterPort>,
    next_outer_port_id: u64,
}

impl StoreState {
    fn network_mut(&mut self, id: &str) -> PluginResult<&mut Network> {
        self.networks
            .get_mut(id)
            .ok_or_else(|| PluginError::network_not_found(id))
    }

    fn check_new_port(&self, port: &Port) -> PluginResult<()> {
        if !self.networks.contains_key(&port.network_id) {
            return Err(PluginError::network_not_found(&port.network_id));
        }
        if self.ports.contains_key(&port.id) {
            return Err(PluginError::invalid_input(format!(
                "port {} already exists",
                port.id
            )));
        }
        for fixed_ip in &port.fixed_ips {
            match self.subnets.get(&fixed_ip.subnet_id) {
                Some(subnet) if subnet.network_id == port.network_id => {}
                Some(_) => {
                    return Err(PluginError::invalid_input(format!(
                        "subnet {} is not on network {}",
                        fixed_ip.subnet_id, port.network_id
                    )))
                }
                None => {
                    return Err(PluginError::SubnetNotFound {
                        id: fixed_ip.subnet_id.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// In-process [`NetworkStore`]. Each operation holds the state lock for its
/// whole read-check-write sequence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OuterPortRegistry for MemoryStore {
    async fn outer_ports(&self) -> Result<Vec<OuterPort>, RegistryError> {
        Ok(self.state.read().outer_ports.values().cloned().collect())
    }
}

#[async_trait]
impl NetworkStore for MemoryStore {
    async fn create_network(&self, network: Network) -> PluginResult<Network> {
        let mut state = self.state.write();
        if let Some(vlan) = network.vlan_id {
            if state.networks.values().any(|n| n.vlan_id == Some(vlan)) {
                return Err(PluginError::DuplicateVlan { vlan });
            }
        }
        if state.networks.contains_key(&network.id) {
            return Err(PluginError::invalid_input(format!(
                "network {} already exists",
                network.id
            )));
        }
        state.networks.insert(network.id.clone(), network.clone());
        Ok(network)
    }

    async fn get_network(&self, id: &str) -> PluginResult<Network> {
        self.state
            .read()
            .networks
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::network_not_found(id))
    }

    async fn get_network_by_vlan(&self, vlan: VlanId) -> PluginResult<Option<Network>> {
        Ok(self
            .state
            .read()
            .networks
            .values()
            .find(|n| n.vlan_id == Some(vlan))
            .cloned())
    }

    async fn list_networks(&self, filter: &NetworkFilter) -> PluginResult<Vec<Network>> {
        Ok(self
            .state
            .read()
            .networks
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }

    async fn update_network(&self, id: &str, update: &NetworkUpdate) -> PluginResult<Network> {
        let mut state = self.state.write();
        let network = state.network_mut(id)?;
        if let Some(name) = &update.name {
            network.name = name.clone();
        }
        if let Some(admin_state_up) = update.admin_state_up {
            network.admin_state_up = admin_state_up;
        }
        if let Some(external) = update.external {
            network.external = external;
        }
        Ok(network.clone())
    }

    async fn delete_network(&self, id: &str) -> PluginResult<()> {
        let mut state = self.state.write();
        if !state.networks.contains_key(id) {
            return Err(PluginError::network_not_found(id));
        }
        if state.ports.values().any(|p| p.network_id == id) {
            return Err(PluginError::NetworkInUse { id: id.to_string() });
        }
        state.subnets.retain(|_, s| s.network_id != id);
        state.networks.remove(id);
        Ok(())
    }

    async fn create_subnet(&self, subnet: Subnet) -> PluginResult<Subnet> {
        let mut state = self.state.write();
        state.network_mut(&subnet.network_id)?.subnets.push(subnet.id.clone());
        state.subnets.insert(subnet.id.clone(), subnet.clone());
        Ok(subnet)
    }

    async fn get_subnet(&self, id: &str) -> PluginResult<Subnet> {
        self.state
            .read()
            .subnets
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::SubnetNotFound { id: id.to_string() })
    }

    async fn create_port(&self, port: Port) -> PluginResult<Port> {
        let mut state = self.state.write();
        state.check_new_port(&port)?;
        state.ports.insert(port.id.clone(), port.clone());
        Ok(port)
    }

    async fn get_port(&self, id: &str) -> PluginResult<Port> {
        self.state
            .read()
            .ports
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::port_not_found(id))
    }

    async fn list_ports(&self, network_id: Option<&str>) -> PluginResult<Vec<Port>> {
        Ok(self
            .state
            .read()
            .ports
            .values()
            .filter(|p| network_id.map_or(true, |id| p.network_id == id))
            .cloned()
            .collect())
    }

    async fn delete_port(&self, id: &str) -> PluginResult<Vec<FloatingIp>> {
        let mut state = self.state.write();
        if !state.ports.contains_key(id) {
            return Err(PluginError::port_not_found(id));
        }
        if let Some(holder) = state.floating_ips.values().find(|f| f.floating_port_id == id) {
            return Err(PluginError::PortInUse {
                id: id.to_string(),
                floating_ip_id: holder.id.clone(),
            });
        }

        let mut released = Vec::new();
        for floating_ip in state.floating_ips.values_mut() {
            if floating_ip.fixed_port_id.as_deref() == Some(id) {
                released.push(floating_ip.clone());
                floating_ip.fixed_port_id = None;
                floating_ip.fixed_ip_address = None;
            }
        }
        state.ports.remove(id);
        Ok(released)
    }

    async fn create_floating_ip(
        &self,
        floating_port: Port,
        floating_ip: FloatingIp,
    ) -> PluginResult<FloatingIp> {
        let mut state = self.state.write();
        if floating_ip.floating_port_id != floating_port.id {
            return Err(PluginError::invalid_input(format!(
                "floating IP {} does not reference port {}",
                floating_ip.id, floating_port.id
            )));
        }
        if state.floating_ips.contains_key(&floating_ip.id) {
            return Err(PluginError::invalid_input(format!(
                "floating IP {} already exists",
                floating_ip.id
            )));
        }
        state.check_new_port(&floating_port)?;

        state.ports.insert(floating_port.id.clone(), floating_port);
        state
            .floating_ips
            .insert(floating_ip.id.clone(), floating_ip.clone());
        Ok(floating_ip)
    }

    async fn get_floating_ip(&self, id: &str) -> PluginResult<FloatingIp> {
        self.state
            .read()
            .floating_ips
            .get(id)
            .cloned()
            .ok_or_else(|| PluginError::FloatingIpNotFound { id: id.to_string() })
    }

    async fn update_floating_ip(
        &self,
        id: &str,
        fixed_ip_address: Option<IpAddr>,
        fixed_port_id: Option<String>,
    ) -> PluginResult<FloatingIp> {
        let mut state = self.state.write();
        if let Some(port_id) = &fixed_port_id {
            if !state.ports.contains_key(port_id) {
                return Err(PluginError::port_not_found(port_id));
            }
        }
        let floating_ip = state
            .floating_ips
            .get_mut(id)
            .ok_or_else(|| PluginError::FloatingIpNotFound { id: id.to_string() })?;
        floating_ip.fixed_ip_address = fixed_ip_address;
        floating_ip.fixed_port_id = fixed_port_id;
        Ok(floating_ip.clone())
    }

    async fn delete_floating_ip(&self, id: &str) -> PluginResult<FloatingIp> {
        let mut state = self.state.write();
        let floating_port_id = state
            .floating_ips
            .get(id)
            .map(|f| f.floating_port_id.clone())
            .ok_or_else(|| PluginError::FloatingIpNotFound { id: id.to_string() })?;
        if !state.ports.contains_key(&floating_port_id) {
            return Err(PluginError::port_not_found(floating_port_id));
        }

        state.ports.remove(&floating_port_id);
        state
            .floating_ips
            .remove(id)
            .ok_or_else(|| PluginError::FloatingIpNotFound { id: id.to_string() })
    }

    async fn list_outer_ports(&self) -> PluginResult<Vec<OuterPort>> {
        Ok(self.state.read().outer_ports.values().cloned().collect())
    }

    async fn create_outer_port(
        &self,
        dpid: Dpid,
        outer_port: PortNumber,
    ) -> PluginResult<OuterPort> {
        let mut state = self.state.write();
        state.next_outer_port_id += 1;
        let port = OuterPort::new(state.next_outer_port_id, dpid, outer_port);
        state.outer_ports.insert(port.id, port.clone());
        Ok(port)
    }

    async fn get_outer_port(&self, id: u64) -> PluginResult<OuterPort> {
        self.state
            .read()
            .outer_ports
            .get(&id)
            .cloned()
            .ok_or(PluginError::OuterPortNotFound { id })
    }

    async fn delete_outer_port(&self, id: u64) -> PluginResult<()> {
        self.state
            .write()
            .outer_ports
            .remove(&id)
            .map(|_| ())
            .ok_or(PluginError::OuterPortNotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FixedIp, NETWORK_STATUS_ACTIVE};

    fn network(id: &str, vlan: Option<u16>) -> Network {
        Network {
            id: id.to_string(),
            name: format!("net-{}", id),
            tenant_id: "t1".to_string(),
            admin_state_up: true,
            status: NETWORK_STATUS_ACTIVE.to_string(),
            shared: false,
            external: false,
            vlan_id: vlan.and_then(VlanId::new),
            subnets: Vec::new(),
        }
    }

    fn subnet(id: &str, network_id: &str) -> Subnet {
        Subnet {
            id: id.to_string(),
            network_id: network_id.to_string(),
            tenant_id: "t1".to_string(),
            cidr: "10.0.0.0/24".parse().unwrap(),
            gateway_ip: None,
            dns_nameservers: Vec::new(),
        }
    }

    fn port(id: &str, network_id: &str) -> Port {
        Port {
            id: id.to_string(),
            network_id: network_id.to_string(),
            tenant_id: "t1".to_string(),
            device_id: String::new(),
            device_owner: String::new(),
            mac_address: "fa:16:3e:00:00:01".to_string(),
            fixed_ips: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_vlan_rejected() {
        let store = MemoryStore::new();
        store.create_network(network("a", Some(100))).await.unwrap();

        let err = store
            .create_network(network("b", Some(100)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "DuplicateVlan");
        assert!(store.get_network("b").await.is_err());

        let found = store
            .get_network_by_vlan(VlanId::new(100).unwrap())
            .await
            .unwrap();
        assert_eq!(found.map(|n| n.id), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_untagged_networks_never_conflict() {
        let store = MemoryStore::new();
        store.create_network(network("a", None)).await.unwrap();
        store.create_network(network("b", None)).await.unwrap();
        assert_eq!(
            store
                .list_networks(&NetworkFilter::default())
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_delete_network_in_use() {
        let store = MemoryStore::new();
        store.create_network(network("a", Some(10))).await.unwrap();
        store.create_subnet(subnet("s1", "a")).await.unwrap();
        store.create_port(port("p1", "a")).await.unwrap();

        let err = store.delete_network("a").await.unwrap_err();
        assert_eq!(err.kind(), "NetworkInUse");

        store.delete_port("p1").await.unwrap();
        store.delete_network("a").await.unwrap();
        assert!(store.get_subnet("s1").await.unwrap_err().is_not_found());
        // The VLAN is free again
        store.create_network(network("b", Some(10))).await.unwrap();
    }

    #[tokio::test]
    async fn test_port_fixed_ip_must_match_network() {
        let store = MemoryStore::new();
        store.create_network(network("a", None)).await.unwrap();
        store.create_network(network("b", None)).await.unwrap();
        store.create_subnet(subnet("s1", "a")).await.unwrap();

        let mut p = port("p1", "b");
        p.fixed_ips.push(FixedIp {
            subnet_id: "s1".to_string(),
            ip_address: "10.0.0.5".parse().unwrap(),
        });
        let err = store.create_port(p).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    fn floating_ip(id: &str, port_id: &str) -> FloatingIp {
        FloatingIp {
            id: id.to_string(),
            tenant_id: "t1".to_string(),
            floating_ip_address: "192.0.2.10".parse().unwrap(),
            floating_network_id: "a".to_string(),
            floating_port_id: port_id.to_string(),
            fixed_port_id: None,
            fixed_ip_address: None,
        }
    }

    #[tokio::test]
    async fn test_delete_port_disassociates_floating_ips() {
        let store = MemoryStore::new();
        store.create_network(network("a", None)).await.unwrap();
        store.create_port(port("vm", "a")).await.unwrap();
        store
            .create_floating_ip(port("fp", "a"), floating_ip("f1", "fp"))
            .await
            .unwrap();

        let updated = store
            .update_floating_ip("f1", Some("10.0.0.5".parse().unwrap()), Some("vm".to_string()))
            .await
            .unwrap();
        assert!(updated.is_associated());

        let released = store.delete_port("vm").await.unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].fixed_port_id.as_deref(), Some("vm"));
        assert!(!store.get_floating_ip("f1").await.unwrap().is_associated());
        assert!(store.get_port("vm").await.is_err());
    }

    #[tokio::test]
    async fn test_floating_port_is_removed_with_its_record() {
        let store = MemoryStore::new();
        store.create_network(network("a", None)).await.unwrap();
        store
            .create_floating_ip(port("fp", "a"), floating_ip("f1", "fp"))
            .await
            .unwrap();

        let err = store.delete_port("fp").await.unwrap_err();
        assert_eq!(err.kind(), "PortInUse");
        assert!(store.get_port("fp").await.is_ok());

        let deleted = store.delete_floating_ip("f1").await.unwrap();
        assert_eq!(deleted.floating_port_id, "fp");
        assert!(store.get_port("fp").await.unwrap_err().is_not_found());
        assert!(store.get_floating_ip("f1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejected_floating_ip_leaves_no_port() {
        let store = MemoryStore::new();
        store.create_network(network("a", None)).await.unwrap();

        let mut fp = port("fp", "a");
        fp.fixed_ips.push(FixedIp {
            subnet_id: "missing".to_string(),
            ip_address: "192.0.2.10".parse().unwrap(),
        });
        let err = store
            .create_floating_ip(fp, floating_ip("f1", "fp"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "SubnetNotFound");
        assert!(store.get_port("fp").await.is_err());
        assert!(store.get_floating_ip("f1").await.is_err());
    }

    #[tokio::test]
    async fn test_outer_port_ids_increase() {
        let store = MemoryStore::new();
        let dpid = Dpid::new("0x1").unwrap();
        let first = store.create_outer_port(dpid.clone(), 1).await.unwrap();
        let second = store.create_outer_port(dpid, 2).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        store.delete_outer_port(first.id).await.unwrap();
        let err = store.get_outer_port(first.id).await.unwrap_err();
        assert_eq!(err.to_string(), "Dodai OuterPort 1 could not be found.");

        let registry = store.outer_ports().await.unwrap();
        assert_eq!(registry, vec![second]);
    }
}
