//! Network, subnet, port and floating IP records.

use dodai_ofc_driver::VlanId;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Device-owner prefix of ports that belong to compute instances.
pub const DEVICE_OWNER_COMPUTE_PREFIX: &str = "compute:";

/// Device owner of the port backing a floating IP.
pub const DEVICE_OWNER_FLOATING_IP: &str = "network:floatingip";

/// Status reported for every network.
pub const NETWORK_STATUS_ACTIVE: &str = "ACTIVE";

/// A tenant network and its VLAN tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
    pub tenant_id: String,
    pub admin_state_up: bool,
    pub status: String,
    pub shared: bool,
    /// `router:external`
    pub external: bool,
    pub vlan_id: Option<VlanId>,
    pub subnets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNetwork {
    pub name: String,
    pub tenant_id: String,
    pub vlan_id: Option<VlanId>,
    #[serde(default)]
    pub shared: bool,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
    #[serde(default)]
    pub external: bool,
}

/// Mutable network attributes. The VLAN tag is fixed at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkUpdate {
    pub name: Option<String>,
    pub admin_state_up: Option<bool>,
    pub external: Option<bool>,
}

/// Network query. Each non-empty list must contain the network's value.
#[derive(Debug, Clone, Default)]
pub struct NetworkFilter {
    pub names: Vec<String>,
    pub vlan_ids: Vec<VlanId>,
    pub tenant_ids: Vec<String>,
}

impl NetworkFilter {
    pub fn matches(&self, network: &Network) -> bool {
        (self.names.is_empty() || self.names.contains(&network.name))
            && (self.vlan_ids.is_empty()
                || network
                    .vlan_id
                    .is_some_and(|vlan| self.vlan_ids.contains(&vlan)))
            && (self.tenant_ids.is_empty() || self.tenant_ids.contains(&network.tenant_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    pub tenant_id: String,
    pub cidr: IpNetwork,
    pub gateway_ip: Option<IpAddr>,
    pub dns_nameservers: Vec<IpAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubnet {
    pub network_id: String,
    pub tenant_id: String,
    pub cidr: String,
    pub gateway_ip: Option<IpAddr>,
    #[serde(default)]
    pub dns_nameservers: Vec<IpAddr>,
}

/// An address allocated to a port from a subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: String,
    pub ip_address: IpAddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub network_id: String,
    pub tenant_id: String,
    pub device_id: String,
    pub device_owner: String,
    pub mac_address: String,
    pub fixed_ips: Vec<FixedIp>,
}

impl Port {
    /// Returns true if the port belongs to a compute instance.
    pub fn is_compute(&self) -> bool {
        self.device_owner.starts_with(DEVICE_OWNER_COMPUTE_PREFIX)
    }

    pub fn has_device(&self) -> bool {
        !self.device_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePort {
    pub network_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_owner: String,
    /// Generated when absent.
    pub mac_address: Option<String>,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
}

impl CreatePort {
    pub fn is_compute(&self) -> bool {
        self.device_owner.starts_with(DEVICE_OWNER_COMPUTE_PREFIX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub tenant_id: String,
    pub floating_ip_address: IpAddr,
    pub floating_network_id: String,
    pub floating_port_id: String,
    pub fixed_port_id: Option<String>,
    pub fixed_ip_address: Option<IpAddr>,
}

impl FloatingIp {
    pub fn is_associated(&self) -> bool {
        self.fixed_port_id.is_some()
    }
}

/// Floating IP allocation request.
///
/// Address management is out of scope: the caller picks the address and the
/// subnet of the external network it comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFloatingIp {
    pub tenant_id: String,
    pub floating_network_id: String,
    pub subnet_id: String,
    pub floating_ip_address: IpAddr,
}

/// Associate (`port_id` set) or disassociate (`port_id` unset).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloatingIpUpdate {
    pub port_id: Option<String>,
    /// Defaults to the fixed port's first address.
    pub fixed_ip_address: Option<IpAddr>,
}

fn default_true() -> bool {
    true
}
