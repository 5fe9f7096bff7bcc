//! Controller-facing domain types.
//!
//! Datapath ids and VLAN ids are wrapped so a port number can never be passed
//! where a VLAN is expected, the same way typed object ids keep switch objects
//! apart.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical port number on a switch.
pub type PortNumber = u32;

/// Inner VLAN value meaning "untagged" in outer-port association settings.
///
/// Every association issued by this system uses it.
pub const INNER_VLAN_UNTAGGED: u16 = 65535;

/// Port type string reported by the controller for compute-facing ports.
pub const SERVER_PORT_TYPE: &str = "ServerPort";

/// OpenFlow switch datapath identifier, as the controller spells it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dpid(String);

impl Dpid {
    /// Creates a datapath id. Returns `None` for blank input.
    pub fn new(dpid: impl Into<String>) -> Option<Self> {
        let dpid = dpid.into();
        let trimmed = dpid.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Returns the datapath id as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dpid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Dpid {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dpid::new(s).ok_or_else(|| "datapath id cannot be empty".to_string())
    }
}

/// Outer (customer) VLAN tag, 0..=4094.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Highest usable VLAN id.
    pub const MAX: u16 = 4094;

    /// Creates a VLAN id. Returns `None` when out of range.
    pub const fn new(id: u16) -> Option<Self> {
        if id <= Self::MAX {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Returns the raw VLAN id.
    pub const fn get(&self) -> u16 {
        self.0
    }

    /// Returns true if this tag selects outer-port trunking.
    ///
    /// VLAN 0 carries no VLAN membership (802.1Q priority tag only).
    pub const fn is_tagged(&self) -> bool {
        self.0 != 0
    }
}

impl TryFrom<u16> for VlanId {
    type Error = String;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id).ok_or_else(|| format!("VLAN id {} out of range 0..={}", id, VlanId::MAX))
    }
}

impl From<VlanId> for u16 {
    fn from(vlan: VlanId) -> u16 {
        vlan.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VlanId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u16 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid VLAN id '{}': {}", s, e))?;
        VlanId::try_from(id)
    }
}

/// Region entry returned by `showRegion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionInfo {
    pub region_name: String,
}

impl RegionInfo {
    pub fn new(region_name: impl Into<String>) -> Self {
        Self {
            region_name: region_name.into(),
        }
    }
}

/// Switch entry returned by `showDatapathId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatapathInfo {
    pub dpid: Dpid,
}

/// Kind of a switch port as reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PortType {
    /// Port facing a compute host.
    ServerPort,
    /// Anything else (uplinks, inter-switch links, ...).
    Other(String),
}

impl PortType {
    pub fn as_str(&self) -> &str {
        match self {
            PortType::ServerPort => SERVER_PORT_TYPE,
            PortType::Other(kind) => kind,
        }
    }
}

impl From<String> for PortType {
    fn from(kind: String) -> Self {
        if kind == SERVER_PORT_TYPE {
            PortType::ServerPort
        } else {
            PortType::Other(kind)
        }
    }
}

impl From<&str> for PortType {
    fn from(kind: &str) -> Self {
        PortType::from(kind.to_string())
    }
}

impl From<PortType> for String {
    fn from(kind: PortType) -> String {
        kind.as_str().to_string()
    }
}

/// Port entry returned by `showPorts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    #[serde(rename = "type")]
    pub port_type: PortType,
    /// Region the port is bound to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_number: Option<PortNumber>,
}

impl PortInfo {
    /// Returns true if this is a server port bound to `region_name`.
    pub fn is_server_port_of(&self, region_name: &str) -> bool {
        self.port_type == PortType::ServerPort && self.region_name.as_deref() == Some(region_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpid_rejects_blank() {
        assert!(Dpid::new("  ").is_none());
        assert_eq!(Dpid::new(" 00:01 ").unwrap().as_str(), "00:01");
        assert!("".parse::<Dpid>().is_err());
    }

    #[test]
    fn test_vlan_range() {
        assert!(VlanId::new(0).is_some());
        assert!(VlanId::new(4094).is_some());
        assert!(VlanId::new(4095).is_none());
        assert!("4095".parse::<VlanId>().is_err());
        assert_eq!("100".parse::<VlanId>().unwrap().get(), 100);
    }

    #[test]
    fn test_vlan_zero_is_untagged() {
        assert!(!VlanId::new(0).unwrap().is_tagged());
        assert!(VlanId::new(1).unwrap().is_tagged());
    }

    #[test]
    fn test_port_type_from_wire() {
        assert_eq!(PortType::from("ServerPort"), PortType::ServerPort);
        assert_eq!(
            PortType::from("OuterPort"),
            PortType::Other("OuterPort".to_string())
        );
        assert_eq!(PortType::Other("Trunk".into()).as_str(), "Trunk");
    }

    #[test]
    fn test_is_server_port_of() {
        let port = PortInfo {
            port_type: PortType::ServerPort,
            region_name: Some("abc".to_string()),
            port_number: Some(3),
        };
        assert!(port.is_server_port_of("abc"));
        assert!(!port.is_server_port_of("def"));

        let uplink = PortInfo {
            port_type: PortType::Other("OuterPort".into()),
            region_name: Some("abc".to_string()),
            port_number: None,
        };
        assert!(!uplink.is_server_port_of("abc"));
    }

    #[test]
    fn test_port_info_json() {
        let port = PortInfo {
            port_type: PortType::ServerPort,
            region_name: Some("abc".to_string()),
            port_number: Some(3),
        };
        let json = serde_json::to_value(&port).unwrap();
        assert_eq!(json["type"], "ServerPort");
        assert_eq!(json["regionName"], "abc");
        assert_eq!(json["portNumber"], 3);
    }
}
