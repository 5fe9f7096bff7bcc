//! Fixtures for controller-facing tests.

use crate::recording::DriverCall;

/// Network UUIDs with a predictable hyphen-free region name.
pub mod networks {
    pub const NET_A: &str = "3f2a9c0e-1b4d-4e6f-8a7b-0c1d2e3f4a5b";
    pub const REGION_A: &str = "3f2a9c0e1b4d4e6f8a7b0c1d2e3f4a5b";

    pub const NET_B: &str = "a0b1c2d3-e4f5-4a6b-8c7d-9e0f1a2b3c4d";
    pub const REGION_B: &str = "a0b1c2d3e4f54a6b8c7d9e0f1a2b3c4d";
}

/// Builders for expected driver calls.
pub mod calls {
    use super::*;
    use dodai_ofc_driver::{PortNumber, INNER_VLAN_UNTAGGED};

    pub fn create_region(region: &str) -> DriverCall {
        DriverCall::CreateRegion(region.to_string())
    }

    pub fn destroy_region(region: &str) -> DriverCall {
        DriverCall::DestroyRegion(region.to_string())
    }

    pub fn set_server_port(dpid: &str, port: PortNumber, region: &str) -> DriverCall {
        DriverCall::SetServerPort {
            dpid: dpid.to_string(),
            port,
            region: region.to_string(),
        }
    }

    pub fn clear_server_port(dpid: &str, port: PortNumber) -> DriverCall {
        DriverCall::ClearServerPort {
            dpid: dpid.to_string(),
            port,
        }
    }

    /// Association with the untagged inner VLAN every call site uses.
    pub fn set_association(dpid: &str, outer_port: PortNumber, vlan: u16, region: &str) -> DriverCall {
        DriverCall::SetOuterPortAssociation {
            dpid: dpid.to_string(),
            outer_port,
            outer_vlan: vlan,
            inner_vlan: INNER_VLAN_UNTAGGED,
            region: region.to_string(),
        }
    }

    pub fn clear_association(dpid: &str, outer_port: PortNumber, vlan: u16) -> DriverCall {
        DriverCall::ClearOuterPortAssociation {
            dpid: dpid.to_string(),
            outer_port,
            outer_vlan: vlan,
        }
    }

    pub fn save() -> DriverCall {
        DriverCall::Save
    }
}
