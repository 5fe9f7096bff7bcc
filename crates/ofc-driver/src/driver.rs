//! The OFC driver capability and driver selection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{OfcError, OfcResult};
use crate::l2e_vnc::L2eVncDriver;
use crate::null::NullDriver;
use crate::types::{DatapathInfo, Dpid, PortInfo, PortNumber, RegionInfo, VlanId};

/// Interface over a physical OpenFlow controller.
///
/// Mutating calls may be buffered by the controller until [`OfcDriver::save`]
/// is issued. None of the calls are idempotent on the controller side.
#[async_trait]
pub trait OfcDriver: Send + Sync {
    /// Returns the driver name (for logging).
    fn name(&self) -> &str;

    async fn create_region(&self, region_name: &str) -> OfcResult<()>;

    async fn destroy_region(&self, region_name: &str) -> OfcResult<()>;

    /// Lists every region known to the controller.
    async fn show_region(&self) -> OfcResult<Vec<RegionInfo>>;

    /// Binds a physical switch port to a region.
    async fn set_server_port(
        &self,
        dpid: &Dpid,
        port: PortNumber,
        region_name: &str,
    ) -> OfcResult<()>;

    async fn clear_server_port(&self, dpid: &Dpid, port: PortNumber) -> OfcResult<()>;

    /// Lists every switch managed by the controller.
    async fn show_switch_datapath_ids(&self) -> OfcResult<Vec<DatapathInfo>>;

    /// Lists the ports of one switch.
    async fn show_ports(&self, dpid: &Dpid) -> OfcResult<Vec<PortInfo>>;

    /// Programs VLAN trunk tagging for a region on an uplink port.
    async fn set_outer_port_association(
        &self,
        dpid: &Dpid,
        outer_port: PortNumber,
        outer_vlan: VlanId,
        inner_vlan: u16,
        region_name: &str,
    ) -> OfcResult<()>;

    async fn clear_outer_port_association(
        &self,
        dpid: &Dpid,
        outer_port: PortNumber,
        outer_vlan: VlanId,
    ) -> OfcResult<()>;

    /// Commits pending configuration on the controller.
    async fn save(&self) -> OfcResult<()>;
}

/// Selects which driver talks to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverKind {
    /// L2E-VNC 2.0 SOAP endpoint.
    #[default]
    L2eVnc,
    /// No controller; every call succeeds and listings are empty.
    Dummy,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::L2eVnc => "l2e-vnc",
            DriverKind::Dummy => "dummy",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = OfcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2e-vnc" => Ok(DriverKind::L2eVnc),
            "dummy" => Ok(DriverKind::Dummy),
            other => Err(OfcError::config(format!("unknown OFC driver '{}'", other))),
        }
    }
}

/// Settings needed to construct a driver.
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub kind: DriverKind,
    /// Controller service endpoint (required by `l2e-vnc`).
    pub service_url: Option<String>,
    /// XML namespace of the controller's SOAP operations.
    pub service_namespace: String,
    /// Upper bound for one request.
    pub request_timeout: Duration,
}

/// Builds the driver selected by `settings`.
pub fn build_driver(settings: &DriverSettings) -> OfcResult<Arc<dyn OfcDriver>> {
    match settings.kind {
        DriverKind::L2eVnc => Ok(Arc::new(L2eVncDriver::new(settings)?)),
        DriverKind::Dummy => Ok(Arc::new(NullDriver::new())),
    }
}
