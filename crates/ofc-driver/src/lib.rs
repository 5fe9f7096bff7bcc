//! Driver layer for the OpenFlow controller (OFC).
//!
//! The orchestrator never talks to a controller directly; it goes through the
//! [`OfcDriver`] trait implemented here by:
//!
//! - [`L2eVncDriver`]: SOAP client for an L2E-VNC 2.0 controller
//! - [`NullDriver`]: no controller at all, for tests and controller-less sites
//!
//! # Example
//!
//! ```ignore
//! use dodai_ofc_driver::{build_driver, DriverKind, DriverSettings};
//!
//! let driver = build_driver(&settings)?;
//! driver.create_region("3f2a9c0e...").await?;
//! driver.save().await?;
//! ```

pub mod driver;
pub mod error;
pub mod l2e_vnc;
pub mod null;
pub mod soap;
pub mod types;

pub use driver::{build_driver, DriverKind, DriverSettings, OfcDriver};
pub use error::{OfcError, OfcResult};
pub use l2e_vnc::L2eVncDriver;
pub use null::NullDriver;
pub use types::{
    DatapathInfo, Dpid, PortInfo, PortNumber, PortType, RegionInfo, VlanId, INNER_VLAN_UNTAGGED,
    SERVER_PORT_TYPE,
};
