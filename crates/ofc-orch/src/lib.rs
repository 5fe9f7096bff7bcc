//! Region orchestration for the OpenFlow controller.
//!
//! A region is the controller-side isolation domain of one tenant network.
//! [`OfcManager`] creates it on first use, binds and unbinds server ports,
//! programs the VLAN trunk on the outer ports, and tears it down when the
//! last server port is gone.

pub mod error;
pub mod manager;
pub mod outer_port;
pub mod region;
pub mod region_lock;

pub use error::{AssociationError, OfcManagerError, OfcManagerResult};
pub use manager::{
    OfcManager, OfcManagerConfig, OfcManagerStats, RegionPort, DEFAULT_CALL_TIMEOUT,
};
pub use outer_port::{OuterPort, OuterPortRegistry, RegistryError};
pub use region::{region_name, DetachOutcome};
pub use region_lock::RegionLocks;
