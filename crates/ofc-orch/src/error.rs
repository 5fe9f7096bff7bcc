//! Error types for region orchestration.

use dodai_ofc_driver::{OfcError, VlanId};
use thiserror::Error;

use crate::outer_port::RegistryError;

/// Result type alias for orchestrator operations.
pub type OfcManagerResult<T> = Result<T, OfcManagerError>;

/// Errors surfaced by [`crate::OfcManager`].
#[derive(Debug, Error)]
pub enum OfcManagerError {
    /// The controller refused (or never answered) `createRegion`/`save`.
    #[error("It failed to create region {region}")]
    RegionCreationFailed {
        region: String,
        #[source]
        source: OfcError,
    },

    /// Outer-port associations could not be programmed; the region was rolled back.
    #[error("It failed to set outer port association for region {region} and VLAN {vlan}")]
    RegionSettingOuterPortAssocFailed {
        region: String,
        vlan: VlanId,
        #[source]
        source: AssociationError,
    },

    /// The region does not exist on the controller.
    #[error("Region {region} of the OpenFlow controller could not be found")]
    RegionNotFound { region: String },

    /// Any other controller fault.
    #[error(transparent)]
    Controller(#[from] OfcError),
}

impl OfcManagerError {
    /// Short name of the error kind, for logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            OfcManagerError::RegionCreationFailed { .. } => "RegionCreationFailed",
            OfcManagerError::RegionSettingOuterPortAssocFailed { .. } => {
                "RegionSettingOuterPortAssocFailed"
            }
            OfcManagerError::RegionNotFound { .. } => "RegionNotFound",
            OfcManagerError::Controller(_) => "ControllerError",
        }
    }

    /// Returns the region the error relates to, if known.
    pub fn region(&self) -> Option<&str> {
        match self {
            OfcManagerError::RegionCreationFailed { region, .. }
            | OfcManagerError::RegionSettingOuterPortAssocFailed { region, .. }
            | OfcManagerError::RegionNotFound { region } => Some(region),
            OfcManagerError::Controller(_) => None,
        }
    }
}

/// Why programming the outer-port associations failed.
#[derive(Debug, Error)]
pub enum AssociationError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Controller(#[from] OfcError),
}
