//! Error types for the network control plugin.

use dodai_ofc_driver::VlanId;
use dodai_ofc_orch::OfcManagerError;
use thiserror::Error;

use crate::compute::ComputeError;

/// Result type alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors surfaced by [`crate::DodaiPlugin`] and its collaborators.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Another network already carries this VLAN
    #[error("Unable to create the network. Network with the same vlan_id {vlan} already exists.")]
    DuplicateVlan { vlan: VlanId },

    #[error("Network {id} could not be found")]
    NetworkNotFound { id: String },

    #[error("Unable to complete operation on network {id}. There are one or more ports still in use on the network.")]
    NetworkInUse { id: String },

    #[error("Subnet {id} could not be found")]
    SubnetNotFound { id: String },

    /// Port missing, or a floating IP with no fixed port to act on.
    #[error("Port {id} could not be found")]
    PortNotFound { id: String },

    /// Port still backs a floating IP
    #[error("Unable to complete operation on port {id}. It holds the address of floating IP {floating_ip_id}.")]
    PortInUse { id: String, floating_ip_id: String },

    #[error("Floating IP {id} could not be found")]
    FloatingIpNotFound { id: String },

    #[error("Dodai OuterPort {id} could not be found.")]
    OuterPortNotFound { id: u64 },

    /// Request field failed validation
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Operation outside the plugin's supported surface
    #[error("Operation {operation} is not supported")]
    Unsupported { operation: String },

    /// Compute-service lookup failed
    #[error(transparent)]
    Compute(#[from] ComputeError),

    /// Controller-side step failed
    #[error(transparent)]
    Ofc(#[from] OfcManagerError),
}

impl PluginError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn network_not_found(id: impl Into<String>) -> Self {
        Self::NetworkNotFound { id: id.into() }
    }

    pub fn port_not_found(id: impl Into<String>) -> Self {
        Self::PortNotFound { id: id.into() }
    }

    /// Short name of the error kind, for logs and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PluginError::Config { .. } => "ConfigError",
            PluginError::Io(_) => "IoError",
            PluginError::DuplicateVlan { .. } => "DuplicateVlan",
            PluginError::NetworkNotFound { .. } => "NetworkNotFound",
            PluginError::NetworkInUse { .. } => "NetworkInUse",
            PluginError::SubnetNotFound { .. } => "SubnetNotFound",
            PluginError::PortNotFound { .. } => "PortNotFound",
            PluginError::PortInUse { .. } => "PortInUse",
            PluginError::FloatingIpNotFound { .. } => "FloatingIpNotFound",
            PluginError::OuterPortNotFound { .. } => "OuterPortNotFound",
            PluginError::InvalidInput { .. } => "InvalidInput",
            PluginError::Unsupported { .. } => "Unsupported",
            PluginError::Compute(e) => e.kind(),
            PluginError::Ofc(e) => e.kind(),
        }
    }

    /// Returns true for errors that mean "no such resource".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PluginError::NetworkNotFound { .. }
                | PluginError::SubnetNotFound { .. }
                | PluginError::PortNotFound { .. }
                | PluginError::FloatingIpNotFound { .. }
                | PluginError::OuterPortNotFound { .. }
                | PluginError::Unsupported { .. }
        )
    }
}
