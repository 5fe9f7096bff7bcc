//! Compute-service collaborators: physical interface lookup and instance
//! metadata.

use async_trait::async_trait;
use dodai_ofc_driver::{Dpid, PortNumber};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Instance metadata as key/value strings.
pub type Metadata = BTreeMap<String, String>;

/// Result type alias for compute-service calls.
pub type ComputeResult<T> = Result<T, ComputeError>;

#[derive(Debug, Clone, Error)]
pub enum ComputeError {
    /// The device, its hosting node, or the NIC with the MAC is absent.
    #[error("Physical interface of device {device_id} with MAC {mac_address} could not be found: {reason}")]
    InterfaceNotFound {
        device_id: String,
        mac_address: String,
        reason: String,
    },

    #[error("Instance {instance_id} could not be found")]
    InstanceNotFound { instance_id: String },

    #[error("Identity service authentication failed: {message}")]
    Auth { message: String },

    #[error("Compute service request {operation} failed: {message}")]
    Request { operation: String, message: String },
}

impl ComputeError {
    pub fn interface_not_found(
        device_id: impl Into<String>,
        mac_address: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InterfaceNotFound {
            device_id: device_id.into(),
            mac_address: mac_address.into(),
            reason: reason.into(),
        }
    }

    pub fn request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ComputeError::InterfaceNotFound { .. } => "InterfaceNotFound",
            ComputeError::InstanceNotFound { .. } => "InstanceNotFound",
            ComputeError::Auth { .. } | ComputeError::Request { .. } => "ComputeError",
        }
    }
}

/// Where a compute NIC plugs into the OpenFlow fabric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalInterface {
    pub dpid: Dpid,
    pub port_no: PortNumber,
    pub mac_address: String,
}

/// Resolves the switch port behind a compute instance's NIC.
#[async_trait]
pub trait ComputeInventory: Send + Sync {
    async fn resolve_physical_interface(
        &self,
        tenant_id: &str,
        device_id: &str,
        mac_address: &str,
    ) -> ComputeResult<PhysicalInterface>;
}

/// Guest-visible instance metadata.
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    async fn get_metadata(&self, tenant_id: &str, instance_id: &str) -> ComputeResult<Metadata>;

    async fn set_metadata(
        &self,
        tenant_id: &str,
        instance_id: &str,
        key: &str,
        value: &str,
    ) -> ComputeResult<()>;

    async fn delete_metadata_key(
        &self,
        tenant_id: &str,
        instance_id: &str,
        key: &str,
    ) -> ComputeResult<()>;
}
