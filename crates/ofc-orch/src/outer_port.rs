//! Outer (uplink) ports eligible for VLAN trunk association.

use async_trait::async_trait;
use dodai_ofc_driver::{Dpid, PortNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An uplink trunk port: one row of the outer-port inventory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OuterPort {
    /// Synthetic inventory id.
    pub id: u64,
    pub dpid: Dpid,
    pub outer_port: PortNumber,
}

impl OuterPort {
    pub fn new(id: u64, dpid: Dpid, outer_port: PortNumber) -> Self {
        Self {
            id,
            dpid,
            outer_port,
        }
    }
}

/// The outer-port inventory could not be read.
#[derive(Debug, Clone, Error)]
#[error("Outer port registry unavailable: {message}")]
pub struct RegistryError {
    pub message: String,
}

impl RegistryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Read-only view of the outer-port inventory.
///
/// The orchestrator only reads it; administration happens elsewhere.
#[async_trait]
pub trait OuterPortRegistry: Send + Sync {
    async fn outer_ports(&self) -> Result<Vec<OuterPort>, RegistryError>;
}

/// A fixed inventory.
#[async_trait]
impl OuterPortRegistry for Vec<OuterPort> {
    async fn outer_ports(&self) -> Result<Vec<OuterPort>, RegistryError> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_registry() {
        let registry = vec![OuterPort::new(1, Dpid::new("00:1").unwrap(), 1)];
        let ports = registry.outer_ports().await.unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].dpid.as_str(), "00:1");
    }

    #[test]
    fn test_registry_error_display() {
        let err = RegistryError::new("database locked");
        assert_eq!(err.to_string(), "Outer port registry unavailable: database locked");
    }
}
