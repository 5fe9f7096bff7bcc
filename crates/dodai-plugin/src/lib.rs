//! Dodai network control plugin.
//!
//! [`DodaiPlugin`] serves network, subnet, port, floating IP and outer-port
//! operations. Compute ports on controlled networks are bound to the
//! network's OpenFlow controller region through [`dodai_ofc_orch::OfcManager`],
//! and floating IP associations are published to instance metadata.
//!
//! Collaborators sit behind traits so they can be swapped in tests:
//!
//! - [`NetworkStore`]: record persistence ([`MemoryStore`])
//! - [`ComputeInventory`] / [`InstanceMetadata`]: compute service ([`NovaClient`])
//! - [`dodai_ofc_driver::OfcDriver`]: the controller

pub mod compute;
pub mod config;
pub mod error;
pub mod metadata;
pub mod nova;
pub mod plugin;
pub mod store;
pub mod types;

pub use compute::{
    ComputeError, ComputeInventory, ComputeResult, InstanceMetadata, Metadata, PhysicalInterface,
};
pub use config::{NovaConfig, OfcConfig, PluginConfig, DEFAULT_CONFIG_PATH};
pub use error::{PluginError, PluginResult};
pub use metadata::{DnsNameserver, FloatingIpMetadata, FLOATING_IP_KEY_PREFIX};
pub use nova::NovaClient;
pub use plugin::{DodaiPlugin, RouterOperation, SUPPORTED_EXTENSIONS};
pub use store::{MemoryStore, NetworkStore};
pub use types::{
    CreateFloatingIp, CreateNetwork, CreatePort, CreateSubnet, FixedIp, FloatingIp,
    FloatingIpUpdate, Network, NetworkFilter, NetworkUpdate, Port, Subnet,
    DEVICE_OWNER_COMPUTE_PREFIX, DEVICE_OWNER_FLOATING_IP, NETWORK_STATUS_ACTIVE,
};
