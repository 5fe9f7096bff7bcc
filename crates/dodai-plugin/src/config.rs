//! Plugin configuration file support.
//!
//! Loads and validates the plugin configuration from TOML.
//! Default location: /etc/dodai/dodai_plugin.toml

use dodai_ofc_driver::{DriverKind, DriverSettings};
use dodai_ofc_orch::OfcManagerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::{PluginError, PluginResult};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/dodai/dodai_plugin.toml";

/// OpenFlow controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfcConfig {
    /// Driver used to manage the controller
    #[serde(default)]
    pub driver: DriverKind,

    /// URL of the controller SOAP service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,

    /// XML namespace of the controller operations
    #[serde(default = "default_service_namespace")]
    pub service_namespace: String,

    /// Names of networks that never reach the controller
    #[serde(default)]
    pub uncontrolled_network_names: Vec<String>,

    /// Upper bound on each controller call, in seconds
    #[serde(default = "default_ofc_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Compute service (Nova) credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovaConfig {
    /// Admin user
    #[serde(default)]
    pub username: String,

    /// Admin password
    #[serde(default)]
    pub password: String,

    /// Admin tenant, used when a request carries no tenant
    #[serde(default)]
    pub tenant_name: String,

    /// Keystone v2 authentication URL
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Upper bound on each compute-service request, in seconds
    #[serde(default = "default_nova_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Complete plugin configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginConfig {
    #[serde(default)]
    pub ofc: OfcConfig,

    #[serde(default)]
    pub nova: NovaConfig,
}

// Default functions
fn default_service_namespace() -> String {
    "http://ws.vnc.l2e/".to_string()
}

fn default_ofc_request_timeout() -> u64 {
    30
}

fn default_auth_url() -> String {
    "http://127.0.0.1:5000/v2.0".to_string()
}

fn default_nova_request_timeout() -> u64 {
    30
}

impl Default for OfcConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::default(),
            service_url: None,
            service_namespace: default_service_namespace(),
            uncontrolled_network_names: Vec::new(),
            request_timeout_secs: default_ofc_request_timeout(),
        }
    }
}

impl Default for NovaConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            tenant_name: String::new(),
            auth_url: default_auth_url(),
            request_timeout_secs: default_nova_request_timeout(),
        }
    }
}

impl OfcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns true if ports on a network named `network_name` are pushed to
    /// the controller.
    pub fn is_controlled(&self, network_name: &str) -> bool {
        !self
            .uncontrolled_network_names
            .iter()
            .any(|name| name == network_name)
    }

    pub fn driver_settings(&self) -> DriverSettings {
        DriverSettings {
            kind: self.driver,
            service_url: self.service_url.clone(),
            service_namespace: self.service_namespace.clone(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn manager_config(&self) -> OfcManagerConfig {
        OfcManagerConfig::default().with_call_timeout(self.request_timeout())
    }
}

impl NovaConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PluginConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> PluginResult<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content).map_err(|e| {
                PluginError::config(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(PluginError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> PluginResult<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> PluginResult<Self> {
        toml::from_str(content).map_err(|e| PluginError::config(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> PluginResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PluginError::config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> PluginResult<()> {
        if self.ofc.driver == DriverKind::L2eVnc
            && self
                .ofc
                .service_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(PluginError::config(
                "ofc.service_url is required by the l2e-vnc driver",
            ));
        }

        if self.ofc.request_timeout_secs == 0 {
            return Err(PluginError::config(
                "ofc.request_timeout_secs must be > 0",
            ));
        }

        if self.nova.request_timeout_secs == 0 {
            return Err(PluginError::config(
                "nova.request_timeout_secs must be > 0",
            ));
        }

        Ok(())
    }
}
