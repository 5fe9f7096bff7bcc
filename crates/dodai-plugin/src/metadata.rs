//! Floating IP configuration published to guest-visible instance metadata.
//!
//! Each associated floating IP is one metadata entry under
//! `floating_ip_<n>` whose value is a JSON object the guest agent reads to
//! configure an extra interface.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compute::{InstanceMetadata, Metadata};
use crate::error::{PluginError, PluginResult};
use crate::types::{FloatingIp, Port, Subnet};

/// Metadata key prefix of floating IP entries.
pub const FLOATING_IP_KEY_PREFIX: &str = "floating_ip_";

static FLOATING_IP_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^floating_ip_(\d+)$").expect("Invalid regex pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsNameserver {
    pub address: String,
}

/// Guest-side configuration of one floating IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingIpMetadata {
    pub ip_address: String,
    pub mac_address: String,
    pub netmask: String,
    pub gateway_ip: Option<String>,
    pub dnsnameservers: Vec<DnsNameserver>,
}

impl FloatingIpMetadata {
    /// Builds the entry from the floating IP, the port holding its address,
    /// and that port's subnet.
    pub fn new(floating_ip: &FloatingIp, floating_port: &Port, subnet: &Subnet) -> Self {
        Self {
            ip_address: floating_ip.floating_ip_address.to_string(),
            mac_address: floating_port.mac_address.clone(),
            netmask: subnet.cidr.mask().to_string(),
            gateway_ip: subnet.gateway_ip.map(|ip| ip.to_string()),
            dnsnameservers: subnet
                .dns_nameservers
                .iter()
                .map(|ip| DnsNameserver {
                    address: ip.to_string(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> PluginResult<String> {
        serde_json::to_string(self).map_err(|e| {
            PluginError::invalid_input(format!("cannot encode floating IP metadata: {}", e))
        })
    }
}

/// Numeric suffix of a floating IP key, or `None` for other keys.
pub fn key_index(key: &str) -> Option<u64> {
    FLOATING_IP_KEY_RE
        .captures(key)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn floating_ip_key(index: u64) -> String {
    format!("{}{}", FLOATING_IP_KEY_PREFIX, index)
}

#[derive(Deserialize)]
struct EntryAddress {
    ip_address: String,
}

/// Address recorded in a floating IP entry. Unreadable values yield `None`.
fn entry_address(key: &str, value: &str) -> Option<String> {
    match serde_json::from_str::<EntryAddress>(value) {
        Ok(entry) => Some(entry.ip_address),
        Err(e) => {
            warn!("Ignoring unreadable metadata entry {}: {}", key, e);
            None
        }
    }
}

/// Key of the entry recording `ip_address`, if any.
pub fn find_key(metadata: &Metadata, ip_address: &str) -> Option<String> {
    metadata
        .iter()
        .filter(|(key, _)| key_index(key).is_some())
        .find(|(key, value)| entry_address(key, value).as_deref() == Some(ip_address))
        .map(|(key, _)| key.clone())
}

/// Key to write `ip_address` under: its existing entry, else one past the
/// highest index in use.
pub fn slot_for(metadata: &Metadata, ip_address: &str) -> String {
    find_key(metadata, ip_address).unwrap_or_else(|| {
        let next = metadata
            .keys()
            .filter_map(|key| key_index(key))
            .max()
            .unwrap_or(0)
            + 1;
        floating_ip_key(next)
    })
}

/// Writes the entry into the instance's metadata. Returns the key used.
pub async fn publish(
    store: &dyn InstanceMetadata,
    tenant_id: &str,
    instance_id: &str,
    entry: &FloatingIpMetadata,
) -> PluginResult<String> {
    let metadata = store.get_metadata(tenant_id, instance_id).await?;
    let key = slot_for(&metadata, &entry.ip_address);
    let value = entry.to_json()?;

    store
        .set_metadata(tenant_id, instance_id, &key, &value)
        .await?;
    info!(
        "Published floating IP {} to instance {} as {}",
        entry.ip_address, instance_id, key
    );
    Ok(key)
}

/// Removes the entry for `ip_address`. Returns the removed key, or `None`
/// when the instance had no such entry.
pub async fn withdraw(
    store: &dyn InstanceMetadata,
    tenant_id: &str,
    instance_id: &str,
    ip_address: &str,
) -> PluginResult<Option<String>> {
    let metadata = store.get_metadata(tenant_id, instance_id).await?;
    let Some(key) = find_key(&metadata, ip_address) else {
        warn!(
            "No metadata entry for floating IP {} on instance {}",
            ip_address, instance_id
        );
        return Ok(None);
    };

    store
        .delete_metadata_key(tenant_id, instance_id, &key)
        .await?;
    debug!("Removed {} from instance {}", key, instance_id);
    Ok(Some(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipnetwork::IpNetwork;
    use pretty_assertions::assert_eq;

    fn entry(ip: &str) -> String {
        format!(
            r#"{{"ip_address": "{}", "mac_address": "fa:16:3e:00:00:01", "netmask": "255.255.255.0", "gateway_ip": null, "dnsnameservers": []}}"#,
            ip
        )
    }

    #[test]
    fn test_key_index() {
        assert_eq!(key_index("floating_ip_1"), Some(1));
        assert_eq!(key_index("floating_ip_12"), Some(12));
        assert_eq!(key_index("floating_ip_"), None);
        assert_eq!(key_index("floating_ip_x"), None);
        assert_eq!(key_index("my_floating_ip_1"), None);
        assert_eq!(key_index("role"), None);
    }

    #[test]
    fn test_slot_starts_at_one() {
        let metadata = Metadata::new();
        assert_eq!(slot_for(&metadata, "10.0.0.5"), "floating_ip_1");
    }

    #[test]
    fn test_slot_reuses_matching_entry() {
        let mut metadata = Metadata::new();
        metadata.insert("floating_ip_1".to_string(), entry("10.0.0.5"));
        metadata.insert("floating_ip_3".to_string(), entry("10.0.0.6"));
        assert_eq!(slot_for(&metadata, "10.0.0.6"), "floating_ip_3");
    }

    #[test]
    fn test_slot_after_highest_index() {
        let mut metadata = Metadata::new();
        metadata.insert("floating_ip_2".to_string(), entry("10.0.0.5"));
        metadata.insert("floating_ip_9".to_string(), entry("10.0.0.6"));
        metadata.insert("role".to_string(), "web".to_string());
        assert_eq!(slot_for(&metadata, "10.0.0.7"), "floating_ip_10");
    }

    #[test]
    fn test_unreadable_entry_is_skipped() {
        let mut metadata = Metadata::new();
        metadata.insert("floating_ip_1".to_string(), "not json".to_string());
        assert_eq!(find_key(&metadata, "10.0.0.5"), None);
        assert_eq!(slot_for(&metadata, "10.0.0.5"), "floating_ip_2");
    }

    #[test]
    fn test_entry_json_shape() {
        let subnet = Subnet {
            id: "s1".to_string(),
            network_id: "n1".to_string(),
            tenant_id: "t1".to_string(),
            cidr: "192.0.2.0/24".parse::<IpNetwork>().unwrap(),
            gateway_ip: Some("192.0.2.1".parse().unwrap()),
            dns_nameservers: vec!["192.0.2.53".parse().unwrap()],
        };
        let port = Port {
            id: "p1".to_string(),
            network_id: "n1".to_string(),
            tenant_id: String::new(),
            device_id: "fip1".to_string(),
            device_owner: crate::types::DEVICE_OWNER_FLOATING_IP.to_string(),
            mac_address: "fa:16:3e:aa:bb:cc".to_string(),
            fixed_ips: Vec::new(),
        };
        let fip = FloatingIp {
            id: "fip1".to_string(),
            tenant_id: "t1".to_string(),
            floating_ip_address: "192.0.2.10".parse().unwrap(),
            floating_network_id: "n1".to_string(),
            floating_port_id: "p1".to_string(),
            fixed_port_id: None,
            fixed_ip_address: None,
        };

        let value: serde_json::Value =
            serde_json::from_str(&FloatingIpMetadata::new(&fip, &port, &subnet).to_json().unwrap())
                .unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "ip_address": "192.0.2.10",
                "mac_address": "fa:16:3e:aa:bb:cc",
                "netmask": "255.255.255.0",
                "gateway_ip": "192.0.2.1",
                "dnsnameservers": [{"address": "192.0.2.53"}],
            })
        );
    }
}
