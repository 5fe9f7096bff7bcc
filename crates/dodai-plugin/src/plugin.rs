//! Network control plugin.
//!
//! Translates network, port and floating IP lifecycle calls into region
//! operations on the OpenFlow controller and metadata updates on compute
//! instances.
//!
//! Controller-side steps always run before the matching record mutation, so a
//! failed controller call leaves the store untouched.

use dodai_ofc_driver::{build_driver, Dpid, OfcDriver, PortNumber};
use dodai_ofc_orch::{
    region_name, DetachOutcome, OfcManager, OfcManagerStats, OuterPort, OuterPortRegistry,
};
use ipnetwork::IpNetwork;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::compute::{ComputeInventory, InstanceMetadata, PhysicalInterface};
use crate::config::{OfcConfig, PluginConfig};
use crate::error::{PluginError, PluginResult};
use crate::metadata::{self, FloatingIpMetadata};
use crate::nova::NovaClient;
use crate::store::NetworkStore;
use crate::types::{
    CreateFloatingIp, CreateNetwork, CreatePort, CreateSubnet, FixedIp, FloatingIp,
    FloatingIpUpdate, Network, NetworkFilter, NetworkUpdate, Port, Subnet,
    DEVICE_OWNER_FLOATING_IP, NETWORK_STATUS_ACTIVE,
};

/// API extensions served besides the core network resources.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["router", "dodai-outer-port"];

/// OUI prefix of generated MAC addresses.
const BASE_MAC_PREFIX: &str = "fa:16:3e";

/// Router operations, advertised for API compatibility only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterOperation {
    CreateRouter,
    GetRouter,
    ListRouters,
    UpdateRouter,
    DeleteRouter,
    AddRouterInterface,
    RemoveRouterInterface,
}

impl RouterOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouterOperation::CreateRouter => "create_router",
            RouterOperation::GetRouter => "get_router",
            RouterOperation::ListRouters => "get_routers",
            RouterOperation::UpdateRouter => "update_router",
            RouterOperation::DeleteRouter => "delete_router",
            RouterOperation::AddRouterInterface => "add_router_interface",
            RouterOperation::RemoveRouterInterface => "remove_router_interface",
        }
    }
}

impl fmt::Display for RouterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct DodaiPlugin {
    config: OfcConfig,
    store: Arc<dyn NetworkStore>,
    ofc: OfcManager,
    compute: Arc<dyn ComputeInventory>,
    metadata: Arc<dyn InstanceMetadata>,
}

impl DodaiPlugin {
    /// Creates the plugin over explicit collaborators.
    ///
    /// The store doubles as the orchestrator's outer-port registry.
    pub fn new<S>(
        config: &PluginConfig,
        store: Arc<S>,
        driver: Arc<dyn OfcDriver>,
        compute: Arc<dyn ComputeInventory>,
        metadata: Arc<dyn InstanceMetadata>,
    ) -> Self
    where
        S: NetworkStore + 'static,
    {
        let registry: Arc<dyn OuterPortRegistry> = store.clone();
        let ofc = OfcManager::with_config(driver, registry, config.ofc.manager_config());

        info!(
            "Dodai plugin initialized with OFC driver {}",
            ofc.driver_name()
        );
        Self {
            config: config.ofc.clone(),
            store,
            ofc,
            compute,
            metadata,
        }
    }

    /// Creates the plugin with the configured controller driver and a Nova
    /// client for both compute collaborators.
    pub fn from_config<S>(config: &PluginConfig, store: Arc<S>) -> PluginResult<Self>
    where
        S: NetworkStore + 'static,
    {
        config.validate()?;
        let driver = build_driver(&config.ofc.driver_settings())
            .map_err(|e| PluginError::config(e.to_string()))?;
        let nova = Arc::new(NovaClient::new(&config.nova)?);
        Ok(Self::new(config, store, driver, nova.clone(), nova))
    }

    pub fn supported_extensions(&self) -> &'static [&'static str] {
        SUPPORTED_EXTENSIONS
    }

    /// Answers every router operation with `Unsupported`.
    pub fn router_operation<T>(&self, operation: RouterOperation) -> PluginResult<T> {
        debug!("Rejecting router operation {}", operation);
        Err(PluginError::Unsupported {
            operation: operation.to_string(),
        })
    }

    pub fn ofc(&self) -> &OfcManager {
        &self.ofc
    }

    pub fn stats(&self) -> OfcManagerStats {
        self.ofc.stats()
    }

    fn is_ofc_controlled(&self, network: &Network) -> bool {
        self.config.is_controlled(&network.name)
    }

    // Networks

    #[instrument(skip(self))]
    pub async fn create_network(&self, request: CreateNetwork) -> PluginResult<Network> {
        let name = request.name.clone();
        let network = Network {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            tenant_id: request.tenant_id,
            admin_state_up: request.admin_state_up,
            status: NETWORK_STATUS_ACTIVE.to_string(),
            shared: request.shared,
            external: request.external,
            vlan_id: request.vlan_id,
            subnets: Vec::new(),
        };

        let network = self.store.create_network(network).await.map_err(|e| {
            error!("Failed to create network {}: {}", name, e);
            e
        })?;
        info!(
            "Created network {} ({}) with VLAN {:?}",
            network.id, network.name, network.vlan_id
        );
        Ok(network)
    }

    pub async fn get_network(&self, id: &str) -> PluginResult<Network> {
        self.store.get_network(id).await
    }

    pub async fn get_networks(&self, filter: &NetworkFilter) -> PluginResult<Vec<Network>> {
        self.store.list_networks(filter).await
    }

    #[instrument(skip(self))]
    pub async fn update_network(&self, id: &str, update: NetworkUpdate) -> PluginResult<Network> {
        let network = self.store.update_network(id, &update).await?;
        info!("Updated network {}", id);
        Ok(network)
    }

    #[instrument(skip(self))]
    pub async fn delete_network(&self, id: &str) -> PluginResult<()> {
        self.store.delete_network(id).await?;
        info!("Deleted network {}", id);
        Ok(())
    }

    // Subnets

    #[instrument(skip(self))]
    pub async fn create_subnet(&self, request: CreateSubnet) -> PluginResult<Subnet> {
        let cidr: IpNetwork = request.cidr.parse().map_err(|e| {
            PluginError::invalid_input(format!("invalid cidr {}: {}", request.cidr, e))
        })?;
        if let Some(gateway) = request.gateway_ip {
            if !cidr.contains(gateway) {
                return Err(PluginError::invalid_input(format!(
                    "gateway {} is outside {}",
                    gateway, cidr
                )));
            }
        }

        let subnet = Subnet {
            id: Uuid::new_v4().to_string(),
            network_id: request.network_id,
            tenant_id: request.tenant_id,
            cidr,
            gateway_ip: request.gateway_ip,
            dns_nameservers: request.dns_nameservers,
        };
        let subnet = self.store.create_subnet(subnet).await?;
        info!("Created subnet {} {} on network {}", subnet.id, cidr, subnet.network_id);
        Ok(subnet)
    }

    pub async fn get_subnet(&self, id: &str) -> PluginResult<Subnet> {
        self.store.get_subnet(id).await
    }

    // Ports

    /// Creates a port. Compute ports on controlled networks are bound to the
    /// network's region first; the record is only stored once that succeeds.
    #[instrument(skip(self))]
    pub async fn create_port(&self, request: CreatePort) -> PluginResult<Port> {
        let network = self.store.get_network(&request.network_id).await?;
        self.validate_fixed_ips(&network, &request.fixed_ips).await?;
        let port = new_port(request);

        if port.is_compute() && self.is_ofc_controlled(&network) {
            self.bind_server_port(&network, &port).await?;
        } else {
            debug!(
                "Port {} on network {} does not reach the controller",
                port.id, network.name
            );
        }

        let port = self.store.create_port(port).await?;
        info!("Created port {} on network {}", port.id, port.network_id);
        Ok(port)
    }

    pub async fn get_port(&self, id: &str) -> PluginResult<Port> {
        self.store.get_port(id).await
    }

    pub async fn get_ports(&self, network_id: Option<&str>) -> PluginResult<Vec<Port>> {
        self.store.list_ports(network_id).await
    }

    /// Deletes a port. Compute ports on controlled networks are unbound from
    /// the region first, which may tear the region down.
    #[instrument(skip(self))]
    pub async fn delete_port(&self, id: &str) -> PluginResult<()> {
        let port = self.store.get_port(id).await?;
        if port.is_compute() {
            let network = self.store.get_network(&port.network_id).await?;
            if self.is_ofc_controlled(&network) {
                self.unbind_server_port(&network, &port).await?;
            }
        }

        let released = self.store.delete_port(id).await?;
        for floating_ip in &released {
            info!(
                "Disassociated floating IP {} from deleted port {}",
                floating_ip.floating_ip_address, id
            );
        }
        info!("Deleted port {}", id);
        Ok(())
    }

    async fn validate_fixed_ips(&self, network: &Network, fixed_ips: &[FixedIp]) -> PluginResult<()> {
        for fixed_ip in fixed_ips {
            let subnet = self.store.get_subnet(&fixed_ip.subnet_id).await?;
            if subnet.network_id != network.id {
                return Err(PluginError::invalid_input(format!(
                    "subnet {} is not on network {}",
                    subnet.id, network.id
                )));
            }
            if !subnet.cidr.contains(fixed_ip.ip_address) {
                return Err(PluginError::invalid_input(format!(
                    "address {} is outside subnet {}",
                    fixed_ip.ip_address, subnet.cidr
                )));
            }
        }
        Ok(())
    }

    async fn resolve_interface(&self, port: &Port) -> PluginResult<PhysicalInterface> {
        self.compute
            .resolve_physical_interface(&port.tenant_id, &port.device_id, &port.mac_address)
            .await
            .map_err(|e| {
                error!("Cannot resolve physical interface of port {}: {}", port.id, e);
                PluginError::from(e)
            })
    }

    async fn bind_server_port(&self, network: &Network, port: &Port) -> PluginResult<()> {
        let iface = self.resolve_interface(port).await?;
        let region = region_name(&network.id);

        self.ofc
            .run_instance(&region, network.vlan_id, iface.port_no, &iface.dpid)
            .await
            .map_err(|e| {
                error!(
                    "Failed to bind {}:{} to region {}: {}",
                    iface.dpid, iface.port_no, region, e
                );
                PluginError::from(e)
            })
    }

    async fn unbind_server_port(&self, network: &Network, port: &Port) -> PluginResult<()> {
        let iface = self.resolve_interface(port).await?;
        let region = region_name(&network.id);

        let outcome = self
            .ofc
            .terminate_instance(&region, network.vlan_id, iface.port_no, &iface.dpid)
            .await
            .map_err(|e| {
                error!(
                    "Failed to unbind {}:{} from region {}: {}",
                    iface.dpid, iface.port_no, region, e
                );
                PluginError::from(e)
            })?;

        if outcome == DetachOutcome::RegionRemoved {
            info!("Region {} of network {} removed", region, network.id);
        }
        Ok(())
    }

    // Floating IPs

    /// Allocates a floating IP and the external-network port holding its
    /// address.
    #[instrument(skip(self))]
    pub async fn create_floating_ip(&self, request: CreateFloatingIp) -> PluginResult<FloatingIp> {
        let network = self.store.get_network(&request.floating_network_id).await?;
        if !network.external {
            return Err(PluginError::invalid_input(format!(
                "network {} is not external",
                network.id
            )));
        }

        let id = Uuid::new_v4().to_string();
        let fixed_ips = vec![FixedIp {
            subnet_id: request.subnet_id,
            ip_address: request.floating_ip_address,
        }];
        self.validate_fixed_ips(&network, &fixed_ips).await?;
        let floating_port = new_port(CreatePort {
            network_id: network.id.clone(),
            tenant_id: String::new(),
            device_id: id.clone(),
            device_owner: DEVICE_OWNER_FLOATING_IP.to_string(),
            mac_address: None,
            fixed_ips,
        });

        let record = FloatingIp {
            id,
            tenant_id: request.tenant_id,
            floating_ip_address: request.floating_ip_address,
            floating_network_id: network.id,
            floating_port_id: floating_port.id.clone(),
            fixed_port_id: None,
            fixed_ip_address: None,
        };
        let floating_ip = self.store.create_floating_ip(floating_port, record).await?;
        info!(
            "Created floating IP {} ({})",
            floating_ip.id, floating_ip.floating_ip_address
        );
        Ok(floating_ip)
    }

    pub async fn get_floating_ip(&self, id: &str) -> PluginResult<FloatingIp> {
        self.store.get_floating_ip(id).await
    }

    /// Associates (`port_id` set) or disassociates the floating IP, keeping
    /// the instance's metadata in step.
    #[instrument(skip(self))]
    pub async fn update_floating_ip(
        &self,
        id: &str,
        update: FloatingIpUpdate,
    ) -> PluginResult<FloatingIp> {
        let floating_ip = self.store.get_floating_ip(id).await?;

        let Some(port_id) = update.port_id else {
            return self.disassociate_floating_ip(floating_ip).await;
        };

        let fixed_port = self.store.get_port(&port_id).await?;
        let fixed_ip_address = match update.fixed_ip_address {
            Some(address) => Some(address),
            None => fixed_port.fixed_ips.first().map(|ip| ip.ip_address),
        };

        if fixed_port.has_device() {
            let entry = self.floating_ip_metadata(&floating_ip).await?;
            metadata::publish(
                self.metadata.as_ref(),
                &fixed_port.tenant_id,
                &fixed_port.device_id,
                &entry,
            )
            .await?;
        }

        let floating_ip = self
            .store
            .update_floating_ip(id, fixed_ip_address, Some(port_id))
            .await?;
        info!(
            "Associated floating IP {} with port {:?}",
            floating_ip.floating_ip_address, floating_ip.fixed_port_id
        );
        Ok(floating_ip)
    }

    async fn disassociate_floating_ip(&self, floating_ip: FloatingIp) -> PluginResult<FloatingIp> {
        let Some(port_id) = floating_ip.fixed_port_id.as_deref() else {
            return Err(PluginError::port_not_found(format!(
                "for floating IP {}",
                floating_ip.id
            )));
        };

        let fixed_port = self.store.get_port(port_id).await?;
        if fixed_port.has_device() {
            metadata::withdraw(
                self.metadata.as_ref(),
                &fixed_port.tenant_id,
                &fixed_port.device_id,
                &floating_ip.floating_ip_address.to_string(),
            )
            .await?;
        }

        let updated = self
            .store
            .update_floating_ip(&floating_ip.id, None, None)
            .await?;
        info!(
            "Disassociated floating IP {} from port {}",
            updated.floating_ip_address, port_id
        );
        Ok(updated)
    }

    async fn floating_ip_metadata(&self, floating_ip: &FloatingIp) -> PluginResult<FloatingIpMetadata> {
        let floating_port = self.store.get_port(&floating_ip.floating_port_id).await?;
        let allocation = floating_port
            .fixed_ips
            .iter()
            .find(|ip| ip.ip_address == floating_ip.floating_ip_address)
            .ok_or_else(|| {
                PluginError::invalid_input(format!(
                    "port {} does not hold {}",
                    floating_port.id, floating_ip.floating_ip_address
                ))
            })?;
        let subnet = self.store.get_subnet(&allocation.subnet_id).await?;
        Ok(FloatingIpMetadata::new(floating_ip, &floating_port, &subnet))
    }

    /// Releases the floating IP and its external-network port together.
    #[instrument(skip(self))]
    pub async fn delete_floating_ip(&self, id: &str) -> PluginResult<()> {
        let floating_ip = self.store.delete_floating_ip(id).await?;
        if floating_ip.is_associated() {
            warn!(
                "Floating IP {} deleted while associated with port {:?}",
                floating_ip.floating_ip_address, floating_ip.fixed_port_id
            );
        }
        info!(
            "Deleted floating IP {} and port {}",
            id, floating_ip.floating_port_id
        );
        Ok(())
    }

    // Outer ports

    pub async fn list_outer_ports(&self) -> PluginResult<Vec<OuterPort>> {
        self.store.list_outer_ports().await
    }

    pub async fn get_outer_port(&self, id: u64) -> PluginResult<OuterPort> {
        self.store.get_outer_port(id).await
    }

    /// Registers an uplink. Regions created afterwards are associated with
    /// it; existing regions are not touched.
    #[instrument(skip(self))]
    pub async fn create_outer_port(
        &self,
        dpid: Dpid,
        outer_port: PortNumber,
    ) -> PluginResult<OuterPort> {
        let port = self.store.create_outer_port(dpid, outer_port).await?;
        info!(
            "Registered outer port {} at {}:{}",
            port.id, port.dpid, port.outer_port
        );
        Ok(port)
    }

    #[instrument(skip(self))]
    pub async fn delete_outer_port(&self, id: u64) -> PluginResult<()> {
        self.store.delete_outer_port(id).await?;
        info!("Removed outer port {}", id);
        Ok(())
    }
}

/// Random locally administered MAC under [`BASE_MAC_PREFIX`].
fn new_port(request: CreatePort) -> Port {
    Port {
        id: Uuid::new_v4().to_string(),
        network_id: request.network_id,
        tenant_id: request.tenant_id,
        device_id: request.device_id,
        device_owner: request.device_owner,
        mac_address: request.mac_address.unwrap_or_else(generate_mac_address),
        fixed_ips: request.fixed_ips,
    }
}

fn generate_mac_address() -> String {
    let bytes = Uuid::new_v4().into_bytes();
    format!(
        "{}:{:02x}:{:02x}:{:02x}",
        BASE_MAC_PREFIX, bytes[0], bytes[1], bytes[2]
    )
}
