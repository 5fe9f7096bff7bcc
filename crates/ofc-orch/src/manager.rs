//! OfcManager - region lifecycle on the OpenFlow controller.
//!
//! Lifecycle of a region, keyed by the hyphen-free network id:
//! 1. First server port of a network on any switch creates the region and,
//!    for VLAN-tagged networks, associates every outer port with it.
//! 2. Further server ports are bound to the existing region.
//! 3. When the last server port is cleared, the associations are released
//!    (best effort) and the region is destroyed.
//!
//! Every mutation is followed by `save`. No call is retried.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dodai_ofc_driver::{
    Dpid, OfcDriver, OfcError, OfcResult, PortInfo, PortNumber, VlanId, INNER_VLAN_UNTAGGED,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{AssociationError, OfcManagerError, OfcManagerResult};
use crate::outer_port::OuterPortRegistry;
use crate::region::DetachOutcome;
use crate::region_lock::RegionLocks;

/// Default bound on a single controller call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// OfcManager configuration.
#[derive(Debug, Clone)]
pub struct OfcManagerConfig {
    /// Upper bound on every individual driver call.
    pub call_timeout: Duration,
}

impl Default for OfcManagerConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl OfcManagerConfig {
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    regions_created: AtomicU64,
    regions_destroyed: AtomicU64,
    creation_rollbacks: AtomicU64,
    outer_port_clear_failures: AtomicU64,
}

/// Point-in-time copy of the orchestrator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfcManagerStats {
    pub regions_created: u64,
    pub regions_destroyed: u64,
    /// Regions destroyed again because outer-port association failed.
    pub creation_rollbacks: u64,
    /// Association clears that failed during teardown and were skipped.
    /// Each one may have left an association behind on the controller.
    pub outer_port_clear_failures: u64,
}

/// A server port found bound to a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPort {
    pub dpid: Dpid,
    pub port: PortInfo,
}

/// Drives region create/attach/detach/destroy against an [`OfcDriver`].
pub struct OfcManager {
    driver: Arc<dyn OfcDriver>,
    outer_ports: Arc<dyn OuterPortRegistry>,
    config: OfcManagerConfig,
    locks: RegionLocks,
    counters: Counters,
}

impl OfcManager {
    pub fn new(driver: Arc<dyn OfcDriver>, outer_ports: Arc<dyn OuterPortRegistry>) -> Self {
        Self::with_config(driver, outer_ports, OfcManagerConfig::default())
    }

    pub fn with_config(
        driver: Arc<dyn OfcDriver>,
        outer_ports: Arc<dyn OuterPortRegistry>,
        config: OfcManagerConfig,
    ) -> Self {
        Self {
            driver,
            outer_ports,
            config,
            locks: RegionLocks::new(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &OfcManagerConfig {
        &self.config
    }

    /// Returns the underlying driver name.
    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    pub fn stats(&self) -> OfcManagerStats {
        OfcManagerStats {
            regions_created: self.counters.regions_created.load(Ordering::Relaxed),
            regions_destroyed: self.counters.regions_destroyed.load(Ordering::Relaxed),
            creation_rollbacks: self.counters.creation_rollbacks.load(Ordering::Relaxed),
            outer_port_clear_failures: self
                .counters
                .outer_port_clear_failures
                .load(Ordering::Relaxed),
        }
    }

    /// Bounds a driver call by the configured timeout.
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> OfcResult<T>
    where
        F: Future<Output = OfcResult<T>>,
    {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(OfcError::timeout(operation, self.config.call_timeout)),
        }
    }

    async fn save(&self) -> OfcResult<()> {
        self.call("save", self.driver.save()).await
    }

    async fn create_and_save(&self, region_name: &str) -> OfcResult<()> {
        self.call("createRegion", self.driver.create_region(region_name))
            .await?;
        self.save().await
    }

    async fn destroy_and_save(&self, region_name: &str) -> OfcResult<()> {
        self.call("destroyRegion", self.driver.destroy_region(region_name))
            .await?;
        self.save().await
    }

    /// Returns true if the controller lists `region_name`.
    #[instrument(skip(self))]
    pub async fn has_region(&self, region_name: &str) -> OfcManagerResult<bool> {
        let regions = self.call("showRegion", self.driver.show_region()).await?;
        Ok(regions.iter().any(|r| r.region_name == region_name))
    }

    /// Creates a region and, for tagged VLANs, associates every outer port.
    ///
    /// If association fails the region is destroyed again before the error
    /// is returned.
    #[instrument(skip(self))]
    pub async fn create_region(
        &self,
        region_name: &str,
        vlan_id: Option<VlanId>,
    ) -> OfcManagerResult<()> {
        if let Err(source) = self.create_and_save(region_name).await {
            error!("Failed to create region {}: {}", region_name, source);
            return Err(OfcManagerError::RegionCreationFailed {
                region: region_name.to_string(),
                source,
            });
        }

        if let Some(vlan) = vlan_id.filter(VlanId::is_tagged) {
            if let Err(source) = self.associate_outer_ports(region_name, vlan).await {
                error!(
                    "Failed to associate outer ports of region {} with VLAN {}: {}",
                    region_name, vlan, source
                );
                self.rollback_region(region_name).await;
                return Err(OfcManagerError::RegionSettingOuterPortAssocFailed {
                    region: region_name.to_string(),
                    vlan,
                    source,
                });
            }
        }

        self.counters.regions_created.fetch_add(1, Ordering::Relaxed);
        info!("Created region {}", region_name);
        Ok(())
    }

    async fn associate_outer_ports(
        &self,
        region_name: &str,
        vlan: VlanId,
    ) -> Result<(), AssociationError> {
        let outer_ports = self.outer_ports.outer_ports().await?;
        for outer in &outer_ports {
            self.call(
                "setOuterPortAssociationSetting",
                self.driver.set_outer_port_association(
                    &outer.dpid,
                    outer.outer_port,
                    vlan,
                    INNER_VLAN_UNTAGGED,
                    region_name,
                ),
            )
            .await?;
            debug!(
                "Associated outer port {}:{} with region {} on VLAN {}",
                outer.dpid, outer.outer_port, region_name, vlan
            );
        }
        self.save().await?;
        Ok(())
    }

    /// Compensation for a half-created region. Failures are logged only.
    async fn rollback_region(&self, region_name: &str) {
        self.counters
            .creation_rollbacks
            .fetch_add(1, Ordering::Relaxed);
        match self.destroy_and_save(region_name).await {
            Ok(()) => warn!("Rolled back region {}", region_name),
            Err(e) => error!(
                "Failed to roll back region {}, it may be left on the controller: {}",
                region_name, e
            ),
        }
    }

    /// Releases outer-port associations (best effort) and destroys the region.
    #[instrument(skip(self))]
    pub async fn remove_region(
        &self,
        region_name: &str,
        vlan_id: Option<VlanId>,
    ) -> OfcManagerResult<()> {
        if let Some(vlan) = vlan_id.filter(VlanId::is_tagged) {
            self.dissociate_outer_ports(region_name, vlan).await;
        }

        self.destroy_and_save(region_name).await?;

        self.counters
            .regions_destroyed
            .fetch_add(1, Ordering::Relaxed);
        info!("Removed region {}", region_name);
        Ok(())
    }

    /// Clears every outer-port association, skipping failures.
    async fn dissociate_outer_ports(&self, region_name: &str, vlan: VlanId) {
        let outer_ports = match self.outer_ports.outer_ports().await {
            Ok(ports) => ports,
            Err(e) => {
                self.counters
                    .outer_port_clear_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Cannot list outer ports, associations of region {} on VLAN {} are left in place: {}",
                    region_name, vlan, e
                );
                return;
            }
        };

        for outer in &outer_ports {
            let cleared = self
                .call(
                    "clearOuterPortAssociationSetting",
                    self.driver
                        .clear_outer_port_association(&outer.dpid, outer.outer_port, vlan),
                )
                .await;
            if let Err(e) = cleared {
                self.counters
                    .outer_port_clear_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Failed to clear outer port {}:{} on VLAN {} for region {}: {}",
                    outer.dpid, outer.outer_port, vlan, region_name, e
                );
            }
        }

        if let Err(e) = self.save().await {
            self.counters
                .outer_port_clear_failures
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                "Failed to save cleared associations of region {}: {}",
                region_name, e
            );
        }
    }

    /// Binds a switch port to a region.
    #[instrument(skip(self))]
    pub async fn attach_server_port(
        &self,
        region_name: &str,
        port: PortNumber,
        dpid: &Dpid,
    ) -> OfcManagerResult<()> {
        self.call(
            "setServerPort",
            self.driver.set_server_port(dpid, port, region_name),
        )
        .await?;
        self.save().await?;
        info!("Attached {}:{} to region {}", dpid, port, region_name);
        Ok(())
    }

    /// Unbinds a switch port and tears the region down if nothing else uses it.
    #[instrument(skip(self))]
    pub async fn detach_server_port(
        &self,
        region_name: &str,
        port: PortNumber,
        dpid: &Dpid,
        vlan_id: Option<VlanId>,
    ) -> OfcManagerResult<DetachOutcome> {
        self.call("clearServerPort", self.driver.clear_server_port(dpid, port))
            .await?;
        self.save().await?;
        info!("Detached {}:{} from region {}", dpid, port, region_name);

        if self.region_in_use(region_name).await? {
            debug!("Region {} still has server ports", region_name);
            return Ok(DetachOutcome::RegionInUse);
        }

        self.remove_region(region_name, vlan_id).await?;
        Ok(DetachOutcome::RegionRemoved)
    }

    /// Returns true if any switch has a server port bound to `region_name`.
    ///
    /// Stops at the first match.
    #[instrument(skip(self))]
    pub async fn region_in_use(&self, region_name: &str) -> OfcManagerResult<bool> {
        let switches = self
            .call("showDatapathId", self.driver.show_switch_datapath_ids())
            .await?;
        for switch in &switches {
            let ports = self
                .call("showPorts", self.driver.show_ports(&switch.dpid))
                .await?;
            if ports.iter().any(|p| p.is_server_port_of(region_name)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Lists every server port bound to `region_name`, across all switches.
    #[instrument(skip(self))]
    pub async fn region_ports(&self, region_name: &str) -> OfcManagerResult<Vec<RegionPort>> {
        let switches = self
            .call("showDatapathId", self.driver.show_switch_datapath_ids())
            .await?;
        let mut bound = Vec::new();
        for switch in switches {
            let ports = self
                .call("showPorts", self.driver.show_ports(&switch.dpid))
                .await?;
            bound.extend(
                ports
                    .into_iter()
                    .filter(|p| p.is_server_port_of(region_name))
                    .map(|port| RegionPort {
                        dpid: switch.dpid.clone(),
                        port,
                    }),
            );
        }
        Ok(bound)
    }

    async fn ensure_region_locked(
        &self,
        region_name: &str,
        vlan_id: Option<VlanId>,
    ) -> OfcManagerResult<bool> {
        if self.has_region(region_name).await? {
            return Ok(false);
        }
        self.create_region(region_name, vlan_id).await?;
        Ok(true)
    }

    /// Creates the region unless it already exists.
    ///
    /// Returns true if this call created it.
    pub async fn ensure_region(
        &self,
        region_name: &str,
        vlan_id: Option<VlanId>,
    ) -> OfcManagerResult<bool> {
        let result = {
            let _guard = self.locks.lock(region_name).await;
            self.ensure_region_locked(region_name, vlan_id).await
        };
        if result.is_err() {
            self.locks.prune();
        }
        result
    }

    /// Instance boot: ensure the region, then bind the port, under the
    /// region's lock.
    #[instrument(skip(self))]
    pub async fn run_instance(
        &self,
        region_name: &str,
        vlan_id: Option<VlanId>,
        port: PortNumber,
        dpid: &Dpid,
    ) -> OfcManagerResult<()> {
        let result = {
            let _guard = self.locks.lock(region_name).await;
            match self.ensure_region_locked(region_name, vlan_id).await {
                Ok(_) => self.attach_server_port(region_name, port, dpid).await,
                Err(e) => Err(e),
            }
        };
        if result.is_err() {
            self.locks.prune();
        }
        result
    }

    /// Instance teardown: unbind the port and drop the region if unused,
    /// under the region's lock.
    #[instrument(skip(self))]
    pub async fn terminate_instance(
        &self,
        region_name: &str,
        vlan_id: Option<VlanId>,
        port: PortNumber,
        dpid: &Dpid,
    ) -> OfcManagerResult<DetachOutcome> {
        let outcome = {
            let _guard = self.locks.lock(region_name).await;
            self.detach_server_port(region_name, port, dpid, vlan_id)
                .await
        };
        if !matches!(outcome, Ok(DetachOutcome::RegionInUse)) {
            self.locks.prune();
        }
        outcome
    }

    /// Destroys an existing region, failing with `RegionNotFound` otherwise.
    #[instrument(skip(self))]
    pub async fn destroy_existing_region(
        &self,
        region_name: &str,
        vlan_id: Option<VlanId>,
    ) -> OfcManagerResult<()> {
        let result = {
            let _guard = self.locks.lock(region_name).await;
            match self.has_region(region_name).await {
                Ok(true) => self.remove_region(region_name, vlan_id).await,
                Ok(false) => Err(OfcManagerError::RegionNotFound {
                    region: region_name.to_string(),
                }),
                Err(e) => Err(e),
            }
        };
        self.locks.prune();
        result
    }

    /// Number of regions with a live lock entry.
    pub fn tracked_regions(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outer_port::OuterPort;
    use dodai_ofc_driver::NullDriver;

    fn manager() -> OfcManager {
        OfcManager::new(Arc::new(NullDriver::new()), Arc::new(Vec::<OuterPort>::new()))
    }

    #[test]
    fn test_default_config() {
        let config = OfcManagerConfig::default();
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
        let config = config.with_call_timeout(Duration::from_secs(2));
        assert_eq!(config.call_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_null_driver_lifecycle() {
        let mgr = manager();
        let dpid = Dpid::new("00:01").unwrap();

        assert!(!mgr.has_region("abc").await.unwrap());
        assert!(mgr.ensure_region("abc", None).await.unwrap());
        mgr.attach_server_port("abc", 1, &dpid).await.unwrap();

        let outcome = mgr.terminate_instance("abc", None, 1, &dpid).await.unwrap();
        assert_eq!(outcome, DetachOutcome::RegionRemoved);

        let stats = mgr.stats();
        assert_eq!(stats.regions_created, 1);
        assert_eq!(stats.regions_destroyed, 1);
        assert_eq!(mgr.tracked_regions(), 0);
        assert_eq!(mgr.driver_name(), "dummy");
    }

    #[tokio::test]
    async fn test_destroy_existing_region_not_found() {
        let mgr = manager();
        let err = mgr.destroy_existing_region("abc", None).await.unwrap_err();
        assert!(matches!(err, OfcManagerError::RegionNotFound { ref region } if region == "abc"));
    }
}
