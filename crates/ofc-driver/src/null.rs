//! Driver for deployments without a controller.

use async_trait::async_trait;
use tracing::debug;

use crate::driver::OfcDriver;
use crate::error::OfcResult;
use crate::types::{DatapathInfo, Dpid, PortInfo, PortNumber, RegionInfo, VlanId};

/// Accepts every call and reports an empty topology.
#[derive(Debug, Default, Clone)]
pub struct NullDriver;

impl NullDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OfcDriver for NullDriver {
    fn name(&self) -> &str {
        "dummy"
    }

    async fn create_region(&self, region_name: &str) -> OfcResult<()> {
        debug!(region_name, "dummy createRegion");
        Ok(())
    }

    async fn destroy_region(&self, region_name: &str) -> OfcResult<()> {
        debug!(region_name, "dummy destroyRegion");
        Ok(())
    }

    async fn show_region(&self) -> OfcResult<Vec<RegionInfo>> {
        Ok(Vec::new())
    }

    async fn set_server_port(
        &self,
        dpid: &Dpid,
        port: PortNumber,
        region_name: &str,
    ) -> OfcResult<()> {
        debug!(%dpid, port, region_name, "dummy setServerPort");
        Ok(())
    }

    async fn clear_server_port(&self, dpid: &Dpid, port: PortNumber) -> OfcResult<()> {
        debug!(%dpid, port, "dummy clearServerPort");
        Ok(())
    }

    async fn show_switch_datapath_ids(&self) -> OfcResult<Vec<DatapathInfo>> {
        Ok(Vec::new())
    }

    async fn show_ports(&self, _dpid: &Dpid) -> OfcResult<Vec<PortInfo>> {
        Ok(Vec::new())
    }

    async fn set_outer_port_association(
        &self,
        dpid: &Dpid,
        outer_port: PortNumber,
        outer_vlan: VlanId,
        inner_vlan: u16,
        region_name: &str,
    ) -> OfcResult<()> {
        debug!(
            %dpid,
            outer_port,
            %outer_vlan,
            inner_vlan,
            region_name,
            "dummy setOuterPortAssociationSetting"
        );
        Ok(())
    }

    async fn clear_outer_port_association(
        &self,
        dpid: &Dpid,
        outer_port: PortNumber,
        outer_vlan: VlanId,
    ) -> OfcResult<()> {
        debug!(%dpid, outer_port, %outer_vlan, "dummy clearOuterPortAssociationSetting");
        Ok(())
    }

    async fn save(&self) -> OfcResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::INNER_VLAN_UNTAGGED;

    #[tokio::test]
    async fn test_null_driver_accepts_everything() {
        let driver = NullDriver::new();
        let dpid = Dpid::new("00:00:00:00:00:00:00:01").unwrap();
        let vlan = VlanId::new(100).unwrap();

        driver.create_region("abc").await.unwrap();
        driver.set_server_port(&dpid, 1, "abc").await.unwrap();
        driver
            .set_outer_port_association(&dpid, 48, vlan, INNER_VLAN_UNTAGGED, "abc")
            .await
            .unwrap();
        driver.clear_outer_port_association(&dpid, 48, vlan).await.unwrap();
        driver.clear_server_port(&dpid, 1).await.unwrap();
        driver.destroy_region("abc").await.unwrap();
        driver.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_null_driver_listings_are_empty() {
        let driver = NullDriver::new();
        let dpid = Dpid::new("00:01").unwrap();

        // Even right after a create, the dummy has no memory of it.
        driver.create_region("abc").await.unwrap();
        assert!(driver.show_region().await.unwrap().is_empty());
        assert!(driver.show_switch_datapath_ids().await.unwrap().is_empty());
        assert!(driver.show_ports(&dpid).await.unwrap().is_empty());
    }
}
