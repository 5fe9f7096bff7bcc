//! Driver for the L2E-VNC 2.0 controller SOAP endpoint.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::driver::{DriverSettings, OfcDriver};
use crate::error::{OfcError, OfcResult};
use crate::soap;
use crate::types::{DatapathInfo, Dpid, PortInfo, PortNumber, PortType, RegionInfo, VlanId};

/// Remote operation names exposed by the controller.
pub mod ops {
    pub const CREATE_REGION: &str = "createRegion";
    pub const DESTROY_REGION: &str = "destroyRegion";
    pub const SHOW_REGION: &str = "showRegion";
    pub const SET_SERVER_PORT: &str = "setServerPort";
    pub const CLEAR_SERVER_PORT: &str = "clearServerPort";
    pub const SHOW_DATAPATH_ID: &str = "showDatapathId";
    pub const SHOW_PORTS: &str = "showPorts";
    pub const SET_OUTER_PORT_ASSOC: &str = "setOuterPortAssociationSetting";
    pub const CLEAR_OUTER_PORT_ASSOC: &str = "clearOuterPortAssociationSetting";
    pub const SAVE: &str = "save";
}

/// SOAP client for one controller endpoint.
pub struct L2eVncDriver {
    client: reqwest::Client,
    service_url: String,
    namespace: String,
    timeout: Duration,
}

impl L2eVncDriver {
    /// Creates a driver for the endpoint in `settings`.
    pub fn new(settings: &DriverSettings) -> OfcResult<Self> {
        let service_url = settings
            .service_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| OfcError::config("l2e-vnc driver requires service_url"))?;

        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| OfcError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service_url: service_url.to_string(),
            namespace: settings.service_namespace.clone(),
            timeout: settings.request_timeout,
        })
    }

    /// Returns the endpoint this driver posts to.
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    /// Posts one SOAP request and returns the response body.
    async fn invoke(&self, operation: &str, args: Vec<String>) -> OfcResult<String> {
        debug!(operation, ?args, "invoking OFC operation");

        let envelope = soap::build_envelope(&self.namespace, operation, &args);
        let response = self
            .client
            .post(&self.service_url)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "\"\"")
            .body(envelope)
            .send()
            .await
            .map_err(|e| self.map_transport(operation, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport(operation, e))?;

        if let Some(fault) = soap::parse_fault(&body) {
            return Err(OfcError::fault(operation, fault));
        }
        if !status.is_success() {
            return Err(OfcError::fault(operation, format!("HTTP status {}", status)));
        }

        debug!(operation, response = %body, "OFC operation completed");
        Ok(body)
    }

    fn map_transport(&self, operation: &str, err: reqwest::Error) -> OfcError {
        if err.is_timeout() {
            OfcError::timeout(operation, self.timeout)
        } else {
            OfcError::transport(operation, err.to_string())
        }
    }

    fn required_field<'a>(
        operation: &str,
        item: &'a HashMap<String, String>,
        field: &str,
    ) -> OfcResult<&'a str> {
        item.get(field)
            .map(String::as_str)
            .ok_or_else(|| OfcError::invalid_response(operation, format!("missing {}", field)))
    }

    fn parse_port(operation: &str, item: &HashMap<String, String>) -> OfcResult<PortInfo> {
        let port_type = PortType::from(Self::required_field(operation, item, "type")?);
        let region_name = item
            .get("regionName")
            .filter(|name| !name.is_empty())
            .cloned();
        let port_number = match item
            .get("portNumber")
            .or_else(|| item.get("portNo"))
            .filter(|raw| !raw.is_empty())
        {
            Some(raw) => Some(raw.parse::<PortNumber>().map_err(|e| {
                OfcError::invalid_response(operation, format!("bad port number '{}': {}", raw, e))
            })?),
            None => None,
        };

        Ok(PortInfo {
            port_type,
            region_name,
            port_number,
        })
    }
}

#[async_trait]
impl OfcDriver for L2eVncDriver {
    fn name(&self) -> &str {
        "l2e-vnc"
    }

    #[instrument(skip(self))]
    async fn create_region(&self, region_name: &str) -> OfcResult<()> {
        self.invoke(ops::CREATE_REGION, vec![region_name.to_string()])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn destroy_region(&self, region_name: &str) -> OfcResult<()> {
        self.invoke(ops::DESTROY_REGION, vec![region_name.to_string()])
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn show_region(&self) -> OfcResult<Vec<RegionInfo>> {
        let body = self.invoke(ops::SHOW_REGION, Vec::new()).await?;
        soap::parse_return_items(&body)
            .iter()
            .map(|item| {
                Self::required_field(ops::SHOW_REGION, item, "regionName").map(RegionInfo::new)
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn set_server_port(
        &self,
        dpid: &Dpid,
        port: PortNumber,
        region_name: &str,
    ) -> OfcResult<()> {
        self.invoke(
            ops::SET_SERVER_PORT,
            vec![dpid.to_string(), port.to_string(), region_name.to_string()],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_server_port(&self, dpid: &Dpid, port: PortNumber) -> OfcResult<()> {
        self.invoke(
            ops::CLEAR_SERVER_PORT,
            vec![dpid.to_string(), port.to_string()],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn show_switch_datapath_ids(&self) -> OfcResult<Vec<DatapathInfo>> {
        let body = self.invoke(ops::SHOW_DATAPATH_ID, Vec::new()).await?;
        soap::parse_return_items(&body)
            .iter()
            .map(|item| {
                let raw = Self::required_field(ops::SHOW_DATAPATH_ID, item, "dpid")?;
                Dpid::new(raw)
                    .map(|dpid| DatapathInfo { dpid })
                    .ok_or_else(|| OfcError::invalid_response(ops::SHOW_DATAPATH_ID, "empty dpid"))
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn show_ports(&self, dpid: &Dpid) -> OfcResult<Vec<PortInfo>> {
        let body = self
            .invoke(ops::SHOW_PORTS, vec![dpid.to_string()])
            .await?;
        soap::parse_return_items(&body)
            .iter()
            .map(|item| Self::parse_port(ops::SHOW_PORTS, item))
            .collect()
    }

    #[instrument(skip(self))]
    async fn set_outer_port_association(
        &self,
        dpid: &Dpid,
        outer_port: PortNumber,
        outer_vlan: VlanId,
        inner_vlan: u16,
        region_name: &str,
    ) -> OfcResult<()> {
        self.invoke(
            ops::SET_OUTER_PORT_ASSOC,
            vec![
                dpid.to_string(),
                outer_port.to_string(),
                outer_vlan.to_string(),
                inner_vlan.to_string(),
                region_name.to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_outer_port_association(
        &self,
        dpid: &Dpid,
        outer_port: PortNumber,
        outer_vlan: VlanId,
    ) -> OfcResult<()> {
        self.invoke(
            ops::CLEAR_OUTER_PORT_ASSOC,
            vec![
                dpid.to_string(),
                outer_port.to_string(),
                outer_vlan.to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn save(&self) -> OfcResult<()> {
        self.invoke(ops::SAVE, Vec::new()).await?;
        Ok(())
    }
}
