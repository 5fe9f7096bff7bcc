//! Keystone v2 / Nova client backing both compute collaborators.
//!
//! Each call authenticates afresh, scoped to the request's tenant, then talks
//! to the compute endpoint from the service catalog. Physical interfaces are
//! found through the bare-metal extension: instance → hypervisor node →
//! node interface with the port's MAC.

use async_trait::async_trait;
use dodai_ofc_driver::{Dpid, PortNumber};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::compute::{
    ComputeError, ComputeInventory, ComputeResult, InstanceMetadata, Metadata, PhysicalInterface,
};
use crate::config::NovaConfig;
use crate::error::{PluginError, PluginResult};

/// Service catalog type of the compute endpoint.
const COMPUTE_SERVICE_TYPE: &str = "compute";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: Token,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct Token {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Debug, Deserialize)]
struct ServerResponse {
    server: Server,
}

#[derive(Debug, Deserialize)]
struct Server {
    #[serde(rename = "OS-EXT-SRV-ATTR:hypervisor_hostname", default)]
    hypervisor_hostname: Option<String>,
    #[serde(default)]
    metadata: Metadata,
}

#[derive(Debug, Deserialize)]
struct NodesResponse {
    #[serde(default)]
    nodes: Vec<BaremetalNode>,
}

#[derive(Debug, Deserialize)]
struct BaremetalNode {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    interfaces: Vec<BaremetalInterface>,
}

#[derive(Debug, Deserialize)]
struct BaremetalInterface {
    address: String,
    #[serde(default)]
    datapath_id: Option<String>,
    #[serde(default)]
    port_no: Option<PortNumber>,
}

/// Authenticated view of the compute endpoint.
struct Session {
    token: String,
    compute_url: Url,
}

impl Session {
    /// Compute endpoint URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> ComputeResult<Url> {
        let mut url = self.compute_url.clone();
        url.path_segments_mut()
            .map_err(|_| ComputeError::Auth {
                message: format!("compute endpoint {} cannot carry a path", self.compute_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

pub struct NovaClient {
    http: reqwest::Client,
    config: NovaConfig,
}

impl NovaClient {
    pub fn new(config: &NovaConfig) -> PluginResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PluginError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    async fn authenticate(&self, tenant_id: &str) -> ComputeResult<Session> {
        let mut auth = json!({
            "passwordCredentials": {
                "username": self.config.username,
                "password": self.config.password,
            }
        });
        if tenant_id.is_empty() {
            auth["tenantName"] = json!(self.config.tenant_name);
        } else {
            auth["tenantId"] = json!(tenant_id);
        }

        let url = format!("{}/tokens", self.config.auth_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&json!({ "auth": auth }))
            .send()
            .await
            .map_err(|e| ComputeError::Auth {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ComputeError::Auth {
                message: format!("HTTP status {}", response.status()),
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| ComputeError::Auth {
            message: format!("malformed token response: {}", e),
        })?;

        let compute_url = body
            .access
            .service_catalog
            .iter()
            .filter(|entry| entry.service_type == COMPUTE_SERVICE_TYPE)
            .flat_map(|entry| entry.endpoints.iter())
            .map(|endpoint| endpoint.public_url.as_str())
            .next()
            .ok_or_else(|| ComputeError::Auth {
                message: "no compute endpoint in service catalog".to_string(),
            })?;
        let compute_url = Url::parse(compute_url).map_err(|e| ComputeError::Auth {
            message: format!("invalid compute endpoint '{}': {}", compute_url, e),
        })?;

        debug!(tenant_id, compute_url = %compute_url, "authenticated against identity service");
        Ok(Session {
            token: body.access.token.id,
            compute_url,
        })
    }

    /// Sends one compute request. `Ok(None)` means 404.
    async fn send(
        &self,
        session: &Session,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> ComputeResult<Option<reqwest::Response>> {
        let url = session.endpoint(segments)?;
        let operation = format!("{} {}", method, url.path());
        let mut request = self
            .http
            .request(method, url)
            .header("X-Auth-Token", &session.token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ComputeError::request(&operation, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => Err(ComputeError::request(
                &operation,
                format!("HTTP status {}", status),
            )),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        session: &Session,
        segments: &[&str],
    ) -> ComputeResult<Option<T>> {
        match self.send(session, Method::GET, segments, None).await? {
            Some(response) => response.json().await.map(Some).map_err(|e| {
                ComputeError::request(format!("GET /{}", segments.join("/")), e.to_string())
            }),
            None => Ok(None),
        }
    }

    async fn server(&self, session: &Session, instance_id: &str) -> ComputeResult<Option<Server>> {
        Ok(self
            .get_json::<ServerResponse>(session, &["servers", instance_id])
            .await?
            .map(|r| r.server))
    }
}

#[async_trait]
impl ComputeInventory for NovaClient {
    #[instrument(skip(self))]
    async fn resolve_physical_interface(
        &self,
        tenant_id: &str,
        device_id: &str,
        mac_address: &str,
    ) -> ComputeResult<PhysicalInterface> {
        let not_found =
            |reason: String| ComputeError::interface_not_found(device_id, mac_address, reason);

        let session = self.authenticate(tenant_id).await?;
        let server = self
            .server(&session, device_id)
            .await?
            .ok_or_else(|| not_found("instance does not exist".to_string()))?;
        let node_uuid = server
            .hypervisor_hostname
            .ok_or_else(|| not_found("instance is not placed on a node".to_string()))?;

        let nodes = self
            .get_json::<NodesResponse>(&session, &["os-baremetal-nodes"])
            .await?
            .map(|r| r.nodes)
            .unwrap_or_default();
        let node = nodes
            .into_iter()
            .find(|node| node.uuid.as_deref() == Some(node_uuid.as_str()))
            .ok_or_else(|| not_found(format!("bare-metal node {} does not exist", node_uuid)))?;

        let interface = node
            .interfaces
            .into_iter()
            .find(|nic| nic.address.eq_ignore_ascii_case(mac_address))
            .ok_or_else(|| not_found(format!("node {} has no such NIC", node_uuid)))?;

        let dpid = interface
            .datapath_id
            .and_then(Dpid::new)
            .ok_or_else(|| not_found("NIC has no datapath id".to_string()))?;
        let port_no = interface
            .port_no
            .ok_or_else(|| not_found("NIC has no switch port".to_string()))?;

        debug!(dpid = %dpid, port_no, "resolved physical interface");
        Ok(PhysicalInterface {
            dpid,
            port_no,
            mac_address: interface.address,
        })
    }
}

#[async_trait]
impl InstanceMetadata for NovaClient {
    #[instrument(skip(self))]
    async fn get_metadata(&self, tenant_id: &str, instance_id: &str) -> ComputeResult<Metadata> {
        let session = self.authenticate(tenant_id).await?;
        self.server(&session, instance_id)
            .await?
            .map(|server| server.metadata)
            .ok_or_else(|| ComputeError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    #[instrument(skip(self, value))]
    async fn set_metadata(
        &self,
        tenant_id: &str,
        instance_id: &str,
        key: &str,
        value: &str,
    ) -> ComputeResult<()> {
        let session = self.authenticate(tenant_id).await?;
        let body = json!({ "meta": { key: value } });
        self.send(
            &session,
            Method::PUT,
            &["servers", instance_id, "metadata", key],
            Some(body),
        )
            .await?
            .ok_or_else(|| ComputeError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_metadata_key(
        &self,
        tenant_id: &str,
        instance_id: &str,
        key: &str,
    ) -> ComputeResult<()> {
        let session = self.authenticate(tenant_id).await?;
        self.send(
            &session,
            Method::DELETE,
            &["servers", instance_id, "metadata", key],
            None,
        )
            .await?
            .ok_or_else(|| ComputeError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })?;
        Ok(())
    }
}
