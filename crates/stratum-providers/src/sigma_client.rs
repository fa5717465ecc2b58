// crates/stratum-providers/src/sigma_client.rs
// ============================================================================
// Module: Sigma HTTP Client
// Description: Blocking JSON client for the CloudSigma-style compute API.
// Purpose: Implement BackendClient over bounded, authenticated HTTP calls.
// Dependencies: stratum-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! [`SigmaClient`] speaks a small JSON API rooted at a regional endpoint:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | images | `GET libdrives/` |
//! | list | `GET servers/?environment=<name>` |
//! | start | `POST servers/` |
//! | stop | `POST servers/<uuid>/action/?do=stop` |
//! | agent | `PUT servers/<uuid>/agent/` |
//!
//! Requests use basic auth, never follow redirects, and read at most
//! `max_response_bytes` of any body. `429`, `503`, and `507` map to
//! [`BackendError::Capacity`] so bootstrap can classify them as retriable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use stratum_core::BackendClient;
use stratum_core::BackendError;
use stratum_core::CloudSpec;
use stratum_core::EnvironmentName;
use stratum_core::ImageSpec;
use stratum_core::InstanceId;
use stratum_core::InstanceInfo;
use stratum_core::InstanceStatus;
use stratum_core::MachineConfig;
use stratum_core::StartInstanceParams;
use tracing::debug;
use url::Url;

use crate::sigma::resolve_endpoint;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Server metadata key naming the owning environment.
const META_ENVIRONMENT: &str = "stratum-environment";
/// Server metadata key marking the control node.
const META_CONTROL_NODE: &str = "stratum-control-node";

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for [`SigmaClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigmaClientConfig {
    /// Region the client is bound to.
    pub region: String,
    /// API endpoint override. `None` uses the region's public endpoint.
    pub endpoint: Option<Url>,
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl SigmaClientConfig {
    /// Returns a config for the region's public endpoint with default limits.
    #[must_use]
    pub fn new(
        region: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            endpoint: None,
            username: username.into(),
            password: password.into(),
            timeout_ms: 30_000,
            max_response_bytes: 4 * 1024 * 1024,
            user_agent: format!("stratum/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Paged list envelope.
#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    /// Returned objects.
    objects: Vec<T>,
}

/// Library drive (installable image).
#[derive(Debug, Deserialize)]
struct DriveObject {
    /// Operating system series.
    series: String,
    /// CPU architecture.
    arch: String,
}

/// Server as reported by the API.
#[derive(Debug, Deserialize)]
struct ServerObject {
    /// Server identifier.
    uuid: String,
    /// Lifecycle status string.
    status: String,
    /// Free-form metadata.
    #[serde(default)]
    meta: BTreeMap<String, String>,
    /// Public and private addresses.
    #[serde(default)]
    ips: Vec<String>,
}

impl ServerObject {
    /// Converts the wire object into an instance descriptor.
    fn into_instance(self, environment: &EnvironmentName) -> InstanceInfo {
        let status = match self.status.as_str() {
            "running" => InstanceStatus::Running,
            "starting" | "pending" => InstanceStatus::Pending,
            "stopped" => InstanceStatus::Stopped,
            _ => InstanceStatus::Unknown,
        };
        InstanceInfo {
            id: InstanceId::new(self.uuid),
            environment: environment.clone(),
            status,
            control_node: self.meta.get(META_CONTROL_NODE).is_some_and(|flag| flag == "true"),
            addresses: self.ips,
        }
    }
}

/// Server creation request.
#[derive(Debug, Serialize)]
struct CreateServer<'a> {
    /// Server name.
    name: String,
    /// Image series.
    series: &'a str,
    /// Image architecture.
    arch: &'a str,
    /// Minimum CPU cores.
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu: Option<u64>,
    /// Minimum memory in megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    mem_mb: Option<u64>,
    /// Minimum root disk in megabytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    disk_mb: Option<u64>,
    /// Placement directive.
    #[serde(skip_serializing_if = "Option::is_none")]
    placement: Option<&'a str>,
    /// Server metadata.
    meta: BTreeMap<&'static str, String>,
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking HTTP client for the sigma compute API.
pub struct SigmaClient {
    /// Client configuration.
    config: SigmaClientConfig,
    /// Resolved API base URL, always ending in `/`.
    base: Url,
    /// HTTP client used for outbound requests.
    http: Client,
}

impl SigmaClient {
    /// Creates a client bound to the configured region.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::UnknownRegion`] for unknown regions and
    /// [`BackendError::Client`] when the HTTP client cannot be built.
    pub fn new(config: SigmaClientConfig) -> Result<Self, BackendError> {
        let base = match &config.endpoint {
            Some(endpoint) => ensure_trailing_slash(endpoint.clone()),
            None => Url::parse(&resolve_endpoint(&config.region)?)
                .map_err(|err| BackendError::Client(err.to_string()))?,
        };
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|_| BackendError::Client("http client build failed".to_string()))?;
        Ok(Self {
            config,
            base,
            http,
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    /// Sends a request and returns the response with any status.
    fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, BackendError> {
        let url = self.base.join(path).map_err(|err| BackendError::Invalid(err.to_string()))?;
        debug!(%method, %url, "sigma api request");
        let mut request = self
            .http
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password));
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        request.send().map_err(|err| BackendError::Api(err.to_string()))
    }

    /// Sends a request and returns the response on success status.
    fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, BackendError> {
        let response = self.request(method.clone(), path, body)?;
        check_status(&method, path, response)
    }

    /// Sends a request and decodes a bounded JSON response.
    fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T, BackendError> {
        let mut response = self.send(method, path, body)?;
        let bytes = read_response_limited(&mut response, self.config.max_response_bytes)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| BackendError::Api(format!("{path}: invalid response: {err}")))
    }

    /// Lists servers tagged for an environment.
    fn servers(&self, environment: &EnvironmentName) -> Result<Vec<ServerObject>, BackendError> {
        let mut path = String::from("servers/?environment=");
        path.extend(url::form_urlencoded::byte_serialize(environment.as_str().as_bytes()));
        let list: ObjectList<ServerObject> = self.call(Method::GET, &path, None)?;
        Ok(list
            .objects
            .into_iter()
            .filter(|server| {
                server.meta.get(META_ENVIRONMENT).is_some_and(|name| name == environment.as_str())
            })
            .collect())
    }
}

impl BackendClient for SigmaClient {
    fn resolve_region(&self, region: &str) -> Result<CloudSpec, BackendError> {
        let endpoint = resolve_endpoint(region)?;
        let endpoint = if region == self.config.region && self.config.endpoint.is_some() {
            self.base.to_string()
        } else {
            endpoint
        };
        Ok(CloudSpec {
            region: region.to_string(),
            endpoint,
        })
    }

    fn control_node_address(
        &self,
        environment: &EnvironmentName,
    ) -> Result<Option<String>, BackendError> {
        Ok(self
            .all_instances(environment)?
            .into_iter()
            .filter(|instance| instance.control_node && instance.status != InstanceStatus::Stopped)
            .find_map(|instance| instance.addresses.into_iter().next()))
    }

    fn provisionable_images(&self) -> Result<Vec<ImageSpec>, BackendError> {
        let list: ObjectList<DriveObject> = self.call(Method::GET, "libdrives/", None)?;
        Ok(list.objects.into_iter().map(|drive| ImageSpec::new(drive.series, drive.arch)).collect())
    }

    fn start_instance(&self, params: &StartInstanceParams) -> Result<InstanceInfo, BackendError> {
        let mut meta = BTreeMap::new();
        meta.insert(META_ENVIRONMENT, params.environment.to_string());
        meta.insert(META_CONTROL_NODE, params.control_node.to_string());
        let request = CreateServer {
            name: format!("stratum-{}-{}", params.environment, uuid::Uuid::new_v4().simple()),
            series: &params.image.series,
            arch: &params.image.arch,
            cpu: params.constraints.cpu_cores,
            mem_mb: params.constraints.mem_mb,
            disk_mb: params.constraints.root_disk_mb,
            placement: params.placement.as_deref(),
            meta,
        };
        let body =
            serde_json::to_vec(&request).map_err(|err| BackendError::Invalid(err.to_string()))?;
        let server: ServerObject = self.call(Method::POST, "servers/", Some(body))?;
        Ok(server.into_instance(&params.environment))
    }

    fn all_instances(
        &self,
        environment: &EnvironmentName,
    ) -> Result<Vec<InstanceInfo>, BackendError> {
        Ok(self
            .servers(environment)?
            .into_iter()
            .map(|server| server.into_instance(environment))
            .collect())
    }

    fn stop_instances(&self, ids: &[InstanceId]) -> Result<(), BackendError> {
        for id in ids {
            let path = format!("servers/{id}/action/?do=stop");
            let response = self.request(Method::POST, &path, None)?;
            if response.status() == StatusCode::NOT_FOUND {
                debug!(instance = %id, "stop ignored for unknown server");
                continue;
            }
            check_status(&Method::POST, &path, response)?;
        }
        Ok(())
    }

    fn install_agent(&self, config: &MachineConfig) -> Result<(), BackendError> {
        let body =
            serde_json::to_vec(config).map_err(|err| BackendError::Invalid(err.to_string()))?;
        let path = format!("servers/{}/agent/", config.instance_id);
        self.send(Method::PUT, &path, Some(body))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures relative joins land under the endpoint path.
fn ensure_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Maps non-success statuses onto backend errors.
fn check_status(method: &Method, path: &str, response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = format!("{method} {path}: status {}", status.as_u16());
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::INSUFFICIENT_STORAGE => BackendError::Capacity(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            BackendError::Invalid(message)
        }
        _ => BackendError::Api(message),
    })
}

/// Reads a response body while enforcing a hard size limit.
fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, BackendError> {
    let max_bytes_u64 = u64::try_from(max_bytes)
        .map_err(|_| BackendError::Client("response size limit exceeds u64".to_string()))?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(BackendError::Api("response exceeds size limit".to_string()));
    }
    let mut buf = Vec::new();
    response
        .take(max_bytes_u64.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|_| BackendError::Api("failed to read response".to_string()))?;
    if buf.len() > max_bytes {
        return Err(BackendError::Api("response exceeds size limit".to_string()));
    }
    Ok(buf)
}
