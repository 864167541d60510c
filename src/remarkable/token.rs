//! Credential lifecycle for the reMarkable cloud.
//!
//! A device is registered once with a one-time code and receives a bearer
//! token. Every later run rotates that token through the refresh endpoint; the
//! old token stops working as soon as the refresh succeeds, so the new one has
//! to be persisted before anything else happens. The storage API host moves
//! around and is looked up once per process through service discovery.

use super::transport::{CloudRequest, CloudTransport};
use super::types::*;

use reqwest::Method;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Fixed endpoints and discovery parameters of the cloud.
#[derive(Debug, Clone)]
pub struct CloudEndpoints {
	pub register_url: String,
	pub refresh_url: String,
	pub discovery_url: String,
	pub environment: String,
	pub group: String,
	pub api_version: u32,
}

impl Default for CloudEndpoints {
	fn default() -> Self {
		Self {
			register_url: "https://my.remarkable.com/token/json/2/device/new".to_string(),
			refresh_url: "https://my.remarkable.com/token/json/2/user/new".to_string(),
			discovery_url: "https://service-manager-production-dot-remarkable-production.appspot.com/service/json/1/document-storage".to_string(),
			environment: "production".to_string(),
			group: "auth0|5a68dc51cb30df3877a1d7c4".to_string(),
			api_version: 2,
		}
	}
}

/// Credential and storage host for one run.
///
/// Established before the traversal starts and never mutated afterwards; a
/// refresh or re-discovery produces a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenState {
	bearer_token: String,
	storage_host: String,
}

impl TokenState {
	pub fn new(bearer_token: String, storage_host: String) -> Self {
		Self {
			bearer_token,
			storage_host,
		}
	}

	pub fn bearer_token(&self) -> &str {
		&self.bearer_token
	}

	pub fn storage_host(&self) -> &str {
		&self.storage_host
	}

	/// Absolute URL of a storage API endpoint on the current host.
	pub fn storage_url(&self, endpoint: &str) -> String {
		format!("https://{}/{}", self.storage_host, endpoint)
	}
}

impl fmt::Debug for TokenState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TokenState")
			.field("bearer_token", &"<redacted>")
			.field("storage_host", &self.storage_host)
			.finish()
	}
}

/// Acquires and rotates bearer tokens and locates the storage host.
pub struct TokenLifecycle {
	transport: Arc<dyn CloudTransport>,
	endpoints: CloudEndpoints,
	/// Storage host found by discovery, kept for the life of the process.
	storage_host: RwLock<Option<String>>,
}

impl TokenLifecycle {
	pub fn new(transport: Arc<dyn CloudTransport>, endpoints: CloudEndpoints) -> Self {
		Self {
			transport,
			endpoints,
			storage_host: RwLock::new(None),
		}
	}

	/// Exchange a one-time code for a long-lived bearer token.
	///
	/// # Arguments
	/// * `code` - One-time code from the account's device connection page.
	/// * `device_descriptor` - The kind of device being registered.
	/// * `device_id` - A freshly generated device UUID.
	///
	/// # Errors
	/// `RegistrationRejected` if the code is invalid or expired.
	pub async fn register_device(
		&self,
		code: &str,
		device_descriptor: DeviceDescriptor,
		device_id: &str,
	) -> Result<String, RemarkableError> {
		let body = RegistrationRequest {
			code,
			device_desc: device_descriptor,
			device_id,
		};

		// Registration is unauthenticated but the endpoint still expects the header.
		let mut request = CloudRequest::new(Method::POST, &self.endpoints.register_url).json(&body)?;
		request.authorization = Some("Bearer".to_string());

		let response = self.transport.execute(request).await?;
		if !response.is_success() {
			return Err(RemarkableError::RegistrationRejected(format!(
				"status {}: {}",
				response.status,
				response.text().trim()
			)));
		}

		let token = response.text().trim().to_string();
		if token.is_empty() {
			return Err(RemarkableError::RegistrationRejected(
				"empty token in response".to_string(),
			));
		}

		info!("Registered new {:?} device", device_descriptor);
		Ok(token)
	}

	/// Rotate `old_token` for a new one. `old_token` is invalid once this returns `Ok`.
	pub async fn refresh_token(&self, old_token: &str) -> Result<String, RemarkableError> {
		let request = CloudRequest::new(Method::POST, &self.endpoints.refresh_url).bearer(old_token);

		let response = self.transport.execute(request).await?;
		if !response.is_success() {
			return Err(RemarkableError::RefreshRejected(format!(
				"status {}: {}",
				response.status,
				response.text().trim()
			)));
		}

		let token = response.text().trim().to_string();
		if token.is_empty() {
			return Err(RemarkableError::RefreshRejected(
				"empty token in response".to_string(),
			));
		}

		debug!("Bearer token rotated");
		Ok(token)
	}

	/// Storage host for this process, discovered on first use.
	pub async fn resolve_storage_host(&self, token: &str) -> Result<String, RemarkableError> {
		if let Some(host) = self.cached_host() {
			return Ok(host);
		}
		self.rediscover_storage_host(token).await
	}

	/// Run discovery again, replacing the cached host.
	///
	/// Call this when requests start failing because the host moved.
	pub async fn rediscover_storage_host(&self, token: &str) -> Result<String, RemarkableError> {
		let host = self.discover(token).await?;
		if let Ok(mut cached) = self.storage_host.write() {
			*cached = Some(host.clone());
		}
		Ok(host)
	}

	fn cached_host(&self) -> Option<String> {
		self.storage_host.read().ok().and_then(|host| host.clone())
	}

	async fn discover(&self, token: &str) -> Result<String, RemarkableError> {
		let url = reqwest::Url::parse_with_params(
			&self.endpoints.discovery_url,
			&[
				("environment", self.endpoints.environment.clone()),
				("group", self.endpoints.group.clone()),
				("apiVer", self.endpoints.api_version.to_string()),
			],
		)?;

		let response = self
			.transport
			.execute(CloudRequest::new(Method::GET, url.as_str()).bearer(token))
			.await?;

		if response.status == 401 || response.status == 403 {
			return Err(RemarkableError::Unauthorized(self.endpoints.discovery_url.clone()));
		}
		if !response.is_success() {
			return Err(RemarkableError::DiscoveryFailed(format!(
				"status {}",
				response.status
			)));
		}

		let discovery: DiscoveryResponse = response.json()?;
		if discovery.host.trim().is_empty() {
			return Err(RemarkableError::DiscoveryFailed(format!(
				"no host returned (status {:?})",
				discovery.status
			)));
		}

		info!("Storage API host is {}", discovery.host);
		Ok(discovery.host)
	}
}
