//! HTTP seam between the cloud protocol code and the network.
//!
//! Token and upload operations build [`CloudRequest`] values and hand them to a
//! [`CloudTransport`]. Production uses [`ReqwestTransport`].

use super::types::RemarkableError;

use reqwest::{Client, Method};
use std::time::Duration;
use tracing::debug;

/// A fully described outgoing request.
#[derive(Debug, Clone)]
pub struct CloudRequest {
	pub method: Method,
	pub url: String,
	/// Complete `Authorization` header value, if any.
	pub authorization: Option<String>,
	/// `Content-Type` header value; `Some("")` sends an explicitly empty header.
	pub content_type: Option<String>,
	pub body: Vec<u8>,
}

impl CloudRequest {
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			method,
			url: url.into(),
			authorization: None,
			content_type: None,
			body: Vec::new(),
		}
	}

	pub fn bearer(mut self, token: &str) -> Self {
		self.authorization = Some(format!("Bearer {}", token));
		self
	}

	/// Attach a JSON body.
	pub fn json<T: serde::Serialize + ?Sized>(mut self, body: &T) -> Result<Self, RemarkableError> {
		self.body = serde_json::to_vec(body)?;
		self.content_type = Some("application/json".to_string());
		Ok(self)
	}

	pub fn bytes(mut self, body: Vec<u8>, content_type: &str) -> Self {
		self.body = body;
		self.content_type = Some(content_type.to_string());
		self
	}
}

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct CloudResponse {
	pub status: u16,
	pub body: Vec<u8>,
}

impl CloudResponse {
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}

	pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, RemarkableError> {
		Ok(serde_json::from_slice(&self.body)?)
	}
}

/// Executes requests against the cloud.
#[async_trait::async_trait]
pub trait CloudTransport: Send + Sync {
	/// Send one request. Non-2xx statuses are returned, not raised; only
	/// transport-level failures produce an error.
	async fn execute(&self, request: CloudRequest) -> Result<CloudResponse, RemarkableError>;
}

/// [`CloudTransport`] backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
	http_client: Client,
}

impl ReqwestTransport {
	pub fn new() -> Result<Self, RemarkableError> {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(120))
			.build()?;

		Ok(Self { http_client })
	}
}

#[async_trait::async_trait]
impl CloudTransport for ReqwestTransport {
	async fn execute(&self, request: CloudRequest) -> Result<CloudResponse, RemarkableError> {
		debug!("{} {}", request.method, request.url);

		let mut builder = self
			.http_client
			.request(request.method, &request.url)
			.body(request.body);
		if let Some(authorization) = request.authorization {
			builder = builder.header("Authorization", authorization);
		}
		if let Some(content_type) = request.content_type {
			builder = builder.header("Content-Type", content_type);
		}

		let response = builder.send().await?;
		let status = response.status().as_u16();
		let body = response.bytes().await?.to_vec();

		Ok(CloudResponse { status, body })
	}
}
