//! Wire types for the reMarkable cloud and the errors its operations produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device classes accepted by the registration endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceDescriptor {
	DesktopWindows,
	DesktopMacos,
	MobileIos,
	MobileAndroid,
	BrowserChrome,
	Remarkable,
}

/// Kind of entry in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
	DocumentType,
	CollectionType,
}

/// Descriptor for one document in an upload batch.
///
/// The `ID` is generated per upload and has no relation to the source item.
/// `VissibleName` is spelled the way the storage API spells it; the corrected
/// spelling is still accepted when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDocumentRequest {
	#[serde(rename = "ID")]
	pub id: String,
	#[serde(rename = "Type")]
	pub document_type: DocumentType,
	#[serde(rename = "Version")]
	pub version: u32,
	#[serde(rename = "VissibleName", alias = "VisibleName")]
	pub visible_name: String,
	#[serde(rename = "Parent", default, skip_serializing_if = "Option::is_none")]
	pub parent: Option<String>,
}

/// A single-use upload slot minted for one descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageUploadSlot {
	#[serde(rename = "ID")]
	pub id: String,
	#[serde(rename = "Version", default)]
	pub version: u32,
	#[serde(rename = "Message", default)]
	pub message: String,
	#[serde(rename = "Success", default = "default_success")]
	pub success: bool,
	#[serde(rename = "BlobURLPut", default)]
	pub blob_put_url: String,
	#[serde(rename = "BlobURLPutExpires")]
	pub put_expires: DateTime<Utc>,
}

fn default_success() -> bool {
	true
}

impl StorageUploadSlot {
	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		now >= self.put_expires
	}
}

/// Response of the service discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryResponse {
	#[serde(rename = "Status", default)]
	pub status: Option<String>,
	#[serde(rename = "Host")]
	pub host: String,
}

/// Body of the device registration call.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest<'a> {
	pub code: &'a str,
	#[serde(rename = "deviceDesc")]
	pub device_desc: DeviceDescriptor,
	#[serde(rename = "deviceId")]
	pub device_id: &'a str,
}

/// Proof that a document's blob and metadata were both accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
	pub id: String,
	pub visible_name: String,
	pub document_type: DocumentType,
}

/// Error types for reMarkable cloud operations
#[derive(Debug, thiserror::Error)]
pub enum RemarkableError {
	#[error("Registration rejected: {0}")]
	RegistrationRejected(String),

	#[error("Token refresh rejected: {0}")]
	RefreshRejected(String),

	#[error("Storage host discovery failed: {0}")]
	DiscoveryFailed(String),

	#[error("Unauthorized request to {0}")]
	Unauthorized(String),

	#[error("Upload slot request failed with status {status}: {body}")]
	SlotRequestFailed { status: u16, body: String },

	#[error("Requested {requested} upload slots but received {received}")]
	SlotCountMismatch { requested: usize, received: usize },

	#[error("Upload slot for {id} rejected: {message}")]
	SlotRejected { id: String, message: String },

	#[error("Upload slot for {id} expired at {expired_at}")]
	SlotExpired { id: String, expired_at: DateTime<Utc> },

	#[error("Blob upload for {id} failed with status {status}")]
	BlobUploadFailed { id: String, status: u16 },

	#[error("Blob for {id} stored but metadata commit failed: {reason}")]
	PartialUploadFailure { id: String, reason: String },

	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Invalid URL: {0}")]
	InvalidUrl(#[from] url::ParseError),

	#[error("Archive error: {0}")]
	ArchiveError(#[from] zip::result::ZipError),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

impl RemarkableError {
	/// Whether a failed slot request may be retried with a fresh document id.
	///
	/// Only failures that cannot have minted usable slots qualify.
	pub fn is_transient(&self) -> bool {
		match self {
			RemarkableError::HttpError(_) => true,
			RemarkableError::SlotRequestFailed { status, .. } => *status >= 500 || *status == 429,
			_ => false,
		}
	}
}
