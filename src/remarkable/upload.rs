//! Three-phase upload into the document store.
//!
//! 1. Slot request: one call carrying every descriptor of the batch. The
//!    response array is matched to the request array by position.
//! 2. Blob upload: each container is PUT to its slot URL before the slot
//!    expires.
//! 3. Metadata commit: the descriptor is PUT to the status endpoint, which makes
//!    the document visible.
//!
//! Phase 1 completes for the whole batch before any phase 2 starts. Phases 2
//! and 3 then run concurrently per document. Nothing here is idempotent, so
//! nothing here retries.

use super::package::PackagedDocument;
use super::token::TokenState;
use super::transport::{CloudRequest, CloudTransport};
use super::types::*;

use chrono::Utc;
use futures::future::join_all;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, info, warn};

const UPLOAD_REQUEST_ENDPOINT: &str = "document-storage/json/2/upload/request";
const UPDATE_STATUS_ENDPOINT: &str = "document-storage/json/2/upload/update-status";

/// Client for the storage API upload endpoints.
#[derive(Clone)]
pub struct UploadProtocol {
	transport: Arc<dyn CloudTransport>,
}

impl UploadProtocol {
	pub fn new(transport: Arc<dyn CloudTransport>) -> Self {
		Self { transport }
	}

	/// Upload a batch of packaged documents.
	///
	/// # Returns
	/// One result per input document, in input order. The outer error is a
	/// phase 1 failure, which fails the whole batch.
	pub async fn upload(
		&self,
		state: &TokenState,
		documents: Vec<PackagedDocument>,
	) -> Result<Vec<Result<UploadReceipt, RemarkableError>>, RemarkableError> {
		let slots = self.request_slots(state, &documents).await?;
		Ok(self.complete(state, documents, slots).await)
	}

	/// Phase 1: obtain one upload slot per document.
	///
	/// The returned slots are aligned with `documents` by index.
	pub async fn request_slots(
		&self,
		state: &TokenState,
		documents: &[PackagedDocument],
	) -> Result<Vec<StorageUploadSlot>, RemarkableError> {
		let descriptors: Vec<&StorageDocumentRequest> =
			documents.iter().map(|doc| &doc.request).collect();

		let request = CloudRequest::new(Method::PUT, state.storage_url(UPLOAD_REQUEST_ENDPOINT))
			.bearer(state.bearer_token())
			.json(&descriptors)?;

		debug!("Requesting {} upload slots", descriptors.len());
		let response = self.transport.execute(request).await?;
		if response.status == 401 || response.status == 403 {
			return Err(RemarkableError::Unauthorized(
				state.storage_url(UPLOAD_REQUEST_ENDPOINT),
			));
		}
		if !response.is_success() {
			return Err(RemarkableError::SlotRequestFailed {
				status: response.status,
				body: response.text(),
			});
		}

		let slots: Vec<StorageUploadSlot> = response.json()?;
		if slots.len() != documents.len() {
			return Err(RemarkableError::SlotCountMismatch {
				requested: documents.len(),
				received: slots.len(),
			});
		}

		Ok(slots)
	}

	/// Phases 2 and 3 for every document, given slots from [`Self::request_slots`].
	///
	/// `slots[i]` is used for `documents[i]`. Results come back in the same order
	/// no matter which pipeline finishes first.
	pub async fn complete(
		&self,
		state: &TokenState,
		documents: Vec<PackagedDocument>,
		slots: Vec<StorageUploadSlot>,
	) -> Vec<Result<UploadReceipt, RemarkableError>> {
		let pipelines = documents
			.into_iter()
			.zip(slots)
			.map(|(document, slot)| self.upload_one(state, document, slot));

		join_all(pipelines).await
	}

	async fn upload_one(
		&self,
		state: &TokenState,
		document: PackagedDocument,
		slot: StorageUploadSlot,
	) -> Result<UploadReceipt, RemarkableError> {
		let PackagedDocument { request, archive } = document;
		if slot.id != request.id {
			debug!(
				"Slot {} (version {}) paired by position with document {}",
				slot.id, slot.version, request.id
			);
		}

		if !slot.success {
			return Err(RemarkableError::SlotRejected {
				id: request.id,
				message: slot.message,
			});
		}
		if slot.is_expired_at(Utc::now()) {
			return Err(RemarkableError::SlotExpired {
				id: request.id,
				expired_at: slot.put_expires,
			});
		}

		let blob = CloudRequest::new(Method::PUT, slot.blob_put_url.as_str())
			.bearer(state.bearer_token())
			.bytes(archive, "");
		let response = self.transport.execute(blob).await?;
		if !response.is_success() {
			return Err(RemarkableError::BlobUploadFailed {
				id: request.id,
				status: response.status,
			});
		}
		info!("Uploaded {} container to reMarkable", request.visible_name);

		self.commit_metadata(state, &request)
			.await
			.map_err(|reason| {
				warn!(
					"Blob for {} ({}) is stored but not visible: {}",
					request.visible_name, request.id, reason
				);
				RemarkableError::PartialUploadFailure {
					id: request.id.clone(),
					reason,
				}
			})?;

		Ok(UploadReceipt {
			id: request.id,
			visible_name: request.visible_name,
			document_type: request.document_type,
		})
	}

	/// Phase 3: mark one document as synced. Errors are reported as text since
	/// the caller folds them into a partial-upload failure.
	async fn commit_metadata(
		&self,
		state: &TokenState,
		descriptor: &StorageDocumentRequest,
	) -> Result<(), String> {
		let request = CloudRequest::new(Method::PUT, state.storage_url(UPDATE_STATUS_ENDPOINT))
			.bearer(state.bearer_token())
			.json(&[descriptor])
			.map_err(|e| e.to_string())?;

		let response = self
			.transport
			.execute(request)
			.await
			.map_err(|e| e.to_string())?;
		if !response.is_success() {
			return Err(format!("update-status returned {}", response.status));
		}
		Ok(())
	}
}
