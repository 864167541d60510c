//! Builds the per-document container the document store expects.
//!
//! A document container is a zip archive keyed by the document id:
//!
//! - `<id>.content`: render settings as JSON
//! - `<id>.pagedata`: empty page template list
//! - `<id>.<ext>`: the payload, byte for byte
//!
//! A folder container holds only `<id>.content` with an empty object.

use super::types::*;
use crate::zotero::FileType;

use serde::Serialize;
use std::io::{Cursor, Write};
use uuid::Uuid;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Descriptor version for newly created documents.
const INITIAL_VERSION: u32 = 1;

/// Default render settings written to `<id>.content`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentContent {
	extra_metadata: serde_json::Map<String, serde_json::Value>,
	file_type: FileType,
	last_opened_page: u32,
	line_height: i32,
	margins: u32,
	page_count: u32,
	text_scale: u32,
	transform: serde_json::Map<String, serde_json::Value>,
}

impl DocumentContent {
	fn for_file_type(file_type: FileType) -> Self {
		Self {
			extra_metadata: serde_json::Map::new(),
			file_type,
			last_opened_page: 0,
			line_height: -1,
			margins: 180,
			page_count: 0,
			text_scale: 1,
			transform: serde_json::Map::new(),
		}
	}
}

/// A container ready for upload together with its descriptor.
#[derive(Debug, Clone)]
pub struct PackagedDocument {
	pub request: StorageDocumentRequest,
	pub archive: Vec<u8>,
}

impl PackagedDocument {
	pub fn id(&self) -> &str {
		&self.request.id
	}
}

/// Wraps raw files and folders into upload containers.
///
/// Every call mints a new document id, so packaging the same file twice yields
/// two unrelated documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentPackager;

impl DocumentPackager {
	pub fn new() -> Self {
		Self
	}

	/// Package a file payload as a new document named `title`.
	pub fn package_document(
		&self,
		title: &str,
		bytes: &[u8],
		file_type: FileType,
		parent: Option<&str>,
	) -> Result<PackagedDocument, RemarkableError> {
		self.package_document_with_id(&Uuid::new_v4().to_string(), title, bytes, file_type, parent)
	}

	fn package_document_with_id(
		&self,
		id: &str,
		title: &str,
		bytes: &[u8],
		file_type: FileType,
		parent: Option<&str>,
	) -> Result<PackagedDocument, RemarkableError> {
		let content = serde_json::to_vec(&DocumentContent::for_file_type(file_type))?;

		let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
		let options = SimpleFileOptions::default();

		writer.start_file(format!("{}.content", id), options)?;
		writer.write_all(&content)?;
		writer.start_file(format!("{}.pagedata", id), options)?;
		writer.write_all(b"[]")?;
		writer.start_file(format!("{}.{}", id, file_type.extension()), options)?;
		writer.write_all(bytes)?;
		let archive = writer.finish()?.into_inner();

		Ok(PackagedDocument {
			request: StorageDocumentRequest {
				id: id.to_string(),
				document_type: DocumentType::DocumentType,
				version: INITIAL_VERSION,
				visible_name: title.to_string(),
				parent: parent.map(str::to_string),
			},
			archive,
		})
	}

	/// Package an empty folder named `name`.
	pub fn package_folder(
		&self,
		name: &str,
		parent: Option<&str>,
	) -> Result<PackagedDocument, RemarkableError> {
		let id = Uuid::new_v4().to_string();

		let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
		writer.start_file(format!("{}.content", id), SimpleFileOptions::default())?;
		writer.write_all(b"{}")?;
		let archive = writer.finish()?.into_inner();

		Ok(PackagedDocument {
			request: StorageDocumentRequest {
				id,
				document_type: DocumentType::CollectionType,
				version: INITIAL_VERSION,
				visible_name: name.to_string(),
				parent: parent.map(str::to_string),
			},
			archive,
		})
	}
}
