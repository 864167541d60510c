//! Types for the Zotero web API and the records the sync engine consumes.

use serde::{Deserialize, Deserializer, Serialize};

/// Where a collection hangs in the library hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ParentRef {
	/// Top-level collection, attached directly under the library root.
	Root,
	/// Nested collection, attached under the collection with this key.
	Collection(String),
}

impl<'de> Deserialize<'de> for ParentRef {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		// Zotero encodes "no parent" as `false` rather than null.
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Flag(bool),
			Key(String),
		}

		match Option::<Raw>::deserialize(deserializer)? {
			None | Some(Raw::Flag(false)) => Ok(ParentRef::Root),
			Some(Raw::Flag(true)) => Err(serde::de::Error::custom(
				"parentCollection must be false or a collection key",
			)),
			Some(Raw::Key(key)) => Ok(ParentRef::Collection(key)),
		}
	}
}

/// The `data` block of a collection record.
///
/// An absent field stays `None`; an explicit `parentCollection: false` is a
/// top-level collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionData {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(
		rename = "parentCollection",
		default,
		deserialize_with = "present_parent"
	)]
	pub parent_collection: Option<ParentRef>,
}

fn present_parent<'de, D>(deserializer: D) -> Result<Option<ParentRef>, D::Error>
where
	D: Deserializer<'de>,
{
	ParentRef::deserialize(deserializer).map(Some)
}

/// One collection as listed by the library, before tree construction.
///
/// Both fields are optional on the wire so that malformed records surface as
/// tree construction errors instead of deserialization failures of the whole
/// listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRecord {
	#[serde(default)]
	pub key: Option<String>,
	#[serde(default)]
	pub data: Option<CollectionData>,
}

#[cfg(test)]
impl CollectionRecord {
	pub fn new(key: &str, parent: ParentRef, name: &str) -> Self {
		Self {
			key: Some(key.to_string()),
			data: Some(CollectionData {
				name: Some(name.to_string()),
				parent_collection: Some(parent),
			}),
		}
	}
}

/// Payload formats the destination can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
	Pdf,
	Epub,
}

impl FileType {
	/// Map an attachment content type onto a supported payload format.
	pub fn from_content_type(content_type: &str) -> Option<Self> {
		match content_type.trim().to_ascii_lowercase().as_str() {
			"application/pdf" => Some(FileType::Pdf),
			"application/epub+zip" => Some(FileType::Epub),
			_ => None,
		}
	}

	pub fn extension(&self) -> &'static str {
		match self {
			FileType::Pdf => "pdf",
			FileType::Epub => "epub",
		}
	}
}

/// Pointer to the downloadable file behind a library item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
	/// Key of the attachment item whose `/file` endpoint serves the bytes.
	pub key: String,
	pub file_type: FileType,
}

/// A library item as seen by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
	pub key: String,
	pub title: String,
	/// `None` when the item carries no supported attachment.
	pub file: Option<FileReference>,
}

/// Raw item record returned by the items endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRecord {
	pub key: String,
	#[serde(default)]
	pub data: ItemData,
	#[serde(default)]
	pub links: ItemLinks,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemData {
	#[serde(default)]
	pub title: Option<String>,
	#[serde(rename = "itemType", default)]
	pub item_type: Option<String>,
	#[serde(rename = "contentType", default)]
	pub content_type: Option<String>,
	#[serde(default)]
	pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemLinks {
	#[serde(default)]
	pub attachment: Option<AttachmentLink>,
}

/// The "best attachment" link Zotero adds to regular items.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentLink {
	pub href: String,
	#[serde(rename = "attachmentType", default)]
	pub attachment_type: Option<String>,
}

impl From<ItemRecord> for SourceItem {
	fn from(record: ItemRecord) -> Self {
		let file = if record.data.item_type.as_deref() == Some("attachment") {
			record
				.data
				.content_type
				.as_deref()
				.and_then(FileType::from_content_type)
				.map(|file_type| FileReference {
					key: record.key.clone(),
					file_type,
				})
		} else {
			record.links.attachment.as_ref().and_then(|link| {
				let file_type = link
					.attachment_type
					.as_deref()
					.and_then(FileType::from_content_type)?;
				let key = link.href.trim_end_matches('/').rsplit('/').next()?;
				(!key.is_empty()).then(|| FileReference {
					key: key.to_string(),
					file_type,
				})
			})
		};

		let title = record
			.data
			.title
			.filter(|t| !t.trim().is_empty())
			.or(record.data.filename)
			.unwrap_or_else(|| record.key.clone());

		Self {
			key: record.key,
			title,
			file,
		}
	}
}

/// Which kind of library the id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LibraryType {
	#[value(name = "groups", alias = "group")]
	Groups,
	#[value(name = "user", alias = "users")]
	User,
}

impl LibraryType {
	/// Route segment used by the web API.
	pub fn route_segment(&self) -> &'static str {
		match self {
			LibraryType::Groups => "groups",
			LibraryType::User => "users",
		}
	}
}

/// Error types for source library operations.
#[derive(Debug, thiserror::Error)]
pub enum ZoteroError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Invalid URL: {0}")]
	InvalidUrl(#[from] url::ParseError),

	#[error("Unexpected status {status} from {route}")]
	UnexpectedStatus { route: String, status: u16 },
}
