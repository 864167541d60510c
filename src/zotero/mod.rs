//! Source library integration.
//!
//! The sync engine reads collections, items and attachment files through the
//! [`SourceLibrary`] trait. [`ZoteroClient`] implements it against the Zotero
//! web API.

/// HTTP client for the Zotero web API
mod client;
/// Wire and domain types for library records
mod types;

pub use client::ZoteroClient;
pub use types::*;

/// Read-only view of a reference library.
#[async_trait::async_trait]
pub trait SourceLibrary: Send + Sync {
	/// Flat listing of every collection in the library, in API order.
	async fn list_collections(&self) -> Result<Vec<CollectionRecord>, ZoteroError>;

	/// Top-level items filed directly in the collection with `key`.
	async fn get_items_for_collection(&self, key: &str) -> Result<Vec<SourceItem>, ZoteroError>;

	/// Raw bytes of the attachment with `item_key`.
	async fn get_file_bytes(&self, item_key: &str) -> Result<Vec<u8>, ZoteroError>;
}
