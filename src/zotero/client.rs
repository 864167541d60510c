//! HTTP client for the Zotero web API.
//!
//! Implements [`SourceLibrary`] over the v3 REST endpoints. Listings are paged
//! with `start`/`limit` until the `Total-Results` header is exhausted.

use super::types::*;
use super::SourceLibrary;

use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

/// Page size for listing endpoints; the API caps it at 100.
const PAGE_LIMIT: usize = 100;

/// Zotero web API client bound to one library.
#[derive(Clone)]
pub struct ZoteroClient {
	http_client: Client,
	base_url: String,
	library_id: String,
	library_type: LibraryType,
	api_key: String,
}

impl ZoteroClient {
	pub const DEFAULT_ENDPOINT: &'static str = "https://api.zotero.org";

	/// Create a client for the given library.
	///
	/// # Arguments
	/// * `library_id` - Numeric id of the user or group library.
	/// * `library_type` - Whether the id names a group or a user library.
	/// * `api_key` - Personal API key with read access to the library.
	pub fn new(
		library_id: String,
		library_type: LibraryType,
		api_key: String,
	) -> Result<Self, ZoteroError> {
		let http_client = Client::builder().timeout(Duration::from_secs(60)).build()?;

		Ok(Self {
			http_client,
			base_url: Self::DEFAULT_ENDPOINT.to_string(),
			library_id,
			library_type,
			api_key,
		})
	}

	fn library_route(&self, suffix: &str) -> String {
		format!(
			"/{}/{}/{}",
			self.library_type.route_segment(),
			self.library_id,
			suffix
		)
	}

	async fn get(&self, route: &str, query: &[(&str, String)]) -> Result<Response, ZoteroError> {
		let url = reqwest::Url::parse_with_params(&format!("{}{}", self.base_url, route), query)?;

		debug!("GET {}", url);
		let response = self
			.http_client
			.get(url)
			.header("Authorization", format!("Bearer {}", self.api_key))
			.header("Zotero-API-Version", "3")
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(ZoteroError::UnexpectedStatus {
				route: route.to_string(),
				status: response.status().as_u16(),
			});
		}

		Ok(response)
	}

	/// Fetch every page of a JSON listing endpoint.
	async fn get_all<T>(&self, route: &str) -> Result<Vec<T>, ZoteroError>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut results = Vec::new();

		loop {
			let query = [
				("format", "json".to_string()),
				("limit", PAGE_LIMIT.to_string()),
				("start", results.len().to_string()),
			];
			let response = self.get(route, &query).await?;
			let total = response
				.headers()
				.get("Total-Results")
				.and_then(|v| v.to_str().ok())
				.and_then(|v| v.parse::<usize>().ok());

			let body = response.bytes().await?;
			let page: Vec<T> = serde_json::from_slice(&body)?;
			let page_len = page.len();
			results.extend(page);

			let exhausted = match total {
				Some(total) => results.len() >= total,
				None => page_len < PAGE_LIMIT,
			};
			if exhausted || page_len == 0 {
				break;
			}
		}

		Ok(results)
	}
}

#[async_trait::async_trait]
impl SourceLibrary for ZoteroClient {
	async fn list_collections(&self) -> Result<Vec<CollectionRecord>, ZoteroError> {
		let collections = self.get_all(&self.library_route("collections")).await?;
		debug!("Listed {} collections", collections.len());
		Ok(collections)
	}

	async fn get_items_for_collection(&self, key: &str) -> Result<Vec<SourceItem>, ZoteroError> {
		let route = self.library_route(&format!("collections/{}/items/top", key));
		let records: Vec<ItemRecord> = self.get_all(&route).await?;
		Ok(records.into_iter().map(SourceItem::from).collect())
	}

	async fn get_file_bytes(&self, item_key: &str) -> Result<Vec<u8>, ZoteroError> {
		let route = self.library_route(&format!("items/{}/file", item_key.to_uppercase()));
		let response = self.get(&route, &[]).await?;
		let bytes = response.bytes().await?;
		debug!("Downloaded {} bytes for item {}", bytes.len(), item_key);
		Ok(bytes.to_vec())
	}
}
