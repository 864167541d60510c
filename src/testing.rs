//! In-memory stand-ins for the cloud, the source library and the token store.

use crate::config::{ConfigError, TokenStore};
use crate::remarkable::{CloudRequest, CloudResponse, CloudTransport, RemarkableError};
use crate::zotero::{
	CollectionRecord, FileReference, FileType, SourceItem, SourceLibrary, ZoteroError,
};

use chrono::Utc;
use reqwest::Method;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

type BlobDelay = Box<dyn Fn(usize) -> Duration + Send + Sync>;

/// A request as the fake cloud received it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
	pub method: Method,
	pub url: String,
	pub authorization: Option<String>,
	pub content_type: Option<String>,
	pub body: Vec<u8>,
}

struct CloudState {
	codes: HashSet<String>,
	tokens: HashSet<String>,
	minted: usize,
	calls: Vec<RecordedCall>,
	slot_failures: usize,
	drop_next_slot: bool,
	slot_lifetime: chrono::Duration,
	rejected_slots: HashSet<String>,
	failed_metadata: HashSet<String>,
	fail_all_metadata: bool,
	slot_positions: HashMap<String, usize>,
	blob_bodies: HashMap<String, Vec<u8>>,
	completed_blobs: Vec<String>,
}

/// Fake of the registration, discovery and storage services.
///
/// Tokens are single use across refreshes, slots expire after a configurable
/// lifetime and blob uploads can be delayed per slot position.
pub struct FakeCloud {
	state: Mutex<CloudState>,
	blob_delay: Mutex<Option<BlobDelay>>,
}

impl FakeCloud {
	pub const STORAGE_HOST: &'static str = "storage.fake.test";
	pub const BLOB_BASE: &'static str = "https://blobs.fake.test";

	pub fn new() -> Self {
		Self {
			state: Mutex::new(CloudState {
				codes: HashSet::new(),
				tokens: HashSet::new(),
				minted: 0,
				calls: Vec::new(),
				slot_failures: 0,
				drop_next_slot: false,
				slot_lifetime: chrono::Duration::hours(1),
				rejected_slots: HashSet::new(),
				failed_metadata: HashSet::new(),
				fail_all_metadata: false,
				slot_positions: HashMap::new(),
				blob_bodies: HashMap::new(),
				completed_blobs: Vec::new(),
			}),
			blob_delay: Mutex::new(None),
		}
	}

	pub fn accept_code(&self, code: &str) {
		self.state.lock().unwrap().codes.insert(code.to_string());
	}

	/// Mint a valid token without going through registration.
	pub fn issue_token(&self) -> String {
		let mut state = self.state.lock().unwrap();
		mint(&mut state)
	}

	pub fn is_valid_token(&self, token: &str) -> bool {
		self.state.lock().unwrap().tokens.contains(token)
	}

	pub fn calls(&self) -> Vec<RecordedCall> {
		self.state.lock().unwrap().calls.clone()
	}

	/// Number of calls whose URL contains `fragment`.
	pub fn calls_to(&self, fragment: &str) -> usize {
		self.state
			.lock()
			.unwrap()
			.calls
			.iter()
			.filter(|call| call.url.contains(fragment))
			.count()
	}

	/// Every descriptor sent in any slot request, in arrival order.
	pub fn slot_requests(&self) -> Vec<serde_json::Value> {
		self.slot_request_batches().into_iter().flatten().collect()
	}

	/// Document ids of each slot request.
	pub fn slot_request_ids(&self) -> Vec<Vec<String>> {
		self.slot_request_batches()
			.into_iter()
			.map(|batch| {
				batch
					.iter()
					.filter_map(|d| d["ID"].as_str().map(str::to_string))
					.collect()
			})
			.collect()
	}

	fn slot_request_batches(&self) -> Vec<Vec<serde_json::Value>> {
		self.state
			.lock()
			.unwrap()
			.calls
			.iter()
			.filter(|call| call.url.ends_with("upload/request"))
			.map(|call| serde_json::from_slice(&call.body).unwrap())
			.collect()
	}

	/// Delay each blob upload by a function of its position in its slot request.
	pub fn set_blob_delay(&self, delay: impl Fn(usize) -> Duration + Send + Sync + 'static) {
		*self.blob_delay.lock().unwrap() = Some(Box::new(delay));
	}

	pub fn set_slot_lifetime(&self, lifetime: chrono::Duration) {
		self.state.lock().unwrap().slot_lifetime = lifetime;
	}

	/// Answer the next `count` slot requests with 503.
	pub fn fail_next_slot_requests(&self, count: usize) {
		self.state.lock().unwrap().slot_failures = count;
	}

	/// Leave the last slot out of the next slot response.
	pub fn drop_slot_in_next_response(&self) {
		self.state.lock().unwrap().drop_next_slot = true;
	}

	pub fn reject_slot_for(&self, id: &str) {
		self.state.lock().unwrap().rejected_slots.insert(id.to_string());
	}

	pub fn fail_metadata_for(&self, id: &str) {
		self.state.lock().unwrap().failed_metadata.insert(id.to_string());
	}

	pub fn fail_all_metadata(&self) {
		self.state.lock().unwrap().fail_all_metadata = true;
	}

	pub fn blob_body(&self, id: &str) -> Option<Vec<u8>> {
		self.state.lock().unwrap().blob_bodies.get(id).cloned()
	}

	/// Ids of uploaded blobs in the order their uploads finished.
	pub fn completed_blobs(&self) -> Vec<String> {
		self.state.lock().unwrap().completed_blobs.clone()
	}

	fn authorized(state: &CloudState, request: &CloudRequest) -> bool {
		request
			.authorization
			.as_deref()
			.and_then(|value| value.strip_prefix("Bearer "))
			.is_some_and(|token| state.tokens.contains(token))
	}

	fn handle(&self, request: &CloudRequest) -> Result<CloudResponse, String> {
		let mut state = self.state.lock().unwrap();
		let url = request.url.as_str();

		if url.contains("/token/json/2/device/new") {
			let body: serde_json::Value = serde_json::from_slice(&request.body).map_err(|e| e.to_string())?;
			let code = body["code"].as_str().unwrap_or_default();
			if !state.codes.contains(code) {
				return Ok(respond(400, "Invalid one-time code"));
			}
			let token = mint(&mut state);
			return Ok(respond(200, &format!("  {}\n", token)));
		}

		if url.contains("/token/json/2/user/new") {
			let Some(old) = request
				.authorization
				.as_deref()
				.and_then(|value| value.strip_prefix("Bearer "))
			else {
				return Ok(respond(401, "Unauthorized"));
			};
			if !state.tokens.remove(old) {
				return Ok(respond(401, "Unauthorized"));
			}
			let token = mint(&mut state);
			return Ok(respond(200, &format!("{}\n", token)));
		}

		if url.contains("/service/json/1/document-storage") {
			if !Self::authorized(&state, request) {
				return Ok(respond(401, "Unauthorized"));
			}
			let body = serde_json::json!({ "Status": "OK", "Host": Self::STORAGE_HOST });
			return Ok(respond(200, &body.to_string()));
		}

		if url.ends_with("upload/request") {
			if !Self::authorized(&state, request) {
				return Ok(respond(401, "Unauthorized"));
			}
			if state.slot_failures > 0 {
				state.slot_failures -= 1;
				return Ok(respond(503, "Service Unavailable"));
			}
			let descriptors: Vec<serde_json::Value> =
				serde_json::from_slice(&request.body).map_err(|e| e.to_string())?;
			let expires = (Utc::now() + state.slot_lifetime).to_rfc3339();
			let mut slots = Vec::with_capacity(descriptors.len());
			for (position, descriptor) in descriptors.iter().enumerate() {
				let id = descriptor["ID"].as_str().unwrap_or_default().to_string();
				state.slot_positions.insert(id.clone(), position);
				slots.push(serde_json::json!({
					"ID": id,
					"Version": 1,
					"Message": "",
					"Success": !state.rejected_slots.contains(&id),
					"BlobURLPut": format!("{}/{}", Self::BLOB_BASE, id),
					"BlobURLPutExpires": expires,
				}));
			}
			if state.drop_next_slot {
				state.drop_next_slot = false;
				slots.pop();
			}
			return Ok(respond(200, &serde_json::Value::Array(slots).to_string()));
		}

		if url.ends_with("upload/update-status") {
			if !Self::authorized(&state, request) {
				return Ok(respond(401, "Unauthorized"));
			}
			let descriptors: Vec<serde_json::Value> =
				serde_json::from_slice(&request.body).map_err(|e| e.to_string())?;
			let failed = state.fail_all_metadata
				|| descriptors.iter().any(|d| {
					d["ID"]
						.as_str()
						.is_some_and(|id| state.failed_metadata.contains(id))
				});
			if failed {
				return Ok(respond(500, "Internal Server Error"));
			}
			return Ok(respond(200, "[]"));
		}

		Ok(respond(404, "Not Found"))
	}
}

fn mint(state: &mut CloudState) -> String {
	state.minted += 1;
	let token = format!("token-{}", state.minted);
	state.tokens.insert(token.clone());
	token
}

fn respond(status: u16, body: &str) -> CloudResponse {
	CloudResponse {
		status,
		body: body.as_bytes().to_vec(),
	}
}

#[async_trait::async_trait]
impl CloudTransport for FakeCloud {
	async fn execute(&self, request: CloudRequest) -> Result<CloudResponse, RemarkableError> {
		self.state.lock().unwrap().calls.push(RecordedCall {
			method: request.method.clone(),
			url: request.url.clone(),
			authorization: request.authorization.clone(),
			content_type: request.content_type.clone(),
			body: request.body.clone(),
		});

		if let Some(id) = request.url.strip_prefix(&format!("{}/", Self::BLOB_BASE)) {
			let id = id.to_string();
			let position = self.state.lock().unwrap().slot_positions.get(&id).copied();
			let delay = match (self.blob_delay.lock().unwrap().as_ref(), position) {
				(Some(delay), Some(position)) => delay(position),
				_ => Duration::ZERO,
			};
			if !delay.is_zero() {
				tokio::time::sleep(delay).await;
			}

			let mut state = self.state.lock().unwrap();
			state.blob_bodies.insert(id.clone(), request.body);
			state.completed_blobs.push(id);
			return Ok(respond(200, ""));
		}

		self.handle(&request).map_err(RemarkableError::DiscoveryFailed)
	}
}

/// Source library backed by fixed collections, items and files.
pub struct FakeLibrary {
	collections: Vec<CollectionRecord>,
	items: HashMap<String, Vec<SourceItem>>,
	files: HashMap<String, Vec<u8>>,
	failing_collections: HashSet<String>,
	failing_files: HashSet<String>,
	item_requests: Mutex<Vec<String>>,
}

impl FakeLibrary {
	pub fn new(collections: Vec<CollectionRecord>) -> Self {
		Self {
			collections,
			items: HashMap::new(),
			files: HashMap::new(),
			failing_collections: HashSet::new(),
			failing_files: HashSet::new(),
			item_requests: Mutex::new(Vec::new()),
		}
	}

	/// File an item with a PDF attachment holding `bytes` under `collection`.
	pub fn with_item(mut self, collection: &str, key: &str, title: &str, bytes: &[u8]) -> Self {
		let file_key = attachment_key(key);
		self.files.insert(file_key.clone(), bytes.to_vec());
		self.items
			.entry(collection.to_string())
			.or_default()
			.push(SourceItem {
				key: key.to_string(),
				title: title.to_string(),
				file: Some(FileReference {
					key: file_key,
					file_type: FileType::Pdf,
				}),
			});
		self
	}

	/// File an item without any attachment.
	pub fn with_note(mut self, collection: &str, key: &str, title: &str) -> Self {
		self.items
			.entry(collection.to_string())
			.or_default()
			.push(SourceItem {
				key: key.to_string(),
				title: title.to_string(),
				file: None,
			});
		self
	}

	pub fn fail_collection(mut self, key: &str) -> Self {
		self.failing_collections.insert(key.to_string());
		self
	}

	/// Make downloading the attachment of item `key` fail.
	pub fn fail_file(mut self, key: &str) -> Self {
		self.failing_files.insert(attachment_key(key));
		self
	}

	pub fn collections(&self) -> &[CollectionRecord] {
		&self.collections
	}

	/// Collection keys whose items were requested, in request order.
	pub fn item_requests(&self) -> Vec<String> {
		self.item_requests.lock().unwrap().clone()
	}
}

fn attachment_key(item_key: &str) -> String {
	format!("{}-ATT", item_key)
}

#[async_trait::async_trait]
impl SourceLibrary for FakeLibrary {
	async fn list_collections(&self) -> Result<Vec<CollectionRecord>, ZoteroError> {
		Ok(self.collections.clone())
	}

	async fn get_items_for_collection(&self, key: &str) -> Result<Vec<SourceItem>, ZoteroError> {
		self.item_requests.lock().unwrap().push(key.to_string());
		if self.failing_collections.contains(key) {
			return Err(ZoteroError::UnexpectedStatus {
				route: format!("collections/{}/items/top", key),
				status: 500,
			});
		}
		Ok(self.items.get(key).cloned().unwrap_or_default())
	}

	async fn get_file_bytes(&self, item_key: &str) -> Result<Vec<u8>, ZoteroError> {
		if self.failing_files.contains(item_key) {
			return Err(ZoteroError::UnexpectedStatus {
				route: format!("items/{}/file", item_key),
				status: 404,
			});
		}
		self.files
			.get(item_key)
			.cloned()
			.ok_or_else(|| ZoteroError::UnexpectedStatus {
				route: format!("items/{}/file", item_key),
				status: 404,
			})
	}
}

/// Token store held in memory that records every write.
pub struct MemoryTokenStore {
	token: Mutex<Option<String>>,
	writes: Mutex<Vec<String>>,
	fail_writes: bool,
}

impl MemoryTokenStore {
	pub fn empty() -> Self {
		Self {
			token: Mutex::new(None),
			writes: Mutex::new(Vec::new()),
			fail_writes: false,
		}
	}

	pub fn holding(token: &str) -> Self {
		let store = Self::empty();
		*store.token.lock().unwrap() = Some(token.to_string());
		store
	}

	pub fn failing_writes(mut self) -> Self {
		self.fail_writes = true;
		self
	}

	pub fn writes(&self) -> Vec<String> {
		self.writes.lock().unwrap().clone()
	}
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
	async fn read_token(&self) -> Result<Option<String>, ConfigError> {
		Ok(self.token.lock().unwrap().clone())
	}

	async fn write_token(&self, token: &str) -> Result<(), ConfigError> {
		if self.fail_writes {
			return Err(ConfigError::Io {
				path: "memory".into(),
				source: std::io::Error::other("read-only store"),
			});
		}
		*self.token.lock().unwrap() = Some(token.to_string());
		self.writes.lock().unwrap().push(token.to_string());
		Ok(())
	}
}
