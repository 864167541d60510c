//! Command line arguments and local credential storage.

use crate::remarkable::DeviceDescriptor;
use crate::sync::{RetryPolicy, SyncConfig, SyncLimits};
use crate::zotero::LibraryType;

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const APP_DIR_NAME: &str = ".zotero-remarkable";
pub const TOKEN_FILE_NAME: &str = "config.json";

#[derive(Parser, Debug)]
#[command(name = "zotero-remarkable-sync")]
#[command(about = "Mirror a Zotero library into the reMarkable cloud")]
pub struct Args {
	/// Name of the destination root folder (usually the library's name)
	pub library_name: String,

	/// Numeric id of the Zotero user or group library
	pub library_id: String,

	/// Kind of library the id refers to
	#[arg(value_enum)]
	pub library_type: LibraryType,

	/// Zotero API key with read access to the library
	#[arg(env = "ZOTERO_API_KEY")]
	pub api_key: String,

	/// Path to the token file (defaults to ~/.zotero-remarkable/config.json)
	#[arg(long)]
	pub config_path: Option<PathBuf>,

	/// Maximum number of collection and item jobs in flight
	#[arg(long, default_value_t = 8)]
	pub concurrency: usize,

	/// Only descend into the first N child collections of each collection
	#[arg(long)]
	pub max_children: Option<usize>,

	/// Only upload the first N items of each leaf collection
	#[arg(long)]
	pub max_items: Option<usize>,

	/// Create a destination folder per collection and file documents into it
	#[arg(long)]
	pub create_folders: bool,

	/// Device class announced when registering with a one-time code
	#[arg(long, value_enum, default_value = "desktop-windows")]
	pub device_descriptor: DeviceDescriptor,

	/// How long to keep retrying a failed upload slot request, in seconds
	#[arg(long, default_value_t = 60)]
	pub retry_window_secs: u64,
}

impl Args {
	pub fn sync_config(&self) -> SyncConfig {
		SyncConfig {
			concurrency: self.concurrency.max(1),
			limits: SyncLimits {
				max_children: self.max_children,
				max_items: self.max_items,
			},
			create_folders: self.create_folders,
			retry: RetryPolicy {
				max_elapsed: Duration::from_secs(self.retry_window_secs),
				..RetryPolicy::default()
			},
		}
	}
}

/// Errors raised while locating or reading local configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Could not determine the home directory")]
	NoHomeDirectory,

	#[error("IO error on {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Malformed token file: {0}")]
	Json(#[from] serde_json::Error),

	#[error("No one-time code entered")]
	MissingOneTimeCode,
}

/// Persistence for the destination bearer token.
///
/// The token is rotated on every run and the previous one is dead afterwards,
/// so `write_token` must complete before the new token is used.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
	/// The stored token, or `None` when the device was never registered.
	async fn read_token(&self) -> Result<Option<String>, ConfigError>;

	async fn write_token(&self, token: &str) -> Result<(), ConfigError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenFile {
	#[serde(rename = "bearerToken")]
	bearer_token: String,
}

/// JSON token file on local disk.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
	path: PathBuf,
}

impl FileTokenStore {
	pub fn new(path: PathBuf) -> Self {
		Self { path }
	}

	/// Store at `custom_path`, or at the default location under the home directory.
	pub fn at(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
		match custom_path {
			Some(path) => Ok(Self::new(path)),
			None => {
				let home = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
				Ok(Self::new(home.join(APP_DIR_NAME).join(TOKEN_FILE_NAME)))
			}
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn io_error(&self, source: std::io::Error) -> ConfigError {
		ConfigError::Io {
			path: self.path.clone(),
			source,
		}
	}
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
	async fn read_token(&self) -> Result<Option<String>, ConfigError> {
		let contents = match tokio::fs::read_to_string(&self.path).await {
			Ok(contents) => contents,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(self.io_error(e)),
		};

		let file: TokenFile = serde_json::from_str(&contents)?;
		if file.bearer_token.trim().is_empty() {
			warn!("Token file {:?} holds an empty token", self.path);
			return Ok(None);
		}
		Ok(Some(file.bearer_token))
	}

	async fn write_token(&self, token: &str) -> Result<(), ConfigError> {
		if let Some(parent) = self.path.parent() {
			tokio::fs::create_dir_all(parent)
				.await
				.map_err(|e| self.io_error(e))?;
		}

		let contents = serde_json::to_string_pretty(&TokenFile {
			bearer_token: token.to_string(),
		})?;

		// Write then rename so a crash never leaves a truncated token behind.
		let staging = self.path.with_extension("json.tmp");
		tokio::fs::write(&staging, contents)
			.await
			.map_err(|e| self.io_error(e))?;
		tokio::fs::rename(&staging, &self.path)
			.await
			.map_err(|e| self.io_error(e))?;

		debug!("Saved bearer token to {:?}", self.path);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_missing_file_means_unregistered() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileTokenStore::new(dir.path().join("config.json"));
		assert_eq!(store.read_token().await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_write_then_read() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileTokenStore::new(dir.path().join("nested").join("config.json"));

		store.write_token("first").await.unwrap();
		store.write_token("second").await.unwrap();
		assert_eq!(store.read_token().await.unwrap().as_deref(), Some("second"));

		let raw = std::fs::read_to_string(store.path()).unwrap();
		let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
		assert_eq!(json["bearerToken"], "second");
	}

	#[tokio::test]
	async fn test_malformed_file_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, "not json").unwrap();

		let result = FileTokenStore::new(path).read_token().await;
		assert!(matches!(result, Err(ConfigError::Json(_))));
	}

	#[test]
	fn test_args_to_sync_config() {
		let args = Args::parse_from([
			"zotero-remarkable-sync",
			"My Library",
			"12345",
			"groups",
			"secret",
			"--max-items",
			"1",
			"--concurrency",
			"0",
		]);
		assert_eq!(args.library_type, LibraryType::Groups);
		assert_eq!(args.device_descriptor, DeviceDescriptor::DesktopWindows);

		let config = args.sync_config();
		assert_eq!(config.concurrency, 1);
		assert_eq!(config.limits.max_items, Some(1));
		assert_eq!(config.limits.max_children, None);
		assert!(!config.create_folders);
	}
}
