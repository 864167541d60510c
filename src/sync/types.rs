use crate::config::ConfigError;
use crate::remarkable::RemarkableError;
use crate::zotero::ZoteroError;

/// Errors raised while turning a flat collection listing into a tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
	#[error("Collection record at position {0} has no key")]
	MissingKey(usize),

	#[error("Collection {0} has no data block")]
	MissingData(String),

	#[error("Collection {key} names parent {parent}, which does not exist")]
	DanglingParent { key: String, parent: String },
}

/// Top-level error type for a sync run
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
	#[error("Configuration error: {0}")]
	ConfigError(#[from] ConfigError),

	#[error("Source library error: {0}")]
	SourceFetchError(#[from] ZoteroError),

	#[error("reMarkable error: {0}")]
	RemarkableError(#[from] RemarkableError),

	#[error("Tree construction error: {0}")]
	TreeConstructionError(#[from] TreeError),
}
