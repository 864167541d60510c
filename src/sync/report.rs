//! Outcome of a sync run.
//!
//! The traversal never stops on a per-item or per-subtree failure. Everything
//! that happened is collected here and reported once the walk is done.

use super::types::SyncError;

use std::fmt;
use tracing::{error, info};

/// Slash-separated destination folder path, rooted at the library name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestinationPath(Vec<String>);

impl DestinationPath {
	pub fn root(name: &str) -> Self {
		Self(vec![name.to_string()])
	}

	pub fn child(&self, name: &str) -> Self {
		let mut segments = self.0.clone();
		segments.push(name.to_string());
		Self(segments)
	}
}

impl fmt::Display for DestinationPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.join("/"))
	}
}

/// What a failure or skip is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSubject {
	Collection { key: String, name: String },
	Item { key: String, title: String },
}

impl fmt::Display for SyncSubject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncSubject::Collection { key, name } => write!(f, "collection {} ({})", name, key),
			SyncSubject::Item { key, title } => write!(f, "item \"{}\" ({})", title, key),
		}
	}
}

/// A document that reached the destination and was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedDocument {
	pub path: DestinationPath,
	pub title: String,
	pub document_id: String,
}

/// One item or subtree that could not be synced.
#[derive(Debug)]
pub struct SyncFailure {
	pub path: DestinationPath,
	pub subject: SyncSubject,
	pub error: SyncError,
}

/// Aggregate result of a whole run.
#[derive(Debug, Default)]
pub struct SyncReport {
	pub uploaded: Vec<UploadedDocument>,
	pub folders_created: usize,
	/// Items with no supported attachment.
	pub skipped: Vec<(DestinationPath, SyncSubject)>,
	pub failures: Vec<SyncFailure>,
}

impl SyncReport {
	pub fn is_success(&self) -> bool {
		self.failures.is_empty()
	}

	pub fn record_failure(&mut self, path: DestinationPath, subject: SyncSubject, error: SyncError) {
		self.failures.push(SyncFailure {
			path,
			subject,
			error,
		});
	}

	/// Fold the outcome of one job into this report.
	pub fn merge(&mut self, other: SyncReport) {
		self.uploaded.extend(other.uploaded);
		self.folders_created += other.folders_created;
		self.skipped.extend(other.skipped);
		self.failures.extend(other.failures);
	}

	/// One-line human-readable summary.
	pub fn summary(&self) -> String {
		format!(
			"{} documents uploaded, {} folders created, {} items skipped, {} failures",
			self.uploaded.len(),
			self.folders_created,
			self.skipped.len(),
			self.failures.len()
		)
	}

	/// Log the summary and every failure.
	pub fn log(&self) {
		info!("Sync finished: {}", self.summary());
		for failure in &self.failures {
			error!(
				"Failed to sync {} under {}: {}",
				failure.subject, failure.path, failure.error
			);
		}
	}
}
