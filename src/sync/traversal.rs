//! Walks the collection tree and mirrors it into the document store.
//!
//! Work is kept on an explicit stack of jobs, one per collection or item, and
//! drained through a single set of in-flight futures. The `concurrency` bound
//! applies to the whole run, not per subtree: there is no join at each
//! collection, and the run ends when the stack and the in-flight set are both
//! empty. Popping from the top of the stack keeps the walk depth first while
//! siblings run concurrently. A failing job records its error and produces no
//! follow-up jobs; every other job carries on.

use super::report::{DestinationPath, SyncReport, SyncSubject, UploadedDocument};
use super::tree::{CollectionTree, NodeId};
use crate::remarkable::{
	DocumentPackager, PackagedDocument, RemarkableError, TokenState, UploadProtocol, UploadReceipt,
};
use crate::zotero::{SourceItem, SourceLibrary};

use backoff::future::retry;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Optional caps on fan-out, applied per collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncLimits {
	/// Visit at most this many children of each collection.
	pub max_children: Option<usize>,
	/// Upload at most this many items of each leaf collection.
	pub max_items: Option<usize>,
}

/// Backoff for transient slot request failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub initial_interval: Duration,
	pub max_interval: Duration,
	/// Give up once this much time has passed since the first attempt.
	pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			initial_interval: Duration::from_millis(500),
			max_interval: Duration::from_secs(10),
			max_elapsed: Duration::from_secs(60),
		}
	}
}

impl RetryPolicy {
	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.initial_interval)
			.with_max_interval(self.max_interval)
			.with_max_elapsed_time(Some(self.max_elapsed))
			.build()
	}
}

/// Configuration for a sync run
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Maximum number of jobs in flight across the whole run.
	pub concurrency: usize,
	pub limits: SyncLimits,
	/// Materialize each collection as a destination folder.
	pub create_folders: bool,
	pub retry: RetryPolicy,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			concurrency: 8,
			limits: SyncLimits::default(),
			create_folders: false,
			retry: RetryPolicy::default(),
		}
	}
}

/// A unit of work on the traversal stack.
enum Job {
	Collection {
		node: NodeId,
		path: DestinationPath,
		/// Destination folder that this collection's own folder goes into.
		parent_folder: Option<String>,
	},
	Item {
		item: SourceItem,
		path: DestinationPath,
		folder: Option<String>,
	},
}

/// What one job produced.
#[derive(Default)]
struct Step {
	jobs: Vec<Job>,
	report: SyncReport,
}

/// Drives collections and items from the source library into the document store.
pub struct SyncTraversal {
	source: Arc<dyn SourceLibrary>,
	uploader: UploadProtocol,
	packager: DocumentPackager,
	token: TokenState,
	config: SyncConfig,
}

impl SyncTraversal {
	pub fn new(
		source: Arc<dyn SourceLibrary>,
		uploader: UploadProtocol,
		token: TokenState,
		config: SyncConfig,
	) -> Self {
		Self {
			source,
			uploader,
			packager: DocumentPackager::new(),
			token,
			config,
		}
	}

	/// Mirror the whole tree. Never fails as a whole; per-job errors end up in
	/// the returned report.
	pub async fn run(&self, tree: &CollectionTree) -> SyncReport {
		info!("Starting sync of {}", tree.root().name);

		let mut report = SyncReport::default();
		let mut pending = vec![Job::Collection {
			node: CollectionTree::ROOT,
			path: DestinationPath::root(&tree.root().name),
			parent_folder: None,
		}];
		let mut running = FuturesUnordered::new();
		let concurrency = self.config.concurrency.max(1);

		loop {
			while running.len() < concurrency {
				match pending.pop() {
					Some(job) => running.push(self.run_job(tree, job)),
					None => break,
				}
			}

			match running.next().await {
				Some(step) => {
					report.merge(step.report);
					// Reverse so the first child is popped first.
					pending.extend(step.jobs.into_iter().rev());
				}
				None => break,
			}
		}

		report
	}

	async fn run_job(&self, tree: &CollectionTree, job: Job) -> Step {
		match job {
			Job::Collection {
				node,
				path,
				parent_folder,
			} => self.visit_collection(tree, node, path, parent_folder).await,
			Job::Item { item, path, folder } => self.sync_item(item, path, folder).await,
		}
	}

	async fn visit_collection(
		&self,
		tree: &CollectionTree,
		id: NodeId,
		path: DestinationPath,
		parent_folder: Option<String>,
	) -> Step {
		let mut step = Step::default();
		let Some(node) = tree.node(id) else {
			return step;
		};
		let subject = SyncSubject::Collection {
			key: node.key.clone(),
			name: node.name.clone(),
		};
		info!("Syncing {} from Zotero to reMarkable", path);

		let folder = if self.config.create_folders {
			match self.create_folder(&node.name, parent_folder.as_deref()).await {
				Ok(folder_id) => {
					step.report.folders_created += 1;
					Some(folder_id)
				}
				Err(e) => {
					warn!("Could not create folder {}: {}", path, e);
					step.report.record_failure(path, subject, e.into());
					return step;
				}
			}
		} else {
			None
		};

		// The library root has no items of its own.
		let items = if tree.is_root(id) {
			None
		} else {
			match self.source.get_items_for_collection(&node.key).await {
				Ok(items) => Some(items),
				Err(e) => {
					warn!("Could not list items of {}: {}", path, e);
					step.report.record_failure(path.clone(), subject, e.into());
					None
				}
			}
		};

		if !node.children.is_empty() {
			let children = limit(&node.children, self.config.limits.max_children);
			for &child in children {
				let Some(child_node) = tree.node(child) else {
					continue;
				};
				step.jobs.push(Job::Collection {
					node: child,
					path: path.child(&child_node.name),
					parent_folder: folder.clone(),
				});
			}
		} else if let Some(items) = items {
			debug!("{} holds {} items", path, items.len());
			for item in limit(&items, self.config.limits.max_items) {
				if item.file.is_none() {
					debug!("Skipping {} ({}): no supported attachment", item.title, item.key);
					step.report.skipped.push((
						path.clone(),
						SyncSubject::Item {
							key: item.key.clone(),
							title: item.title.clone(),
						},
					));
					continue;
				}
				step.jobs.push(Job::Item {
					item: item.clone(),
					path: path.clone(),
					folder: folder.clone(),
				});
			}
		}

		step
	}

	async fn sync_item(&self, item: SourceItem, path: DestinationPath, folder: Option<String>) -> Step {
		let mut step = Step::default();
		let subject = SyncSubject::Item {
			key: item.key.clone(),
			title: item.title.clone(),
		};
		let Some(file) = item.file.as_ref() else {
			step.report.skipped.push((path, subject));
			return step;
		};

		let bytes = match self.source.get_file_bytes(&file.key).await {
			Ok(bytes) => bytes,
			Err(e) => {
				warn!("Could not download {}: {}", item.title, e);
				step.report.record_failure(path, subject, e.into());
				return step;
			}
		};

		let result = self
			.upload_with_retry(|| {
				self.packager
					.package_document(&item.title, &bytes, file.file_type, folder.as_deref())
			})
			.await;
		// The payload is only needed while its upload is in flight.
		drop(bytes);

		match result {
			Ok(receipt) => {
				info!("Synced {} to {}", receipt.visible_name, path);
				step.report.uploaded.push(UploadedDocument {
					path,
					title: item.title,
					document_id: receipt.id,
				});
			}
			Err(e) => {
				warn!("Could not upload {}: {}", item.title, e);
				step.report.record_failure(path, subject, e.into());
			}
		}

		step
	}

	async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<String, RemarkableError> {
		let receipt = self
			.upload_with_retry(|| self.packager.package_folder(name, parent))
			.await?;
		debug!(
			"Created {:?} {} ({})",
			receipt.document_type, receipt.visible_name, receipt.id
		);
		Ok(receipt.id)
	}

	/// Upload one container, retrying transient slot request failures.
	///
	/// `package` runs once per attempt so that every attempt carries a fresh
	/// document id. Once a slot is issued there are no more retries.
	async fn upload_with_retry<F>(&self, package: F) -> Result<UploadReceipt, RemarkableError>
	where
		F: Fn() -> Result<PackagedDocument, RemarkableError>,
	{
		let package = &package;
		let uploader = &self.uploader;
		let token = &self.token;

		let results = retry(self.config.retry.backoff(), move || async move {
			let document = package().map_err(backoff::Error::permanent)?;
			let title = document.request.visible_name.clone();
			let id = document.id().to_string();
			match uploader.upload(token, vec![document]).await {
				Ok(results) => Ok::<_, backoff::Error<RemarkableError>>(results),
				Err(e) if e.is_transient() => {
					warn!(
						"Slot request for {} ({}) failed, retrying with a new id: {}",
						title, id, e
					);
					Err(backoff::Error::transient(e))
				}
				Err(e) => Err(backoff::Error::permanent(e)),
			}
		})
		.await?;

		results
			.into_iter()
			.next()
			.unwrap_or(Err(RemarkableError::SlotCountMismatch {
				requested: 1,
				received: 0,
			}))
	}
}

fn limit<T>(values: &[T], max: Option<usize>) -> &[T] {
	match max {
		Some(max) if max < values.len() => &values[..max],
		_ => values,
	}
}
